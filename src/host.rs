use crate::tracking::Notice;

/// What the page currently shows about the video, scraped by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDetails {
    pub title: String,
    pub playlist_title: Option<String>,
    /// Number of videos in the playlist panel, once it has rendered.
    pub total_videos: Option<u32>,
}

/// The page and its video element, as seen from the tracker.
///
/// Calls are made from the controller's event task and must not block.
/// Implementations forward player notifications back through
/// `TrackerController` (`time_update`, `playback_ended`, `metadata_ready`,
/// `confirm_attention`, `notify_navigation`).
pub trait PlayerHost: Send + Sync + 'static {
    /// Current duration in seconds, `None` while metadata is loading.
    fn duration(&self) -> Option<f64>;
    fn page_details(&self) -> PageDetails;

    /// Start forwarding time-progress and end-of-playback notifications.
    fn attach_playback(&self);
    fn detach_playback(&self);
    /// Call `metadata_ready` once the player has loaded metadata for
    /// `video_id`.
    fn await_metadata(&self, video_id: &str);

    fn pause(&self);
    fn play(&self);
    fn seek_to_start(&self);

    fn show_toast(&self, notice: &Notice);
    fn clear_toasts(&self);

    fn show_challenge(&self, seconds: u32);
    fn update_countdown(&self, remaining: u32);
    fn hide_challenge(&self);

    fn show_result(&self, eligible: bool);
    fn hide_result(&self);
}
