use serde::Serialize;

use crate::navigation::VideoRef;

use super::session::SessionToken;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToastKind {
    Info,
    Success,
    Warn,
}

/// A transient message for the page overlay.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: ToastKind,
    pub text: String,
    pub ttl_ms: u64,
}

impl Notice {
    pub fn info(text: impl Into<String>, ttl_ms: u64) -> Self {
        Self::new(ToastKind::Info, text, ttl_ms)
    }

    pub fn success(text: impl Into<String>, ttl_ms: u64) -> Self {
        Self::new(ToastKind::Success, text, ttl_ms)
    }

    pub fn warn(text: impl Into<String>, ttl_ms: u64) -> Self {
        Self::new(ToastKind::Warn, text, ttl_ms)
    }

    fn new(kind: ToastKind, text: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            kind,
            text: text.into(),
            ttl_ms,
        }
    }
}

/// Everything the reporter needs from the machine; page details are filled
/// in by the controller at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub token: SessionToken,
    pub video: VideoRef,
}

/// Side effects requested by a transition. The machine never performs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Subscribe to time-progress and end-of-playback notifications.
    AttachPlayback,
    DetachPlayback,
    Pause,
    Play,
    SeekToStart,
    ShowChallenge { seconds: u32 },
    UpdateCountdown { remaining: u32 },
    HideChallenge,
    /// Start feeding one `ChallengeTick` per second.
    StartCountdown,
    StopCountdown,
    ShowResult { eligible: bool },
    HideResult,
    ClearToasts,
    Toast(Notice),
    /// Wait for the page to settle, then read the duration for `video`.
    ScheduleInit { video: VideoRef },
    /// Duration is not usable yet; read it again on the next metadata event.
    AwaitMetadata { video_id: String },
    /// Resolve the playlist size and announce the position in it.
    AnnouncePlaylist { index: u32 },
    Report(ReportRequest),
}
