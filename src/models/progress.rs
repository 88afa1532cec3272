use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /video/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub email: String,
    pub video_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_videos: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedVideo {
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub playlist_id: String,
    #[serde(default)]
    pub playlist_title: String,
    #[serde(default)]
    pub completed_count: u32,
    #[serde(default)]
    pub total_videos: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlaylistSummary {
    pub fn is_complete(&self) -> bool {
        self.total_videos > 0 && self.completed_count >= self.total_videos
    }
}

/// Response of `GET /video/completed/{email}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    #[serde(default)]
    pub completed_videos: Vec<CompletedVideo>,
    #[serde(default)]
    pub playlists: Vec<PlaylistSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalVideo {
    pub video_id: String,
    pub title: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub playlist_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalPlaylist {
    pub playlist_id: String,
    #[serde(default)]
    pub playlist_title: String,
    #[serde(default)]
    pub completed_videos: Vec<String>,
    #[serde(default)]
    pub total_videos: u32,
}

/// Offline mirror of completions kept under `yt_progress_<email>` until the
/// next sync replays it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalProgress {
    #[serde(default)]
    pub videos: Vec<LocalVideo>,
    #[serde(default)]
    pub playlists: Vec<LocalPlaylist>,
}

impl LocalProgress {
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.playlists.is_empty()
    }

    /// Merges one completion. Repeated videos and repeated playlist members
    /// are ignored, so replaying the same failure twice is harmless.
    pub fn record(&mut self, record: &CompletionRecord, completed_at: DateTime<Utc>) {
        if !self.videos.iter().any(|v| v.video_id == record.video_id) {
            self.videos.push(LocalVideo {
                video_id: record.video_id.clone(),
                title: record.title.clone(),
                completed_at,
                playlist_id: record.playlist_id.clone(),
                playlist_title: record.playlist_title.clone(),
            });
        }

        let Some(playlist_id) = record.playlist_id.as_deref() else {
            return;
        };

        let index = match self
            .playlists
            .iter()
            .position(|p| p.playlist_id == playlist_id)
        {
            Some(index) => index,
            None => {
                self.playlists.push(LocalPlaylist {
                    playlist_id: playlist_id.to_string(),
                    playlist_title: record.playlist_title.clone().unwrap_or_default(),
                    completed_videos: Vec::new(),
                    total_videos: record.total_videos.unwrap_or(0),
                });
                self.playlists.len() - 1
            }
        };

        let playlist = &mut self.playlists[index];
        if !playlist.completed_videos.contains(&record.video_id) {
            playlist.completed_videos.push(record.video_id.clone());
        }
        if playlist.total_videos == 0 {
            playlist.total_videos = record.total_videos.unwrap_or(0);
        }
    }

    /// Rebuilds the request for a mirrored video, used by the sync path.
    pub fn to_record(&self, email: &str, video: &LocalVideo) -> CompletionRecord {
        let total_videos = video.playlist_id.as_deref().and_then(|id| {
            self.playlists
                .iter()
                .find(|p| p.playlist_id == id)
                .map(|p| p.total_videos)
                .filter(|total| *total > 0)
        });

        CompletionRecord {
            email: email.to_string(),
            video_id: video.video_id.clone(),
            title: video.title.clone(),
            playlist_id: video.playlist_id.clone(),
            playlist_title: video.playlist_title.clone(),
            total_videos,
        }
    }
}
