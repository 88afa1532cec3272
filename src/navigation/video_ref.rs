use serde::Serialize;
use url::Url;

const VIDEO_ID_LEN: usize = 11;

/// The video a page URL points at, plus its playlist context if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    pub video_id: String,
    pub playlist_id: Option<String>,
    /// 1-based position inside the playlist.
    pub playlist_index: u32,
}

impl VideoRef {
    pub fn single(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            playlist_id: None,
            playlist_index: 1,
        }
    }

    /// Extracts the video from either `?v=<id>` or `/shorts/<id>`.
    /// Returns `None` for pages that are not a video (home, search, channel).
    pub fn parse(href: &str) -> Option<Self> {
        let url = Url::parse(href).ok()?;

        let video_id = url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|id| id.chars().count() == VIDEO_ID_LEN)
            .or_else(|| shorts_id(&url))?;

        let playlist_id = url
            .query_pairs()
            .find(|(key, _)| key == "list")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty());

        let playlist_index = url
            .query_pairs()
            .find(|(key, _)| key == "index")
            .and_then(|(_, value)| value.parse::<u32>().ok())
            .unwrap_or(1);

        Some(Self {
            video_id,
            playlist_id,
            playlist_index,
        })
    }

    pub fn in_playlist(&self) -> bool {
        self.playlist_id.is_some()
    }
}

fn shorts_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    if segments.next()? != "shorts" {
        return None;
    }
    let candidate = segments.next()?;
    let prefix: String = candidate.chars().take(VIDEO_ID_LEN).collect();
    let valid = prefix.len() == VIDEO_ID_LEN
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(prefix)
}
