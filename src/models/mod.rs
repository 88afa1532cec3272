pub mod identity;
pub mod progress;

pub use identity::{Profile, UserIdentity};
pub use progress::{
    CompletedVideo, CompletionRecord, CompletionSummary, LocalPlaylist, LocalProgress,
    LocalVideo, PlaylistSummary,
};
