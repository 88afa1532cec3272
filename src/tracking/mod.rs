pub mod challenge;
pub mod checkpoints;
pub mod effect;
pub mod machine;
pub mod session;

pub use challenge::{ChallengeEvent, ChallengeState};
pub use checkpoints::{
    generate_checkpoints, pick_challenge_offset, RandomSource, ScriptedRandom, SeededRandom,
    ThreadRandom,
};
pub use effect::{Effect, Notice, ReportRequest, ToastKind};
pub use machine::{Tracker, TrackerEvent, TrackerSettings, TrackerSnapshot};
pub use session::{SessionToken, TrackingSession};
