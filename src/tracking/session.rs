use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::navigation::VideoRef;

use super::challenge::ChallengeState;
use super::checkpoints::{generate_checkpoints, pick_challenge_offset, RandomSource};

/// Identifies one tracking session. Results of async work started for a
/// session carry its token and are dropped when it no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Progress for a single view of a single video.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub token: SessionToken,
    pub video: VideoRef,
    pub duration_seconds: f64,
    pub checkpoints: Vec<u32>,
    /// Indices into `checkpoints`. Only ever grows.
    pub crossed: BTreeSet<usize>,
    pub challenge_offset: Option<u32>,
    pub challenge: ChallengeState,
    pub reported: bool,
}

impl TrackingSession {
    pub fn new(
        video: VideoRef,
        duration_seconds: f64,
        checkpoint_count: usize,
        rng: &mut dyn RandomSource,
    ) -> Self {
        let checkpoints = generate_checkpoints(duration_seconds, checkpoint_count, rng);
        let challenge_offset = pick_challenge_offset(&checkpoints, rng);

        Self {
            token: SessionToken::new(),
            video,
            duration_seconds,
            checkpoints,
            crossed: BTreeSet::new(),
            challenge_offset,
            challenge: ChallengeState::NotReached,
            reported: false,
        }
    }

    /// Marks every uncrossed checkpoint equal to `floor(current_time)` and
    /// returns the newly crossed indices.
    ///
    /// Matching is exact on the whole second, so a seek that jumps over a
    /// checkpoint without landing on it leaves that checkpoint uncrossed.
    pub fn record_time(&mut self, current_time: f64) -> Vec<usize> {
        if !current_time.is_finite() || current_time < 0.0 {
            return Vec::new();
        }
        let whole_second = current_time.floor() as u64;

        let newly: Vec<usize> = self
            .checkpoints
            .iter()
            .enumerate()
            .filter(|(idx, ts)| u64::from(**ts) == whole_second && !self.crossed.contains(idx))
            .map(|(idx, _)| idx)
            .collect();

        self.crossed.extend(newly.iter().copied());
        newly
    }

    pub fn all_crossed(&self) -> bool {
        self.crossed.len() == self.checkpoints.len()
    }

    pub fn is_eligible(&self) -> bool {
        self.all_crossed() && self.challenge == ChallengeState::Passed
    }
}
