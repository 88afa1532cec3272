use serde::Serialize;

use super::effect::{Effect, Notice};

/// Attention check for one session. `Passed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ChallengeState {
    #[default]
    NotReached,
    Pending {
        remaining: u32,
    },
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// Playback crossed the challenge checkpoint.
    Arm { seconds: u32 },
    /// One second of countdown elapsed.
    Tick,
    /// The viewer pressed the confirmation button.
    Confirm,
}

impl ChallengeState {
    pub fn apply(self, event: ChallengeEvent) -> (ChallengeState, Vec<Effect>) {
        match (self, event) {
            (ChallengeState::NotReached, ChallengeEvent::Arm { seconds: 0 }) => {
                (ChallengeState::Failed, failure_effects(false))
            }
            (ChallengeState::NotReached, ChallengeEvent::Arm { seconds }) => (
                ChallengeState::Pending { remaining: seconds },
                vec![
                    Effect::Pause,
                    Effect::ShowChallenge { seconds },
                    Effect::StartCountdown,
                ],
            ),
            (ChallengeState::Pending { remaining }, ChallengeEvent::Tick) => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    (ChallengeState::Failed, failure_effects(true))
                } else {
                    (
                        ChallengeState::Pending { remaining },
                        vec![Effect::UpdateCountdown { remaining }],
                    )
                }
            }
            (ChallengeState::Pending { .. }, ChallengeEvent::Confirm) => (
                ChallengeState::Passed,
                vec![
                    Effect::StopCountdown,
                    Effect::HideChallenge,
                    Effect::Play,
                    Effect::Toast(Notice::success("✅ Attention check passed", 2000)),
                ],
            ),
            (state, _) => (state, Vec::new()),
        }
    }
}

fn failure_effects(prompt_open: bool) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(6);
    if prompt_open {
        effects.push(Effect::UpdateCountdown { remaining: 0 });
        effects.push(Effect::StopCountdown);
        effects.push(Effect::HideChallenge);
    }
    effects.extend([
        Effect::SeekToStart,
        Effect::Pause,
        Effect::Toast(Notice::warn("⏳ Attention check failed, video reset", 4000)),
    ]);
    effects
}
