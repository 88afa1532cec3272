//! The tracking state machine.
//!
//! `Tracker::handle` is the only way state changes: it takes one event and
//! returns the effects the host should perform. Timers, network calls and
//! DOM access all live outside, in the controller, and come back in as
//! events.

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::navigation::VideoRef;
use crate::reporter::ReportOutcome;

use super::challenge::{ChallengeEvent, ChallengeState};
use super::checkpoints::RandomSource;
use super::effect::{Effect, Notice, ReportRequest};
use super::session::{SessionToken, TrackingSession};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// Sign-in state or the tracking toggle changed.
    TrackingChanged { enabled: bool },
    /// The page URL settled on `href`.
    UrlChanged(String),
    /// The player reported `duration` for `video_id` (may be NaN while
    /// metadata is still loading).
    DurationKnown { video_id: String, duration: f64 },
    TimeUpdate { current_time: f64 },
    PlaybackEnded,
    ChallengeTick,
    ChallengeConfirmed,
    ReportFinished {
        token: SessionToken,
        outcome: ReportOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub checkpoint_count: usize,
    pub challenge_seconds: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            checkpoint_count: 5,
            challenge_seconds: 5,
        }
    }
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            checkpoint_count: config.checkpoint_count,
            challenge_seconds: config.challenge_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub tracking_enabled: bool,
    pub video: Option<VideoRef>,
    pub session_token: Option<SessionToken>,
    pub checkpoints: Vec<u32>,
    pub crossed: usize,
    pub challenge_offset: Option<u32>,
    pub challenge: ChallengeState,
    pub eligible: bool,
}

pub struct Tracker {
    settings: TrackerSettings,
    rng: Box<dyn RandomSource>,
    tracking_enabled: bool,
    last_href: Option<String>,
    /// Video the page currently shows; set before its session exists.
    current: Option<VideoRef>,
    session: Option<TrackingSession>,
}

impl Tracker {
    pub fn new(settings: TrackerSettings, rng: Box<dyn RandomSource>) -> Self {
        Self {
            settings,
            rng,
            tracking_enabled: false,
            last_href: None,
            current: None,
            session: None,
        }
    }

    pub fn current_video(&self) -> Option<&VideoRef> {
        self.current.as_ref()
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let session = self.session.as_ref();
        TrackerSnapshot {
            tracking_enabled: self.tracking_enabled,
            video: self.current.clone(),
            session_token: session.map(|s| s.token),
            checkpoints: session.map(|s| s.checkpoints.clone()).unwrap_or_default(),
            crossed: session.map(|s| s.crossed.len()).unwrap_or(0),
            challenge_offset: session.and_then(|s| s.challenge_offset),
            challenge: session.map(|s| s.challenge).unwrap_or_default(),
            eligible: session.map(TrackingSession::is_eligible).unwrap_or(false),
        }
    }

    pub fn handle(&mut self, event: TrackerEvent) -> Vec<Effect> {
        match event {
            TrackerEvent::TrackingChanged { enabled } => self.on_tracking_changed(enabled),
            TrackerEvent::UrlChanged(href) => self.on_url_changed(href),
            _ if !self.tracking_enabled => Vec::new(),
            TrackerEvent::DurationKnown { video_id, duration } => {
                self.on_duration_known(&video_id, duration)
            }
            TrackerEvent::TimeUpdate { current_time } => self.on_time_update(current_time),
            TrackerEvent::PlaybackEnded => self.on_playback_ended(),
            TrackerEvent::ChallengeTick => self.apply_challenge(ChallengeEvent::Tick),
            TrackerEvent::ChallengeConfirmed => self.apply_challenge(ChallengeEvent::Confirm),
            TrackerEvent::ReportFinished { token, outcome } => {
                self.on_report_finished(token, outcome)
            }
        }
    }

    fn on_tracking_changed(&mut self, enabled: bool) -> Vec<Effect> {
        if enabled == self.tracking_enabled {
            return Vec::new();
        }
        self.tracking_enabled = enabled;

        if enabled {
            log_info!("tracking enabled");
            return match self.last_href.clone() {
                Some(href) => self.on_url_changed(href),
                None => Vec::new(),
            };
        }

        log_info!("tracking disabled, dropping session");
        let mut effects = self.teardown();
        effects.push(Effect::ClearToasts);
        effects
    }

    fn on_url_changed(&mut self, href: String) -> Vec<Effect> {
        let parsed = VideoRef::parse(&href);
        self.last_href = Some(href);

        if !self.tracking_enabled {
            return Vec::new();
        }
        let Some(video) = parsed else {
            return Vec::new();
        };
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.video_id == video.video_id)
        {
            return Vec::new();
        }

        log_info!("video changed to {}", video.video_id);
        let mut effects = self.teardown();
        self.current = Some(video.clone());
        effects.push(Effect::ScheduleInit { video });
        effects
    }

    fn on_duration_known(&mut self, video_id: &str, duration: f64) -> Vec<Effect> {
        let Some(video) = self.current.clone() else {
            return Vec::new();
        };
        if video.video_id != video_id {
            log_debug!("ignoring duration for stale video {video_id}");
            return Vec::new();
        }
        if self.session.is_some() {
            return Vec::new();
        }
        if !duration.is_finite() || duration <= 0.0 {
            return vec![Effect::AwaitMetadata {
                video_id: video_id.to_string(),
            }];
        }

        let session = TrackingSession::new(
            video.clone(),
            duration,
            self.settings.checkpoint_count,
            self.rng.as_mut(),
        );
        if session.checkpoints.is_empty() {
            log_warn!("{video_id} is too short ({duration:.1}s) for checkpoints");
        }
        log_debug!(
            "session {} for {video_id}: checkpoints {:?}, challenge at {:?}",
            session.token,
            session.checkpoints,
            session.challenge_offset
        );
        self.session = Some(session);

        let announce = if video.in_playlist() {
            Effect::AnnouncePlaylist {
                index: video.playlist_index,
            }
        } else {
            Effect::Toast(Notice::success("🎬 You are watching a single video", 5000))
        };
        vec![announce, Effect::AttachPlayback]
    }

    fn on_time_update(&mut self, current_time: f64) -> Vec<Effect> {
        let challenge_seconds = self.settings.challenge_seconds;
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        for index in session.record_time(current_time) {
            effects.push(Effect::Toast(Notice::success(
                format!(
                    "✅ Checkpoint {} / {} reached",
                    session.crossed.len(),
                    session.checkpoints.len()
                ),
                3000,
            )));

            if Some(session.checkpoints[index]) == session.challenge_offset {
                let (next, challenge_effects) = session.challenge.apply(ChallengeEvent::Arm {
                    seconds: challenge_seconds,
                });
                session.challenge = next;
                effects.extend(challenge_effects);
            }
        }
        effects
    }

    fn apply_challenge(&mut self, event: ChallengeEvent) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let (next, effects) = session.challenge.apply(event);
        if next != session.challenge {
            log_info!("attention check {:?} -> {:?}", session.challenge, next);
        }
        session.challenge = next;
        effects
    }

    fn on_playback_ended(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let eligible = session.is_eligible();
        log_info!(
            "{} ended: {}/{} checkpoints, challenge {:?}, eligible={eligible}",
            session.video.video_id,
            session.crossed.len(),
            session.checkpoints.len(),
            session.challenge
        );

        let mut effects = vec![Effect::ShowResult { eligible }];
        if !eligible {
            effects.push(Effect::Toast(Notice::warn(
                "You did not pass all checks. No certificate.",
                4500,
            )));
            return effects;
        }

        if session.reported {
            return effects;
        }
        session.reported = true;
        effects.push(Effect::Report(ReportRequest {
            token: session.token,
            video: session.video.clone(),
        }));
        effects
    }

    fn on_report_finished(&mut self, token: SessionToken, outcome: ReportOutcome) -> Vec<Effect> {
        let Some(session) = self.session.as_ref().filter(|s| s.token == token) else {
            log_debug!("dropping report result for finished session {token}");
            return Vec::new();
        };

        let mut effects = Vec::new();
        if matches!(
            outcome,
            ReportOutcome::Saved {
                profile_saved: false
            } | ReportOutcome::SavedLocally {
                profile_saved: false
            }
        ) {
            effects.push(Effect::Toast(Notice::warn("⚠️ Could not save profile", 3000)));
        }

        match outcome {
            ReportOutcome::Saved { .. } => {
                effects.push(Effect::Toast(Notice::success("✅ Progress saved", 2200)));
                if session.video.in_playlist() {
                    effects.push(Effect::Toast(Notice::info(
                        "📈 Updated playlist progress: +1 video",
                        3500,
                    )));
                }
            }
            ReportOutcome::SavedLocally { .. } => {
                effects.push(Effect::Toast(Notice::info(
                    "💾 Saved locally (offline)",
                    3000,
                )));
            }
            ReportOutcome::SkippedNoIdentity => {
                effects.push(Effect::Toast(Notice::warn(
                    "⚠️ Sign in via the extension popup to save progress.",
                    5000,
                )));
            }
            ReportOutcome::SkippedTrackingOff => {}
            ReportOutcome::Failed => {
                effects.push(Effect::Toast(Notice::warn("⚠️ Could not save progress", 3500)));
            }
        }
        effects
    }

    /// Forgets the current video and its session and closes anything that
    /// session had open on the page.
    fn teardown(&mut self) -> Vec<Effect> {
        let had_video = self.current.take().is_some();
        let had_session = self.session.take().is_some();
        if !had_video && !had_session {
            return Vec::new();
        }
        vec![
            Effect::StopCountdown,
            Effect::HideChallenge,
            Effect::HideResult,
            Effect::DetachPlayback,
        ]
    }
}
