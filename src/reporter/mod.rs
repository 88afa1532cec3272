pub mod gateway;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

pub use gateway::{GatewayError, HttpGateway, NetworkGateway};
pub use retry::retry_fixed;

use crate::config::TrackerConfig;
use crate::models::CompletionRecord;
use crate::storage::LocalStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// How a completion report ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Saved { profile_saved: bool },
    /// The backend write failed; the completion sits in the offline mirror.
    SavedLocally { profile_saved: bool },
    SkippedNoIdentity,
    SkippedTrackingOff,
    /// Neither the backend nor the mirror accepted the completion.
    Failed,
}

/// A finished, eligible view waiting to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionJob {
    pub video_id: String,
    pub title: String,
    pub playlist_id: Option<String>,
    pub playlist_title: Option<String>,
    pub total_videos: Option<u32>,
}

impl CompletionJob {
    pub fn into_record(self, email: &str) -> CompletionRecord {
        CompletionRecord {
            email: email.to_string(),
            video_id: self.video_id,
            title: self.title,
            playlist_id: self.playlist_id,
            playlist_title: self.playlist_title,
            total_videos: self.total_videos,
        }
    }
}

pub struct CompletionReporter {
    gateway: Arc<dyn NetworkGateway>,
    store: LocalStore,
    attempts: u32,
    delay: Duration,
}

impl CompletionReporter {
    pub fn new(
        gateway: Arc<dyn NetworkGateway>,
        store: LocalStore,
        attempts: u32,
        delay: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            attempts,
            delay,
        }
    }

    pub fn from_config(
        gateway: Arc<dyn NetworkGateway>,
        store: LocalStore,
        config: &TrackerConfig,
    ) -> Self {
        Self::new(gateway, store, config.retry_attempts, config.retry_delay())
    }

    /// Saves the profile, then the completion. Sign-in and the tracking
    /// toggle are read again before each remote step because either can
    /// change while a request is in flight.
    pub async fn report(&self, job: CompletionJob) -> ReportOutcome {
        let gate = match self.store.tracking_gate().await {
            Ok(gate) => gate,
            Err(err) => {
                log_error!("cannot read sign-in state: {err:#}");
                return ReportOutcome::Failed;
            }
        };
        let Some(identity) = gate.identity.clone() else {
            log_info!("no signed-in user, not saving {}", job.video_id);
            return ReportOutcome::SkippedNoIdentity;
        };
        if !gate.enabled() {
            return ReportOutcome::SkippedTrackingOff;
        }

        let gateway = self.gateway.as_ref();
        let identity_ref = &identity;
        let profile_saved = retry_fixed("profile save", self.attempts, self.delay, move || {
            gateway.save_profile(identity_ref)
        })
        .await
        .is_ok();

        match self.store.tracking_gate().await {
            Ok(gate) if gate.enabled() => {}
            Ok(_) => {
                log_info!("tracking switched off mid-report, dropping {}", job.video_id);
                return ReportOutcome::SkippedTrackingOff;
            }
            Err(err) => log_warn!("cannot re-read sign-in state: {err:#}"),
        }

        let record = job.into_record(&identity.email);
        let record_ref = &record;
        let remote = retry_fixed("completion save", self.attempts, self.delay, move || {
            gateway.record_completion(record_ref)
        })
        .await;

        match remote {
            Ok(()) => {
                log_info!("saved completion of {} for {}", record.video_id, record.email);
                ReportOutcome::Saved { profile_saved }
            }
            Err(err) => {
                log_warn!("falling back to local mirror for {}: {err}", record.video_id);
                match self
                    .store
                    .mirror_completion(&identity.email, &record, Utc::now())
                    .await
                {
                    Ok(_) => ReportOutcome::SavedLocally { profile_saved },
                    Err(err) => {
                        log_error!("local mirror write failed: {err:#}");
                        ReportOutcome::Failed
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeGateway;
    use super::*;
    use crate::models::UserIdentity;

    fn job() -> CompletionJob {
        CompletionJob {
            video_id: "dQw4w9WgXcQ".into(),
            title: "Lecture 1".into(),
            playlist_id: Some("PL1".into()),
            playlist_title: Some("Course".into()),
            total_videos: Some(10),
        }
    }

    async fn signed_in_store() -> LocalStore {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .store_identity(&UserIdentity::new("Ada", "ada@example.com"))
            .await
            .unwrap();
        store
    }

    fn reporter(gateway: Arc<FakeGateway>, store: LocalStore) -> CompletionReporter {
        CompletionReporter::new(gateway, store, 3, Duration::from_millis(800))
    }

    #[tokio::test(start_paused = true)]
    async fn saves_profile_then_completion() {
        let gateway = Arc::new(FakeGateway::default());
        let store = signed_in_store().await;

        let outcome = reporter(gateway.clone(), store.clone()).report(job()).await;

        assert_eq!(outcome, ReportOutcome::Saved { profile_saved: true });
        assert_eq!(gateway.profiles.lock().unwrap()[0].email, "ada@example.com");
        let completions = gateway.completions.lock().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0], job().into_record("ada@example.com"));
        assert!(store
            .local_progress("ada@example.com")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_completion_failures_are_retried() {
        let gateway = Arc::new(FakeGateway::failing_completions(2));
        let store = signed_in_store().await;

        let outcome = reporter(gateway.clone(), store).report(job()).await;

        assert_eq!(outcome, ReportOutcome::Saved { profile_saved: true });
        assert_eq!(gateway.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_the_mirror() {
        let gateway = Arc::new(FakeGateway::failing_completions(3));
        let store = signed_in_store().await;

        let outcome = reporter(gateway.clone(), store.clone()).report(job()).await;

        assert_eq!(outcome, ReportOutcome::SavedLocally { profile_saved: true });
        assert!(gateway.completions.lock().unwrap().is_empty());
        let local = store.local_progress("ada@example.com").await.unwrap();
        assert_eq!(local.videos[0].video_id, "dQw4w9WgXcQ");
        assert_eq!(local.playlists[0].completed_videos, vec!["dQw4w9WgXcQ"]);
        assert_eq!(local.playlists[0].total_videos, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_failure_does_not_block_the_completion() {
        let gateway = Arc::new(FakeGateway::failing_profiles(3));
        let store = signed_in_store().await;

        let outcome = reporter(gateway.clone(), store).report(job()).await;

        assert_eq!(outcome, ReportOutcome::Saved { profile_saved: false });
        assert_eq!(gateway.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_identity_skips_the_network() {
        let gateway = Arc::new(FakeGateway::default());
        let store = LocalStore::open_in_memory().unwrap();

        let outcome = reporter(gateway.clone(), store).report(job()).await;

        assert_eq!(outcome, ReportOutcome::SkippedNoIdentity);
        assert!(gateway.profiles.lock().unwrap().is_empty());
        assert!(gateway.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_off_skips_the_network() {
        let gateway = Arc::new(FakeGateway::default());
        let store = signed_in_store().await;
        store.set_tracking_flag(false).await.unwrap();

        let outcome = reporter(gateway.clone(), store).report(job()).await;

        assert_eq!(outcome, ReportOutcome::SkippedTrackingOff);
        assert!(gateway.profiles.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_switched_off_during_profile_save_drops_the_completion() {
        let gateway = Arc::new(FakeGateway::default());
        let store = signed_in_store().await;
        *gateway.switch_off_on_profile_save.lock().unwrap() = Some(store.clone());

        let outcome = reporter(gateway.clone(), store.clone()).report(job()).await;

        assert_eq!(outcome, ReportOutcome::SkippedTrackingOff);
        assert_eq!(gateway.profiles.lock().unwrap().len(), 1);
        assert!(gateway.completions.lock().unwrap().is_empty());
        assert!(store
            .local_progress("ada@example.com")
            .await
            .unwrap()
            .is_empty());
    }
}
