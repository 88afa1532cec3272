//! Sign-in, tracking toggle, dashboard and offline-sync flows that back the
//! extension popup.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use crate::models::{CompletionSummary, UserIdentity};
use crate::reporter::{GatewayError, NetworkGateway};
use crate::storage::LocalStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
}

#[derive(Clone)]
pub struct AccountService {
    gateway: Arc<dyn NetworkGateway>,
    store: LocalStore,
}

impl AccountService {
    pub fn new(gateway: Arc<dyn NetworkGateway>, store: LocalStore) -> Self {
        Self { gateway, store }
    }

    /// Creates (or refreshes) the backend profile, then signs in locally.
    pub async fn sign_up(&self, name: &str, email: &str) -> Result<UserIdentity> {
        let identity = UserIdentity::new(name.trim(), email.trim());
        if !identity.is_signed_in() {
            bail!("Email is required.");
        }

        self.gateway
            .save_profile(&identity)
            .await
            .context("Failed to save profile")?;
        self.store.store_identity(&identity).await?;

        log_info!("signed up {}", identity.email);
        Ok(identity)
    }

    /// Signs in with an existing backend profile.
    pub async fn sign_in(&self, email: &str) -> Result<UserIdentity> {
        let email = email.trim();
        if email.is_empty() {
            bail!("Email is required to sign in.");
        }

        let profile = match self.gateway.fetch_profile(email).await {
            Ok(profile) => profile,
            Err(GatewayError::NotFound) => bail!("No profile found for {email}."),
            Err(err) => return Err(anyhow!(err).context("Sign in failed")),
        };

        let identity = UserIdentity::from(profile);
        self.store.store_identity(&identity).await?;

        log_info!("signed in {}", identity.email);
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear_identity().await?;
        log_info!("signed out");
        Ok(())
    }

    pub async fn set_tracking(&self, enabled: bool) -> Result<()> {
        if self.store.identity().await?.is_none() {
            bail!("Sign in before changing tracking.");
        }
        self.store.set_tracking_flag(enabled).await
    }

    pub async fn load_dashboard(&self) -> Result<CompletionSummary> {
        let identity = self.require_identity().await?;
        self.gateway
            .fetch_completion_summary(&identity.email)
            .await
            .context("Failed to load completed videos")
    }

    /// Replays the offline mirror against the backend. Entries that fail
    /// again stay in the mirror for the next attempt.
    pub async fn sync_local_progress(&self) -> Result<SyncReport> {
        let Some(identity) = self.store.identity().await? else {
            log_info!("no user signed in, nothing to sync");
            return Ok(SyncReport::default());
        };

        let local = self.store.local_progress(&identity.email).await?;
        if local.is_empty() {
            return Ok(SyncReport::default());
        }

        let mut synced = Vec::new();
        for video in &local.videos {
            let record = local.to_record(&identity.email, video);
            match self.gateway.record_completion(&record).await {
                Ok(()) => synced.push(video.video_id.clone()),
                Err(err) => log_warn!("failed to sync {}: {err}", video.video_id),
            }
        }

        self.store
            .prune_local_progress(&identity.email, &synced)
            .await?;

        let report = SyncReport {
            attempted: local.videos.len(),
            synced: synced.len(),
        };
        log_info!(
            "synced {}/{} offline completions",
            report.synced,
            report.attempted
        );
        Ok(report)
    }

    async fn require_identity(&self) -> Result<UserIdentity> {
        self.store
            .identity()
            .await?
            .ok_or_else(|| anyhow!("Please sign in."))
    }
}
