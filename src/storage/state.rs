use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{CompletionRecord, LocalProgress, UserIdentity};

use super::LocalStore;

pub const USER_KEY: &str = "yt_user";
pub const TRACKING_FLAG_KEY: &str = "yt_tracking_flag";

pub fn progress_key(email: &str) -> String {
    format!("yt_progress_{email}")
}

/// Sign-in state plus the tracking toggle, read together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackingGate {
    pub identity: Option<UserIdentity>,
    pub flag: u8,
}

impl TrackingGate {
    pub fn enabled(&self) -> bool {
        self.identity.is_some() && self.flag == 1
    }
}

impl LocalStore {
    pub async fn identity(&self) -> Result<Option<UserIdentity>> {
        Ok(self
            .get_json::<UserIdentity>(USER_KEY)
            .await?
            .filter(UserIdentity::is_signed_in))
    }

    /// Stores the identity. Tracking defaults to on the first time someone
    /// signs in; an explicit earlier choice is kept.
    pub async fn store_identity(&self, identity: &UserIdentity) -> Result<()> {
        self.set_json(USER_KEY, identity).await?;
        self.update_json(TRACKING_FLAG_KEY, |flag: Option<u8>| flag.unwrap_or(1))
            .await?;
        Ok(())
    }

    /// Signing out always switches tracking off.
    pub async fn clear_identity(&self) -> Result<()> {
        self.remove(&[USER_KEY]).await?;
        self.set_json(TRACKING_FLAG_KEY, &0u8).await
    }

    pub async fn tracking_gate(&self) -> Result<TrackingGate> {
        let identity = self.identity().await?;
        let flag = match identity {
            Some(_) => self.get_json::<u8>(TRACKING_FLAG_KEY).await?.unwrap_or(1),
            None => 0,
        };
        Ok(TrackingGate { identity, flag })
    }

    pub async fn set_tracking_flag(&self, enabled: bool) -> Result<()> {
        self.set_json(TRACKING_FLAG_KEY, &u8::from(enabled)).await
    }

    pub async fn local_progress(&self, email: &str) -> Result<LocalProgress> {
        Ok(self
            .get_json::<LocalProgress>(&progress_key(email))
            .await?
            .unwrap_or_default())
    }

    /// Folds one completion into the user's offline mirror.
    pub async fn mirror_completion(
        &self,
        email: &str,
        record: &CompletionRecord,
        completed_at: DateTime<Utc>,
    ) -> Result<LocalProgress> {
        let record = record.clone();
        self.update_json(&progress_key(email), move |current: Option<LocalProgress>| {
            let mut progress = current.unwrap_or_default();
            progress.record(&record, completed_at);
            progress
        })
        .await
    }

    /// Drops the given videos from the mirror, deleting the key once nothing
    /// is left.
    pub async fn prune_local_progress(&self, email: &str, synced: &[String]) -> Result<()> {
        let key = progress_key(email);
        let synced = synced.to_vec();
        let remaining = self
            .update_json(&key, move |current: Option<LocalProgress>| {
                let mut progress = current.unwrap_or_default();
                progress.videos.retain(|v| !synced.contains(&v.video_id));
                for playlist in &mut progress.playlists {
                    playlist.completed_videos.retain(|id| !synced.contains(id));
                }
                progress
                    .playlists
                    .retain(|p| !p.completed_videos.is_empty());
                progress
            })
            .await?;

        if remaining.is_empty() {
            self.remove(&[key.as_str()]).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(video_id: &str) -> CompletionRecord {
        CompletionRecord {
            email: "ada@example.com".into(),
            video_id: video_id.into(),
            title: "Lecture".into(),
            playlist_id: Some("PL1".into()),
            playlist_title: Some("Course".into()),
            total_videos: Some(4),
        }
    }

    #[tokio::test]
    async fn signed_out_means_tracking_off() {
        let store = LocalStore::open_in_memory().unwrap();
        let gate = store.tracking_gate().await.unwrap();
        assert_eq!(gate, TrackingGate::default());
        assert!(!gate.enabled());

        // a stale flag without identity still reads as off
        store.set_tracking_flag(true).await.unwrap();
        assert!(!store.tracking_gate().await.unwrap().enabled());
    }

    #[tokio::test]
    async fn sign_in_defaults_tracking_on_and_sign_out_forces_off() {
        let store = LocalStore::open_in_memory().unwrap();
        store.remove(&[TRACKING_FLAG_KEY]).await.unwrap();
        let ada = UserIdentity::new("Ada", "ada@example.com");

        store.store_identity(&ada).await.unwrap();
        let gate = store.tracking_gate().await.unwrap();
        assert!(gate.enabled());
        assert_eq!(gate.identity, Some(ada.clone()));

        store.set_tracking_flag(false).await.unwrap();
        store.store_identity(&ada).await.unwrap();
        assert!(!store.tracking_gate().await.unwrap().enabled());

        store.clear_identity().await.unwrap();
        assert_eq!(store.identity().await.unwrap(), None);
        assert_eq!(
            store.get_json::<u8>(TRACKING_FLAG_KEY).await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn blank_email_is_not_an_identity() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .set_json(USER_KEY, &UserIdentity::new("Nobody", "  "))
            .await
            .unwrap();
        assert_eq!(store.identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn mirror_accumulates_and_prunes_per_user() {
        let store = LocalStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .mirror_completion("ada@example.com", &record("aaaaaaaaaaa"), now)
            .await
            .unwrap();
        store
            .mirror_completion("ada@example.com", &record("bbbbbbbbbbb"), now)
            .await
            .unwrap();
        assert!(store
            .local_progress("bob@example.com")
            .await
            .unwrap()
            .is_empty());

        let progress = store.local_progress("ada@example.com").await.unwrap();
        assert_eq!(progress.videos.len(), 2);
        assert_eq!(progress.playlists[0].completed_videos.len(), 2);

        store
            .prune_local_progress("ada@example.com", &["aaaaaaaaaaa".to_string()])
            .await
            .unwrap();
        let progress = store.local_progress("ada@example.com").await.unwrap();
        assert_eq!(progress.videos.len(), 1);
        assert_eq!(progress.playlists[0].completed_videos, vec!["bbbbbbbbbbb"]);

        store
            .prune_local_progress("ada@example.com", &["bbbbbbbbbbb".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store
                .get_json::<LocalProgress>(&progress_key("ada@example.com"))
                .await
                .unwrap(),
            None
        );
    }
}
