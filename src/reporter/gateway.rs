use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::TrackerConfig;
use crate::models::{CompletionRecord, CompletionSummary, Profile, UserIdentity};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found")]
    NotFound,
}

/// The backend calls the tracker and the account flows depend on. Anything
/// that can carry these requests (HTTP, an extension message bridge, a test
/// double) can sit behind it.
#[async_trait]
pub trait NetworkGateway: Send + Sync {
    /// `POST /profile/save`
    async fn save_profile(&self, identity: &UserIdentity) -> Result<(), GatewayError>;

    /// `POST /video/complete`
    async fn record_completion(&self, record: &CompletionRecord) -> Result<(), GatewayError>;

    /// `GET /video/completed/{email}`
    async fn fetch_completion_summary(
        &self,
        email: &str,
    ) -> Result<CompletionSummary, GatewayError>;

    /// `GET /profile/{email}`; `NotFound` when no profile exists.
    async fn fetch_profile(&self, email: &str) -> Result<Profile, GatewayError>;

    /// `GET /health`
    async fn check_health(&self) -> Result<(), GatewayError>;
}

pub struct HttpGateway {
    client: Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(api_base).with_context(|| format!("invalid API base {api_base}"))?;
        if base.cannot_be_a_base() {
            bail!("API base {api_base} cannot carry a path");
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("certiflex/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, base })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(&config.api_base, config.request_timeout())
    }

    /// Appends percent-encoded path segments to the API base.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn expect_success(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, GatewayError> {
        let response = self.client.get(self.endpoint(segments)).send().await?;
        Ok(Self::expect_success(response).await?.json::<T>().await?)
    }
}

#[async_trait]
impl NetworkGateway for HttpGateway {
    async fn save_profile(&self, identity: &UserIdentity) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&["profile", "save"]))
            .json(identity)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn record_completion(&self, record: &CompletionRecord) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&["video", "complete"]))
            .json(record)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn fetch_completion_summary(
        &self,
        email: &str,
    ) -> Result<CompletionSummary, GatewayError> {
        self.get_json(&["video", "completed", email]).await
    }

    async fn fetch_profile(&self, email: &str) -> Result<Profile, GatewayError> {
        self.get_json(&["profile", email]).await
    }

    async fn check_health(&self) -> Result<(), GatewayError> {
        let response = self.client.get(self.endpoint(&["health"])).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoints_join_and_encode_segments() {
        let gw = gateway("https://api.example.com");
        assert_eq!(
            gw.endpoint(&["profile", "save"]).as_str(),
            "https://api.example.com/profile/save"
        );
        assert_eq!(
            gw.endpoint(&["video", "completed", "a b/c@d.e"]).as_str(),
            "https://api.example.com/video/completed/a%20b%2Fc@d.e"
        );
    }

    #[test]
    fn base_path_and_trailing_slash_are_kept_once() {
        let gw = gateway("https://api.example.com/v1/");
        assert_eq!(
            gw.endpoint(&["health"]).as_str(),
            "https://api.example.com/v1/health"
        );
    }

    #[test]
    fn unusable_bases_are_rejected() {
        assert!(HttpGateway::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpGateway::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }
}
