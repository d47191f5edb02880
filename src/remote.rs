//! The remote source of truth.
//!
//! The engine only sees the [`RemoteSource`] trait: two reads and one write,
//! each returning typed data or a [`RemoteError`]. [`HttpRemote`] is the
//! production implementation over HTTP + JSON:
//!
//! ```text
//! GET  {base}/importantNews   → [NewsPayload]
//! GET  {base}/steps           → [StepPayload]
//! POST {base}/gcm/tokens      ← {"token": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};

use crate::model::{NewsPayload, StepPayload};

/// Errors talking to the remote source. All of them are transient from the
/// engine's point of view: the next trigger tries again.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} did not answer within {1:?}")]
    Timeout(&'static str, Duration),

    #[error("invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// What the engine needs from the remote.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_news(&self) -> Result<Vec<NewsPayload>, RemoteError>;

    async fn fetch_steps(&self) -> Result<Vec<StepPayload>, RemoteError>;

    /// Posts a registration token. `Ok(false)` means the remote refused it.
    async fn post_registration_token(&self, token: &str) -> Result<bool, RemoteError>;
}

const NEWS_PATH: &str = "importantNews";
const STEPS_PATH: &str = "steps";
const TOKENS_PATH: &str = "gcm/tokens";

/// [`RemoteSource`] over HTTP with JSON bodies.
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
struct TokenPost<'a> {
    token: &'a str,
}

impl HttpRemote {
    /// Creates a client for `base_url`, with `timeout` applied to every request.
    ///
    /// A trailing `/` is added to the base URL when missing so relative
    /// endpoints resolve beneath it.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|e| RemoteError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base.join(path).map_err(|e| RemoteError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, RemoteError> {
        let response = self.client.get(self.endpoint(path)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                endpoint: path,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_news(&self) -> Result<Vec<NewsPayload>, RemoteError> {
        self.get_json(NEWS_PATH).await
    }

    async fn fetch_steps(&self) -> Result<Vec<StepPayload>, RemoteError> {
        self.get_json(STEPS_PATH).await
    }

    async fn post_registration_token(&self, token: &str) -> Result<bool, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(TOKENS_PATH)?)
            .json(&TokenPost { token })
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_beneath_base_with_or_without_slash() {
        let with = HttpRemote::new("https://example.org/api/", Duration::from_secs(1)).unwrap();
        let without = HttpRemote::new("https://example.org/api", Duration::from_secs(1)).unwrap();

        for remote in [with, without] {
            assert_eq!(
                remote.endpoint(STEPS_PATH).unwrap().as_str(),
                "https://example.org/api/steps"
            );
            assert_eq!(
                remote.endpoint(TOKENS_PATH).unwrap().as_str(),
                "https://example.org/api/gcm/tokens"
            );
        }
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpRemote::new("not a url", Duration::from_secs(1))
            .err()
            .unwrap();

        assert!(matches!(err, RemoteError::InvalidUrl { .. }));
    }

    #[test]
    fn token_post_body_shape() {
        let json = serde_json::to_string(&TokenPost { token: "abc" }).unwrap();

        assert_eq!(json, r#"{"token":"abc"}"#);
    }
}
