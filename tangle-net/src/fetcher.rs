use crate::error::{FetchError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay between retry attempts. Remote relation APIs rate-limit
/// aggressively, so hammering a flaky endpoint back-to-back only makes
/// things worse.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Static credential pair attached as a basic-auth header. Some remote
/// APIs never issue an auth challenge, so the header goes out on the
/// first request rather than waiting for a 401.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

/// API-level status validation applied to the decoded body after a
/// successful transport round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCheck {
    /// JSON pointer to the status field, e.g. `/stat`.
    pub pointer: String,
    /// Value the status field must hold for a healthy response.
    pub ok_value: String,
    /// JSON pointer to the failure message field, e.g. `/message`.
    pub message_pointer: String,
}

impl StatusCheck {
    fn validate(&self, document: &Value) -> Result<()> {
        let status = document
            .pointer(&self.pointer)
            .map(render_scalar)
            .unwrap_or_default();

        if status == self.ok_value {
            return Ok(());
        }

        let message = document
            .pointer(&self.message_pointer)
            .map(render_scalar)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("status field {} was '{}'", self.pointer, status));

        Err(FetchError::RemoteApi { message })
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One retried network call plus structured-response decoding and
/// API-status validation.
pub struct HttpFetcher {
    client: Client,
    credentials: Option<Credentials>,
    retries: u32,
    status_check: Option<StatusCheck>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        let client = Client::builder()
            .user_agent("Tangle/0.2 (https://github.com/trapdoorsec/tangle)")
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            credentials: None,
            retries,
            status_check: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_status_check(mut self, check: StatusCheck) -> Self {
        self.status_check = Some(check);
        self
    }

    /// Fetch and decode one JSON document. Transport and decode
    /// failures are retried up to the configured count; an API-level
    /// status failure is logical, not transient, and is never retried.
    pub async fn fetch_json(&self, url: &str) -> Result<Value> {
        let document = self.fetch_with_retry(url).await?;

        if let Some(check) = &self.status_check {
            check.validate(&document)?;
        }

        Ok(document)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(document) => return Ok(document),
                Err(error) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "request to {} failed ({}), retry {}/{}",
                        url, error, attempt, self.retries
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Value> {
        debug!("Fetching {}", url);

        let mut request = self.client.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.secret));
        }

        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let body = response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
