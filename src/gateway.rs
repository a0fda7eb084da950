//! HTTP gateway to a LUIS-style authoring API.
//!
//! Implements [`RemoteGateway`] over the provider's REST endpoints. The
//! base URL, API path and credentials come from [`ProviderConfig`]; nothing
//! provider-specific leaks into the sync engine.
//!
//! # Endpoints
//!
//! | Operation | Method | Path |
//! |-----------|--------|------|
//! | list versions | `GET` | `/apps/{app}/versions` |
//! | delete version | `DELETE` | `/apps/{app}/versions/{version}/` |
//! | app info | `GET` | `/apps/{app}` |
//! | import | `POST` | `/apps/{app}/versions/import?versionId={version}` |
//! | start training | `POST` | `/apps/{app}/versions/{version}/train` |
//! | training status | `GET` | `/apps/{app}/versions/{version}/train` |
//! | publish | `POST` | `/apps/{app}/publish` |
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) → retry
//! - HTTP 5xx (server error) and network errors → retry, except for import
//!   and publish
//! - Import and publish retry a network error only when the connection was
//!   never established
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A 5xx or timeout on import can arrive after the provider committed the
//! version, and a second import of the same version id is rejected.
//!
//! Error responses of the form `{"error": {"code": "...", "message": "..."}}`
//! surface their `message` as the error text.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::models::{AppInfo, ModelPayload, RemoteVersion, SubmodelStatus, TrainingState};
use crate::traits::RemoteGateway;

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Which failures a request may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Safe to repeat: rate limits, server errors and network errors.
    Idempotent,
    /// Only when the provider cannot have acted on the request.
    Unsent,
}

impl RetryPolicy {
    fn retries_status(self, status: reqwest::StatusCode) -> bool {
        status.as_u16() == 429 || (self == Self::Idempotent && status.is_server_error())
    }

    fn retries_error(self, error: &reqwest::Error) -> bool {
        self == Self::Idempotent || error.is_connect()
    }
}

pub struct LuisGateway {
    client: reqwest::Client,
    base_url: String,
    key: String,
    max_retries: u32,
    retry_base: Duration,
}

impl LuisGateway {
    /// Create a gateway, reading the authoring key from `provider.key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let key = std::env::var(&config.key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.key_env))?;
        Self::with_key(config, key)
    }

    /// Create a gateway with an explicit authoring key.
    pub fn with_key(config: &ProviderConfig, key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            key: key.into(),
            max_retries: config.max_retries,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay (doubles on each retry).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request, retrying the failures `policy` allows.
    async fn send<F>(&self, what: &str, policy: RetryPolicy, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = self.retry_base * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = build().header(KEY_HEADER, &self.key).send().await;
            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let message = describe_failure(what, status.as_u16(), &body_text);

                    if policy.retries_status(status) {
                        tracing::debug!(attempt, %status, "{} failed, retrying", what);
                        last_err = Some(anyhow::anyhow!(message));
                        continue;
                    }

                    // Client error, or a write the provider may have applied
                    bail!(message);
                }
                Err(e) => {
                    if !policy.retries_error(&e) {
                        bail!("{} request failed: {}", what, e);
                    }
                    tracing::debug!(attempt, error = %e, "{} request error, retrying", what);
                    last_err = Some(anyhow::anyhow!("{} request failed: {}", what, e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", what)))
    }
}

/// Extract the provider's error message from a response body, if present.
pub fn provider_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = match json.get("error") {
        Some(serde_json::Value::Object(err)) => err.get("message").and_then(|m| m.as_str()),
        Some(serde_json::Value::String(s)) => Some(s.as_str()),
        _ => json.get("message").and_then(|m| m.as_str()),
    }?;
    let message = message.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

fn describe_failure(what: &str, status: u16, body: &str) -> String {
    match provider_error_message(body) {
        Some(message) => format!("{} failed: {}", what, message),
        None => format!("{} failed with HTTP {}", what, status),
    }
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
    #[serde(rename = "lastModifiedDateTime", default)]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppResponse {
    name: String,
    #[serde(default)]
    description: Option<String>,
    culture: String,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    #[serde(rename = "statusId", default)]
    status_id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelTrainingStatus {
    #[serde(rename = "modelId")]
    model_id: String,
    details: TrainingDetails,
}

#[derive(Debug, Deserialize)]
struct TrainingDetails {
    #[serde(rename = "statusId", default)]
    status_id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "failureReason", default)]
    failure_reason: Option<String>,
}

fn parse_state(status_id: Option<i64>, status: Option<&str>) -> Result<TrainingState> {
    if let Some(state) = status_id.and_then(TrainingState::from_status_id) {
        return Ok(state);
    }
    if let Some(state) = status.and_then(TrainingState::from_name) {
        return Ok(state);
    }
    bail!(
        "Unrecognized training status (statusId: {:?}, status: {:?})",
        status_id,
        status
    )
}

#[async_trait]
impl RemoteGateway for LuisGateway {
    async fn list_versions(&self, app_id: &str) -> Result<Vec<RemoteVersion>> {
        let url = self.url(&format!("apps/{}/versions", app_id));
        let resp = self
            .send("List versions", RetryPolicy::Idempotent, || self.client.get(&url))
            .await?;
        let versions: Vec<VersionInfo> = resp.json().await?;
        Ok(versions
            .into_iter()
            .map(|v| RemoteVersion {
                version_id: v.version,
                last_modified: v.last_modified.filter(|ts| !ts.trim().is_empty()),
            })
            .collect())
    }

    async fn delete_version(&self, app_id: &str, version_id: &str) -> Result<()> {
        let url = self.url(&format!("apps/{}/versions/{}/", app_id, version_id));
        self.send("Delete version", RetryPolicy::Idempotent, || {
            self.client.delete(&url)
        })
        .await?;
        Ok(())
    }

    async fn get_app_info(&self, app_id: &str) -> Result<AppInfo> {
        let url = self.url(&format!("apps/{}", app_id));
        let resp = self
            .send("Get app", RetryPolicy::Idempotent, || self.client.get(&url))
            .await?;
        let app: AppResponse = resp.json().await?;
        Ok(AppInfo {
            name: app.name,
            description: app.description.unwrap_or_default(),
            culture: app.culture,
        })
    }

    async fn import_version(
        &self,
        app_id: &str,
        version_id: &str,
        payload: &ModelPayload,
    ) -> Result<()> {
        let url = self.url(&format!("apps/{}/versions/import", app_id));
        self.send("Import", RetryPolicy::Unsent, || {
            self.client
                .post(&url)
                .query(&[("versionId", version_id)])
                .json(payload)
        })
        .await?;
        Ok(())
    }

    async fn start_training(&self, app_id: &str, version_id: &str) -> Result<TrainingState> {
        let url = self.url(&format!("apps/{}/versions/{}/train", app_id, version_id));
        let resp = self
            .send("Start training", RetryPolicy::Idempotent, || self.client.post(&url))
            .await?;
        let body: TrainResponse = resp.json().await?;
        parse_state(body.status_id, body.status.as_deref())
    }

    async fn poll_training(&self, app_id: &str, version_id: &str) -> Result<Vec<SubmodelStatus>> {
        let url = self.url(&format!("apps/{}/versions/{}/train", app_id, version_id));
        let resp = self
            .send("Training status", RetryPolicy::Idempotent, || self.client.get(&url))
            .await?;
        let models: Vec<ModelTrainingStatus> = resp.json().await?;
        models
            .into_iter()
            .map(|m| -> Result<SubmodelStatus> {
                Ok(SubmodelStatus {
                    state: parse_state(m.details.status_id, m.details.status.as_deref())?,
                    model_id: m.model_id,
                    failure_reason: m.details.failure_reason,
                })
            })
            .collect()
    }

    async fn publish(&self, app_id: &str, version_id: &str, staging: bool) -> Result<()> {
        let url = self.url(&format!("apps/{}/publish", app_id));
        let body = serde_json::json!({
            "versionId": version_id,
            "isStaging": staging,
        });
        self.send("Publish", RetryPolicy::Unsent, || {
            self.client.post(&url).json(&body)
        })
        .await?;
        Ok(())
    }
}
