//! JSON-over-HTTP client for the platform's remote APIs
//!
//! Remote APIs wrap payloads in a `{result, code, message, data}` envelope.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub result: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T, RemoteError> {
        if !self.result {
            return Err(RemoteError::Rejected(self.message));
        }
        self.data
            .ok_or_else(|| RemoteError::Deserialization("envelope has no data".to_string()))
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `{base_url}/{path}` and unwrap the response envelope
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Deserialization(e.to_string()))?;

        tracing::debug!(url = %url, "Remote API call succeeded");
        envelope.into_data()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}
