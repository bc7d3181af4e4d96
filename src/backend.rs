//! Generation Backend
//!
//! The external renderer that turns one concrete prompt into one output. The orchestrator
//! only sees the [`GenerationBackend`] trait; [`HttpGenerationBackend`] talks to a JSON
//! HTTP endpoint.

use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Per-call settings passed through to the backend unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default)]
    pub media: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    pub output_id: String,
    pub output_url: String,
}

/// Generation backend trait
///
/// Calls for the same shot may be retried; implementations must tolerate re-submission.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn dispatch(
        &self,
        prompt: &str,
        reference_assets: &[String],
        settings: &DispatchSettings,
    ) -> Result<GeneratedOutput, GenerationError>;

    fn backend_name(&self) -> &str;
}

/// Backend section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Falls back to the SHOTQUEUE_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub media: MediaKind,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            media: MediaKind::default(),
            model: None,
            aspect_ratio: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be at least 1".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(format!("endpoint must be an http(s) URL, got '{}'", endpoint));
            }
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            media: self.media,
            model: self.model.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
        }
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("SHOTQUEUE_API_KEY").ok())
    }
}

const BACKEND_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    reference_assets: &'a [String],
    #[serde(flatten)]
    settings: &'a DispatchSettings,
}

#[derive(Deserialize)]
struct GenerationResponse {
    id: String,
    url: String,
}

pub struct HttpGenerationBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGenerationBackend {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(BACKEND_HTTP_CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, GenerationError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            GenerationError::RequestFailed("No generation endpoint configured".to_string())
        })?;
        Self::new(
            endpoint,
            config.resolved_api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn dispatch(
        &self,
        prompt: &str,
        reference_assets: &[String],
        settings: &DispatchSettings,
    ) -> Result<GeneratedOutput, GenerationError> {
        let request = GenerationRequest {
            prompt,
            reference_assets,
            settings,
        };
        let url = format!("{}/generations", self.endpoint);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, error_text));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        Ok(GeneratedOutput {
            output_id: body.id,
            output_url: body.url,
        })
    }

    fn backend_name(&self) -> &str {
        "http"
    }
}

fn map_status(status: StatusCode, error_text: String) -> GenerationError {
    match status.as_u16() {
        401 | 403 => GenerationError::AuthFailed(format!("Authentication failed: {}", error_text)),
        429 => GenerationError::RateLimited(format!("Rate limit exceeded: {}", error_text)),
        400 | 422 => GenerationError::Rejected(error_text),
        _ => GenerationError::RequestFailed(format!(
            "Request failed with status {}: {}",
            status, error_text
        )),
    }
}

fn map_http_error(error: reqwest::Error) -> GenerationError {
    if let Some(status) = error.status() {
        map_status(status, error.to_string())
    } else if error.is_timeout() {
        GenerationError::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        GenerationError::RequestFailed(format!("Connection error: {}", error))
    } else {
        GenerationError::RequestFailed(format!("HTTP error: {}", error))
    }
}
