//! License server client.
//!
//! The server speaks the Easy Digital Downloads licensing API: a `GET` with
//! `edd_action`, `item_name`, `license` and `url` query parameters, answered
//! by a JSON object whose `license` field carries the verdict.

use crate::config::ActivationConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::instance::InstanceId;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Error code returned when the license has no activation slots left.
pub const NO_ACTIVATIONS_LEFT: &str = "no_activations_left";

/// Action requested from the license server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseAction {
    ActivateLicense,
    DeactivateLicense,
    CheckLicense,
}

impl LicenseAction {
    /// Returns the `edd_action` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivateLicense => "activate_license",
            Self::DeactivateLicense => "deactivate_license",
            Self::CheckLicense => "check_license",
        }
    }
}

impl fmt::Display for LicenseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the license server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    pub action: LicenseAction,
    pub item_name: String,
    pub license: String,
    pub instance_id: InstanceId,
}

impl LicenseRequest {
    pub fn new(
        action: LicenseAction,
        item_name: impl Into<String>,
        license: impl Into<String>,
        instance_id: InstanceId,
    ) -> Self {
        Self {
            action,
            item_name: item_name.into(),
            license: license.into(),
            instance_id,
        }
    }

    /// Builds the full request URL against `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!(
            "{base_url}{separator}edd_action={}&item_name={}&license={}&url={}",
            self.action.as_str(),
            urlencoding::encode(&self.item_name),
            urlencoding::encode(&self.license),
            urlencoding::encode(self.instance_id.as_str()),
        )
    }
}

/// Remaining activation slots as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivationsLeft {
    Count(u64),
    /// The server sends the string `"unlimited"`.
    Unlimited(String),
}

/// License server response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseResponse {
    /// Verdict: `valid`, `invalid`, `deactivated`, `failed`, `expired`, ...
    #[serde(default)]
    pub license: String,
    /// Error code, present when the request was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Expiry date, or `lifetime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activations_left: Option<ActivationsLeft>,
}

impl LicenseResponse {
    /// Returns true if the server considers the license valid for this install.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.license == "valid"
    }

    /// Returns true if the license ran out of activation slots.
    #[must_use]
    pub fn is_no_activations_left(&self) -> bool {
        self.error.as_deref() == Some(NO_ACTIVATIONS_LEFT)
    }

    /// Returns true if a deactivation request succeeded.
    #[must_use]
    pub fn is_deactivated(&self) -> bool {
        self.license == "deactivated"
    }
}

/// Remote license server.
#[async_trait]
pub trait LicenseServer: Send + Sync {
    /// Sends one request and returns the decoded response.
    async fn send(&self, request: &LicenseRequest) -> LicenseResult<LicenseResponse>;
}

/// License server reached over HTTP.
pub struct HttpLicenseServer {
    base_url: String,
    client: Client,
}

impl HttpLicenseServer {
    /// Creates a client for the server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &ActivationConfig) -> LicenseResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LicenseError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns the server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LicenseServer for HttpLicenseServer {
    async fn send(&self, request: &LicenseRequest) -> LicenseResult<LicenseResponse> {
        let url = request.url(&self.base_url);
        debug!(
            action = %request.action,
            instance = %request.instance_id,
            "Sending license request to {}",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LicenseError::Network(format!("{} request failed: {e}", request.action)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LicenseError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LicenseError::Network(format!("failed to read response: {e}")))?;
        let parsed: LicenseResponse = serde_json::from_str(&body)
            .map_err(|e| LicenseError::InvalidResponse(format!("{e}: {body}")))?;

        debug!(
            action = %request.action,
            license = %parsed.license,
            error = parsed.error.as_deref().unwrap_or(""),
            "License server responded"
        );
        Ok(parsed)
    }
}
