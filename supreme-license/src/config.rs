//! Activation client configuration.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default license server endpoint.
pub const DEFAULT_SERVER_URL: &str = "http://secure-cop.com";

/// Product name registered with the license server.
pub const DEFAULT_ITEM_NAME: &str = "Supreme Ext";

/// How often to recheck the registration with the server (12 hours).
/// Lower means higher server load.
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 12 * 60 * 60;

/// Configuration for the activation controller and HTTP license server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Base URL of the license server.
    pub server_url: String,
    /// Item name sent with every license request.
    pub item_name: String,
    /// Seconds a successful verification stays fresh.
    pub recheck_interval_secs: u64,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            item_name: DEFAULT_ITEM_NAME.to_string(),
            recheck_interval_secs: DEFAULT_RECHECK_INTERVAL_SECS,
            request_timeout_secs: 30,
        }
    }
}

impl ActivationConfig {
    /// Returns the recheck interval as a chrono duration.
    #[must_use]
    pub fn recheck_interval(&self) -> chrono::Duration {
        i64::try_from(self.recheck_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Returns the HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks that the configuration can be used to build requests.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if the server URL or item name is empty.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(LicenseError::Config("server_url must not be empty".to_string()));
        }
        if self.item_name.trim().is_empty() {
            return Err(LicenseError::Config("item_name must not be empty".to_string()));
        }
        Ok(())
    }
}
