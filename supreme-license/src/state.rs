//! Activation state and operation outcomes.

use crate::error::LicenseError;
use crate::instance::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// In-memory activation state of this install.
///
/// `is_activated` implies `registration_key` is set and the install's
/// registration flag is present in the sync store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationState {
    /// Whether the install may use licensed features.
    pub is_activated: bool,
    /// The license key this install was activated with.
    pub registration_key: Option<String>,
    /// Cached install identifier.
    pub instance_id: Option<InstanceId>,
    /// Last successful verification with the server.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Whether the registration flag was already seen in the store.
    pub is_registered: bool,
}

impl ActivationState {
    /// Forgets everything but the install identifier.
    pub(crate) fn clear(&mut self) {
        self.is_activated = false;
        self.registration_key = None;
        self.last_checked_at = None;
        self.is_registered = false;
    }
}

/// Returns true if a verification made at `last_checked` is older than `interval` at `now`.
///
/// A timestamp in the future never counts as expired.
#[must_use]
pub fn is_expired(last_checked: DateTime<Utc>, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
    now.signed_duration_since(last_checked) > interval
}

/// Why verification concluded the install is not activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NotActivatedReason {
    /// No registration flag for this install.
    NeverActivated,
    /// The flag exists but no verification timestamp does.
    NoTimestamp,
    /// The install is registered but no license key is stored.
    NoRegistrationKey,
    /// The server no longer accepts the license.
    LicenseInvalid(String),
    /// Storage, network or identity failure.
    Error(String),
}

impl fmt::Display for NotActivatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverActivated => f.write_str("install was never activated"),
            Self::NoTimestamp => f.write_str("no verification timestamp stored"),
            Self::NoRegistrationKey => f.write_str("no registration key stored"),
            Self::LicenseInvalid(status) => write!(f, "license server reported '{status}'"),
            Self::Error(msg) => f.write_str(msg),
        }
    }
}

impl From<LicenseError> for NotActivatedReason {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::NoRegistrationKey => Self::NoRegistrationKey,
            other => Self::Error(other.to_string()),
        }
    }
}

/// Result of [`verify_activation`](crate::ActivationController::verify_activation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyOutcome {
    Activated,
    NotActivated { reason: NotActivatedReason },
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Result of [`request_activation`](crate::ActivationController::request_activation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationOutcome {
    /// The license is valid and this install is now activated.
    Activated,
    /// Every activation slot of the license is taken.
    NoActivationsLeft,
    /// The server refused the license.
    InvalidLicense { reason: String },
}

/// Result of [`request_deactivation`](crate::ActivationController::request_deactivation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeactivationOutcome {
    /// Local state was cleared. `server_confirmed` is false if the server
    /// did not acknowledge releasing the slot.
    Deactivated { server_confirmed: bool },
    /// The confirmation step declined.
    Cancelled,
}

/// Result of [`reset_activations`](crate::ActivationController::reset_activations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    /// Installs the server released.
    pub deactivated: Vec<InstanceId>,
    /// Installs that could not be released, with the reason.
    pub failed: Vec<(InstanceId, String)>,
}

impl ResetReport {
    /// Total number of installs a deactivation was attempted for.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.deactivated.len() + self.failed.len()
    }
}

/// JavaScript-style truthiness of a stored value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decodes a stored millisecond timestamp.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if !is_truthy(value) {
        return None;
    }
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}
