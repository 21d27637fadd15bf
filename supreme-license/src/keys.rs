//! Sync-store key names.
//!
//! Registration state is stored per install so that several installs sharing
//! one synced store do not clobber each other:
//!
//! - `registration#<instance>` holds `true` once the install was activated
//! - `registration#<instance>#timestamp` holds the last verification time (ms since epoch)
//! - `registrationKey` holds the license key, shared by all installs

use crate::instance::InstanceId;

/// Key holding the license key.
pub const REGISTRATION_KEY: &str = "registrationKey";

/// Prefix of per-install registration flags.
pub const REGISTRATION_PREFIX: &str = "registration#";

const TIMESTAMP_SUFFIX: &str = "#timestamp";

/// Key of the registration flag for an install.
#[must_use]
pub fn registration_flag(instance: &InstanceId) -> String {
    format!("{REGISTRATION_PREFIX}{}", instance.as_str())
}

/// Key of the last-verified timestamp for an install.
#[must_use]
pub fn registration_timestamp(instance: &InstanceId) -> String {
    format!("{}{TIMESTAMP_SUFFIX}", registration_flag(instance))
}

/// Extracts the install identifier from a registration flag key.
///
/// Returns `None` for unrelated keys and for timestamp keys.
#[must_use]
pub fn instance_from_flag(key: &str) -> Option<InstanceId> {
    let id = key.strip_prefix(REGISTRATION_PREFIX)?;
    if id.is_empty() || id.ends_with(TIMESTAMP_SUFFIX) {
        return None;
    }
    Some(InstanceId::new(id))
}
