//! Per-install identifiers.
//!
//! A license activation is scoped to one install. The identifier must stay
//! the same across restarts, otherwise every launch would burn an activation.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Stable identifier of one install.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the install identifier.
#[async_trait]
pub trait InstanceIdSource: Send + Sync {
    /// Returns this install's identifier.
    async fn instance_id(&self) -> LicenseResult<InstanceId>;
}

/// A fixed identifier, e.g. one handed over by the host browser.
#[derive(Debug, Clone)]
pub struct StaticInstanceId(InstanceId);

impl StaticInstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(InstanceId::new(id))
    }
}

#[async_trait]
impl InstanceIdSource for StaticInstanceId {
    async fn instance_id(&self) -> LicenseResult<InstanceId> {
        Ok(self.0.clone())
    }
}

/// Derives the identifier from hardware and OS identifiers.
///
/// Survives reinstalls on the same machine; changes if the hostname or
/// machine id changes.
#[derive(Debug, Clone, Default)]
pub struct DeviceInstanceId;

impl DeviceInstanceId {
    /// Computes the fingerprint for the current device.
    ///
    /// Blocks: reads the machine id from disk and may spawn a process.
    #[must_use]
    pub fn fingerprint() -> InstanceId {
        let combined = collect_hardware_ids().join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let hash = hasher.finalize();

        InstanceId(URL_SAFE_NO_PAD.encode(&hash[..16]))
    }
}

#[async_trait]
impl InstanceIdSource for DeviceInstanceId {
    async fn instance_id(&self) -> LicenseResult<InstanceId> {
        tokio::task::spawn_blocking(Self::fingerprint)
            .await
            .map_err(|e| LicenseError::InstanceId(format!("fingerprint task failed: {e}")))
    }
}

/// A random identifier generated once and kept in a local file.
///
/// The file must live in per-machine storage, never in the synced store,
/// or all installs would share one identifier.
#[derive(Debug, Clone)]
pub struct PersistedInstanceId {
    path: PathBuf,
}

impl PersistedInstanceId {
    /// Uses the given file to hold the identifier.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `<local data dir>/supreme-ext/instance-id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no local data directory.
    pub fn in_data_dir() -> LicenseResult<Self> {
        let dir = dirs::data_local_dir().ok_or_else(|| {
            LicenseError::InstanceId("no local data directory on this platform".to_string())
        })?;
        Ok(Self::new(dir.join("supreme-ext").join("instance-id")))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl InstanceIdSource for PersistedInstanceId {
    async fn instance_id(&self) -> LicenseResult<InstanceId> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!("Loaded instance id from {:?}", self.path);
                return Ok(InstanceId::new(content.trim()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LicenseError::InstanceId(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                LicenseError::InstanceId(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let id = InstanceId::new(uuid::Uuid::new_v4().simple().to_string());
        fs::write(&self.path, id.as_str()).await.map_err(|e| {
            LicenseError::InstanceId(format!("failed to write {}: {e}", self.path.display()))
        })?;
        info!("Generated new instance id at {:?}", self.path);
        Ok(id)
    }
}

fn collect_hardware_ids() -> Vec<String> {
    let mut ids = vec![env::consts::OS.to_string(), env::consts::ARCH.to_string()];

    ids.push(
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string()),
    );

    if let Some(machine_id) = machine_id() {
        ids.push(machine_id);
    }

    ids
}

fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
