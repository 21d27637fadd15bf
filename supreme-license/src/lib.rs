//! License activation client for Supreme Ext.
//!
//! This crate handles:
//! - Activating and deactivating a license for one install
//! - Caching the activation in a synced key-value store
//! - Re-verifying the license with the server once the cached
//!   verification is older than the recheck interval (12 hours by default)
//! - Releasing every known install of a license in bulk
//!
//! # Collaborators
//!
//! The [`ActivationController`] owns no I/O of its own. It is handed a
//! [`SyncStore`], a [`LicenseServer`] and an [`InstanceIdSource`] at
//! construction, and reports progress through [`ActivationEvent`]s and typed
//! outcomes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use supreme_license::{ActivationConfig, ActivationController, MemoryStore, StaticInstanceId};
//!
//! let controller = ActivationController::with_http(
//!     ActivationConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(StaticInstanceId::new("install-1")),
//! )
//! .unwrap();
//! assert!(!controller.is_activated());
//! ```

mod config;
mod controller;
mod error;
mod events;
mod instance;
pub mod keys;
mod server;
mod state;
mod store;

pub use config::{
    ActivationConfig, DEFAULT_ITEM_NAME, DEFAULT_RECHECK_INTERVAL_SECS, DEFAULT_SERVER_URL,
};
pub use controller::ActivationController;
pub use error::{LicenseError, LicenseResult};
pub use events::{ActivationEvent, EVENT_CHANNEL_CAPACITY, EventBus};
pub use instance::{
    DeviceInstanceId, InstanceId, InstanceIdSource, PersistedInstanceId, StaticInstanceId,
};
pub use server::{
    ActivationsLeft, HttpLicenseServer, LicenseAction, LicenseRequest, LicenseResponse,
    LicenseServer, NO_ACTIVATIONS_LEFT,
};
pub use state::{
    ActivationOutcome, ActivationState, DeactivationOutcome, NotActivatedReason, ResetReport,
    VerifyOutcome, is_expired,
};
pub use store::{FileStore, MemoryStore, SyncStore};
