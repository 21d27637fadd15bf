//! The activation controller.
//!
//! Owns this install's [`ActivationState`], mirrors it into the sync store,
//! and talks to the license server. All collaborators are injected so the
//! controller can run against in-memory fakes.

use crate::config::ActivationConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::events::{ActivationEvent, EventBus};
use crate::instance::{InstanceId, InstanceIdSource};
use crate::keys::{self, REGISTRATION_KEY};
use crate::server::{HttpLicenseServer, LicenseAction, LicenseRequest, LicenseServer};
use crate::state::{
    ActivationOutcome, ActivationState, DeactivationOutcome, NotActivatedReason, ResetReport,
    VerifyOutcome, is_expired, is_truthy, parse_timestamp,
};
use crate::store::SyncStore;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Drives activation, deactivation and periodic re-verification.
pub struct ActivationController {
    config: ActivationConfig,
    store: Arc<dyn SyncStore>,
    server: Arc<dyn LicenseServer>,
    instances: Arc<dyn InstanceIdSource>,
    state: ActivationState,
    events: EventBus,
}

impl ActivationController {
    /// Creates a controller with empty state.
    pub fn new(
        config: ActivationConfig,
        store: Arc<dyn SyncStore>,
        server: Arc<dyn LicenseServer>,
        instances: Arc<dyn InstanceIdSource>,
    ) -> Self {
        Self {
            config,
            store,
            server,
            instances,
            state: ActivationState::default(),
            events: EventBus::new(),
        }
    }

    /// Creates a controller that reaches the license server over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_http(
        config: ActivationConfig,
        store: Arc<dyn SyncStore>,
        instances: Arc<dyn InstanceIdSource>,
    ) -> LicenseResult<Self> {
        let server = Arc::new(HttpLicenseServer::new(&config)?);
        Ok(Self::new(config, store, server, instances))
    }

    /// Whether licensed features should be enabled.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.state.is_activated
    }

    /// Gate for licensed features.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::NotActivated`] unless the install is activated.
    pub fn require_activated(&self) -> LicenseResult<()> {
        if self.state.is_activated {
            Ok(())
        } else {
            Err(LicenseError::NotActivated)
        }
    }

    /// Returns the current in-memory activation state.
    #[must_use]
    pub fn state(&self) -> &ActivationState {
        &self.state
    }

    /// Returns the configuration the controller was built with.
    #[must_use]
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Subscribes to activation events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ActivationEvent> {
        self.events.subscribe()
    }

    /// Returns the cached install identifier, asking the source on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier source fails.
    pub async fn instance_id(&mut self) -> LicenseResult<InstanceId> {
        if let Some(id) = &self.state.instance_id {
            return Ok(id.clone());
        }
        let id = self.instances.instance_id().await?;
        debug!(instance = %id, "Resolved instance id");
        self.state.instance_id = Some(id.clone());
        Ok(id)
    }

    /// Returns the cached license key, reading the store on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::NoRegistrationKey`] if no key is stored.
    pub async fn registration_key(&mut self) -> LicenseResult<String> {
        if let Some(key) = &self.state.registration_key {
            return Ok(key.clone());
        }
        let key = self
            .store
            .get(REGISTRATION_KEY)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|k| !k.is_empty())
            .ok_or(LicenseError::NoRegistrationKey)?;
        self.state.registration_key = Some(key.clone());
        Ok(key)
    }

    /// Checks whether this install is still activated.
    ///
    /// Requires the install's registration flag. When the last verification
    /// is older than the recheck interval, asks the server again and, if the
    /// license is still valid, refreshes the stored timestamp. Every failure
    /// resolves to [`VerifyOutcome::NotActivated`].
    pub async fn verify_activation(&mut self) -> VerifyOutcome {
        match self.check_activation().await {
            Ok(()) => {
                info!("Activation verified");
                self.state.is_activated = true;
                self.events.publish(ActivationEvent::Activated);
                VerifyOutcome::Activated
            }
            Err(reason) => {
                match &reason {
                    NotActivatedReason::Error(msg) => warn!("Activation check failed: {msg}"),
                    other => info!("Not activated: {other}"),
                }
                self.state.is_activated = false;
                self.events.publish(ActivationEvent::Deactivated);
                VerifyOutcome::NotActivated { reason }
            }
        }
    }

    async fn check_activation(&mut self) -> Result<(), NotActivatedReason> {
        self.verify_was_activated().await?;
        self.verify_not_expired().await?;
        self.registration_key().await?;
        Ok(())
    }

    async fn verify_was_activated(&mut self) -> Result<(), NotActivatedReason> {
        if self.state.is_registered {
            debug!("Registration flag cached");
            return Ok(());
        }

        let instance = self.instance_id().await?;
        let flag = self.store.get(&keys::registration_flag(&instance)).await?;
        if !flag.as_ref().is_some_and(is_truthy) {
            return Err(NotActivatedReason::NeverActivated);
        }

        debug!("Registration flag loaded from store");
        self.state.is_registered = true;
        Ok(())
    }

    async fn verify_not_expired(&mut self) -> Result<(), NotActivatedReason> {
        let last_checked = match self.state.last_checked_at {
            Some(ts) => ts,
            None => {
                let instance = self.instance_id().await?;
                let stored = self
                    .store
                    .get(&keys::registration_timestamp(&instance))
                    .await?;
                let ts = stored
                    .as_ref()
                    .and_then(parse_timestamp)
                    .ok_or(NotActivatedReason::NoTimestamp)?;
                self.state.last_checked_at = Some(ts);
                ts
            }
        };

        let now = Utc::now();
        if !is_expired(last_checked, now, self.config.recheck_interval()) {
            debug!(last_checked = %last_checked, "Verification still fresh");
            return Ok(());
        }

        info!(last_checked = %last_checked, "Verification expired, rechecking license");
        let license = self.registration_key().await?;
        let instance = self.instance_id().await?;
        let response = self
            .server
            .send(&self.request(LicenseAction::CheckLicense, &license, instance.clone()))
            .await?;

        if !response.is_valid() {
            return Err(NotActivatedReason::LicenseInvalid(response.license));
        }

        let mut items = Map::new();
        items.insert(
            keys::registration_timestamp(&instance),
            Value::from(now.timestamp_millis()),
        );
        self.store.set(items).await?;
        self.state.last_checked_at = Some(now);
        Ok(())
    }

    /// Activates this install with `license`.
    ///
    /// Publishes [`ActivationEvent::BeginActivationRequest`] before and
    /// [`ActivationEvent::EndActivationRequest`] after the request, even
    /// when it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or the store fails.
    /// A refused license is an `Ok` outcome, not an error.
    pub async fn request_activation(&mut self, license: &str) -> LicenseResult<ActivationOutcome> {
        info!("Activation requested");
        self.events.publish(ActivationEvent::BeginActivationRequest);
        let result = self.send_activation(license.trim()).await;
        self.events.publish(ActivationEvent::EndActivationRequest);
        result
    }

    async fn send_activation(&mut self, license: &str) -> LicenseResult<ActivationOutcome> {
        if license.is_empty() {
            return Ok(self.invalid_license("empty license key".to_string()));
        }

        let instance = self.instance_id().await?;
        let response = self
            .server
            .send(&self.request(LicenseAction::ActivateLicense, license, instance))
            .await?;

        if response.is_no_activations_left() {
            info!("License has no activations left");
            self.events.publish(ActivationEvent::NoActivationsLeft);
            return Ok(ActivationOutcome::NoActivationsLeft);
        }

        if let Some(error) = response.error {
            return Ok(self.invalid_license(error));
        }

        if response.is_valid() {
            self.activate(license).await?;
            return Ok(ActivationOutcome::Activated);
        }

        Ok(self.invalid_license(response.license))
    }

    fn invalid_license(&self, reason: String) -> ActivationOutcome {
        info!("License refused: {reason}");
        self.events.publish(ActivationEvent::InvalidLicense {
            reason: reason.clone(),
        });
        ActivationOutcome::InvalidLicense { reason }
    }

    async fn activate(&mut self, license: &str) -> LicenseResult<()> {
        let instance = self.instance_id().await?;
        let now = Utc::now();

        let mut items = Map::new();
        items.insert(
            keys::registration_timestamp(&instance),
            Value::from(now.timestamp_millis()),
        );
        items.insert(REGISTRATION_KEY.to_string(), Value::from(license));
        items.insert(keys::registration_flag(&instance), Value::Bool(true));
        self.store.set(items).await?;

        self.state.is_activated = true;
        self.state.is_registered = true;
        self.state.registration_key = Some(license.to_string());
        self.state.last_checked_at = Some(now);

        info!(instance = %instance, "Install activated");
        self.events.publish(ActivationEvent::Activated);
        Ok(())
    }

    /// Releases this install's activation after `confirm` agrees.
    ///
    /// Local state is cleared even if the server does not acknowledge the
    /// deactivation; the outcome reports whether it did.
    ///
    /// # Errors
    ///
    /// Returns an error if no license is stored, the server cannot be
    /// reached, or the store fails.
    pub async fn request_deactivation<F, Fut>(
        &mut self,
        confirm: F,
    ) -> LicenseResult<DeactivationOutcome>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        self.events.publish(ActivationEvent::DeactivationRequested);
        if !confirm().await {
            info!("Deactivation cancelled");
            return Ok(DeactivationOutcome::Cancelled);
        }

        let instance = self.instance_id().await?;
        let license = self.registration_key().await?;
        let response = self
            .server
            .send(&self.request(LicenseAction::DeactivateLicense, &license, instance))
            .await?;

        let server_confirmed = response.is_deactivated();
        if !server_confirmed {
            warn!(
                "License server did not confirm deactivation: {}",
                response.error.as_deref().unwrap_or(response.license.as_str())
            );
        }

        self.deactivate().await?;
        Ok(DeactivationOutcome::Deactivated { server_confirmed })
    }

    async fn deactivate(&mut self) -> LicenseResult<()> {
        let instance = self.instance_id().await?;
        let flag_key = keys::registration_flag(&instance);

        let others_registered = self
            .store
            .get_all()
            .await?
            .iter()
            .filter(|(_, v)| is_truthy(v))
            .filter_map(|(k, _)| keys::instance_from_flag(k))
            .any(|id| id != instance);

        let mut removals = vec![keys::registration_timestamp(&instance), flag_key];
        if !others_registered {
            removals.push(REGISTRATION_KEY.to_string());
        }
        self.store.remove(&removals).await?;

        self.state.clear();
        info!(instance = %instance, "Install deactivated");
        self.events.publish(ActivationEvent::Deactivated);
        Ok(())
    }

    /// Releases every install registered in the sync store under `license`.
    ///
    /// Deactivation requests are sent concurrently. Stored registrations of
    /// released installs are removed; this install is fully deactivated if
    /// it was among them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written. Per-install
    /// server failures are reported in [`ResetReport::failed`].
    pub async fn reset_activations(&mut self, license: &str) -> LicenseResult<ResetReport> {
        let current = self.instance_id().await?;
        let instances: Vec<InstanceId> = self
            .store
            .get_all()
            .await?
            .keys()
            .filter_map(|k| keys::instance_from_flag(k))
            .collect();
        info!(count = instances.len(), "Resetting activations");

        let requests: Vec<LicenseRequest> = instances
            .iter()
            .map(|id| self.request(LicenseAction::DeactivateLicense, license, id.clone()))
            .collect();
        let server = Arc::clone(&self.server);
        let responses = join_all(requests.iter().map(|r| server.send(r))).await;

        let mut report = ResetReport::default();
        let mut stale = Vec::new();
        for (instance, response) in instances.into_iter().zip(responses) {
            match response {
                Ok(r) if r.is_deactivated() => {
                    if instance != current {
                        stale.push(keys::registration_flag(&instance));
                        stale.push(keys::registration_timestamp(&instance));
                    }
                    report.deactivated.push(instance);
                }
                Ok(r) => {
                    let reason = r.error.unwrap_or(r.license);
                    warn!(instance = %instance, "Reset refused: {reason}");
                    report.failed.push((instance, reason));
                }
                Err(e) => {
                    warn!(instance = %instance, "Reset failed: {e}");
                    report.failed.push((instance, e.to_string()));
                }
            }
        }

        if !stale.is_empty() {
            self.store.remove(&stale).await?;
        }
        if report.deactivated.contains(&current) {
            self.deactivate().await?;
        }

        Ok(report)
    }

    fn request(&self, action: LicenseAction, license: &str, instance: InstanceId) -> LicenseRequest {
        LicenseRequest::new(action, &self.config.item_name, license, instance)
    }
}
