//! Shared test helpers for activation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use supreme_license::{
    ActivationConfig, ActivationController, InstanceId, LicenseAction, LicenseError,
    LicenseRequest, LicenseResponse, LicenseResult, LicenseServer, MemoryStore, StaticInstanceId,
    SyncStore, keys,
};

pub const INSTANCE: &str = "install-1";
pub const LICENSE: &str = "9f1c2a-LICENSE";

type Responder = dyn Fn(&LicenseRequest) -> LicenseResult<LicenseResponse> + Send + Sync;

/// License server fake that records every request.
pub struct ScriptedServer {
    responder: Box<Responder>,
    calls: Mutex<Vec<LicenseRequest>>,
}

impl ScriptedServer {
    pub fn new(
        responder: impl Fn(&LicenseRequest) -> LicenseResult<LicenseResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with the same verdict.
    pub fn answering(license: &str) -> Arc<Self> {
        let license = license.to_string();
        Self::new(move |_| Ok(response(&license, None)))
    }

    /// Answers activations with `valid`, deactivations with `deactivated` and checks with `check`.
    pub fn edd(check: &str) -> Arc<Self> {
        let check = check.to_string();
        Self::new(move |req| {
            Ok(match req.action {
                LicenseAction::ActivateLicense => response("valid", None),
                LicenseAction::DeactivateLicense => response("deactivated", None),
                LicenseAction::CheckLicense => response(&check, None),
            })
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| Err(LicenseError::Network("connection refused".into())))
    }

    pub fn calls(&self) -> Vec<LicenseRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, action: LicenseAction) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }
}

#[async_trait]
impl LicenseServer for ScriptedServer {
    async fn send(&self, request: &LicenseRequest) -> LicenseResult<LicenseResponse> {
        self.calls.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

pub fn response(license: &str, error: Option<&str>) -> LicenseResponse {
    LicenseResponse {
        license: license.to_string(),
        error: error.map(str::to_string),
        ..Default::default()
    }
}

pub fn instance() -> InstanceId {
    InstanceId::new(INSTANCE)
}

pub fn controller(store: &MemoryStore, server: &Arc<ScriptedServer>) -> ActivationController {
    controller_for(INSTANCE, store, server)
}

pub fn controller_for(
    instance: &str,
    store: &MemoryStore,
    server: &Arc<ScriptedServer>,
) -> ActivationController {
    ActivationController::new(
        ActivationConfig::default(),
        Arc::new(store.clone()),
        server.clone(),
        Arc::new(StaticInstanceId::new(instance)),
    )
}

/// Writes the keys an earlier activation of `instance` would have left, verified `age` ago.
pub async fn seed_activation(store: &MemoryStore, instance: &str, age: chrono::Duration) {
    let id = InstanceId::new(instance);
    let checked = chrono::Utc::now() - age;
    let mut map = serde_json::Map::new();
    map.insert(keys::registration_flag(&id), json!(true));
    map.insert(
        keys::registration_timestamp(&id),
        json!(checked.timestamp_millis()),
    );
    map.insert(keys::REGISTRATION_KEY.to_string(), json!(LICENSE));
    store.set(map).await.unwrap();
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
