//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module exposes the sync core to Kotlin and Swift through UniFFI. The
//! host supplies its platform services as callback interfaces (secure
//! storage, geolocation, telemetry, permission state); the core supplies the
//! loop. All exported functions are prefixed with `ffi_` to avoid naming
//! conflicts with the internal API.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use once_cell::sync::Lazy;

use crate::api::ApiClient;
use crate::error::BeaconError;
use crate::init_logging;
use crate::location::{LocationProvider, LocationSource, PermissionGate};
use crate::scheduler::{
    start_background_sync, sync_status_snapshot, SyncConfig, SyncHandle, SyncScheduler,
};
use crate::session::{SessionRepository, SessionStore, SessionValidator};
use crate::telemetry::{BatterySignalSource, DeviceTelemetryProvider};
use crate::types::{
    now_iso8601, DeviceDescriptor, LocationSample, Session, SignalClass,
};

/// Global handle to the running sync loop - armed by `ffi_start_sync`,
/// consumed by the signal/stop entry points.
static SYNC_ENGINE: Lazy<Mutex<Option<SyncHandle>>> = Lazy::new(|| Mutex::new(None));

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Host-side secure key-value storage (Keychain / EncryptedSharedPreferences).
#[uniffi::export(callback_interface)]
pub trait SessionStoreCallback: Send + Sync {
    fn get(&self, key: String) -> Option<String>;
    fn set(&self, key: String, value: String);
    fn remove(&self, key: String);
}

/// Host-side geolocation. `request_fix` may block while the platform settles
/// on a fix; the core bounds the wait, so implementations should give up
/// sooner on their own.
#[uniffi::export(callback_interface)]
pub trait LocationCallback: Send + Sync {
    fn request_fix(&self) -> Option<FfiLocationFix>;
}

/// Host-side battery/signal readings. Return None for anything unavailable;
/// the core falls back to its committed defaults.
#[uniffi::export(callback_interface)]
pub trait TelemetryCallback: Send + Sync {
    fn battery_level(&self) -> Option<u8>;
    fn signal_class(&self) -> Option<FfiSignalClass>;
    fn device_model(&self) -> Option<String>;
}

/// Host-side permission state.
#[uniffi::export(callback_interface)]
pub trait PermissionGateCallback: Send + Sync {
    fn has_all_critical_permissions(&self) -> bool;
}

// ============================================================================
// Records
// ============================================================================

/// One platform fix. Capture time is stamped core-side on receipt.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiSignalClass {
    Strong,
    Moderate,
    Weak,
    Poor,
}

impl From<FfiSignalClass> for SignalClass {
    fn from(value: FfiSignalClass) -> Self {
        match value {
            FfiSignalClass::Strong => SignalClass::Strong,
            FfiSignalClass::Moderate => SignalClass::Moderate,
            FfiSignalClass::Weak => SignalClass::Weak,
            FfiSignalClass::Poor => SignalClass::Poor,
        }
    }
}

/// Outcome of a remote operation, flattened for the host.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiApiOutcome {
    pub success: bool,
    pub message: String,
}

/// Snapshot of the sync loop for host-side display/diagnostics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncStatus {
    pub state: String,
    pub ticks_completed: u32,
    pub posts_succeeded: u32,
    pub posts_failed: u32,
    pub bursts_fired: u32,
    pub last_post_ok: bool,
}

// ============================================================================
// Callback Adapters
// ============================================================================

struct CallbackSessionStore(Box<dyn SessionStoreCallback>);

impl SessionStore for CallbackSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key.to_string())
    }

    fn set(&self, key: &str, value: &str) {
        self.0.set(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.0.remove(key.to_string());
    }
}

struct CallbackLocationSource(Box<dyn LocationCallback>);

impl LocationSource for CallbackLocationSource {
    fn request_fix(&self) -> Option<LocationSample> {
        self.0.request_fix().map(|fix| LocationSample {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            altitude: fix.altitude,
            speed: fix.speed,
            heading: fix.heading,
            captured_at: now_iso8601(),
        })
    }
}

struct CallbackTelemetrySource(Box<dyn TelemetryCallback>);

impl BatterySignalSource for CallbackTelemetrySource {
    fn battery_level(&self) -> Result<u8, BeaconError> {
        self.0.battery_level().ok_or(BeaconError::PermissionDenied {
            capability: "battery".to_string(),
        })
    }

    fn signal_class(&self) -> Result<SignalClass, BeaconError> {
        self.0
            .signal_class()
            .map(SignalClass::from)
            .ok_or(BeaconError::PermissionDenied {
                capability: "network info".to_string(),
            })
    }

    fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        self.0.device_model().map(|model| DeviceDescriptor {
            model,
            ..DeviceDescriptor::best_effort()
        })
    }
}

struct CallbackPermissionGate(Box<dyn PermissionGateCallback>);

impl PermissionGate for CallbackPermissionGate {
    fn has_all_critical_permissions(&self) -> bool {
        self.0.has_all_critical_permissions()
    }
}

// ============================================================================
// Exported Functions
// ============================================================================

fn blocking_runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            warn!("[FFI] failed to create runtime: {e}");
            None
        }
    }
}

fn build_client(base_url: &str, device: DeviceDescriptor) -> Option<Arc<ApiClient>> {
    match ApiClient::new(base_url, device) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("[FFI] failed to create API client: {e}");
            None
        }
    }
}

/// Bind this device to a deployment and persist the resulting session.
#[uniffi::export]
pub fn ffi_login(
    base_url: String,
    token: String,
    deployment_code: String,
    store: Box<dyn SessionStoreCallback>,
) -> FfiApiOutcome {
    init_logging();
    let Some(rt) = blocking_runtime() else {
        return FfiApiOutcome {
            success: false,
            message: "internal runtime error".to_string(),
        };
    };
    let Some(api) = build_client(&base_url, DeviceDescriptor::best_effort()) else {
        return FfiApiOutcome {
            success: false,
            message: "internal client error".to_string(),
        };
    };

    let result = rt.block_on(api.login(&token, &deployment_code));
    if result.success {
        let repository = SessionRepository::new(Arc::new(CallbackSessionStore(store)));
        repository.save(&Session {
            token,
            deployment_code,
            lock_flag: true,
        });
    }

    FfiApiOutcome {
        success: result.success,
        message: result.message,
    }
}

/// Release this device from its deployment: post the logout, stop the sync
/// loop, clear the cached session. Clearing happens regardless of whether
/// the server acknowledged the logout.
#[uniffi::export]
pub fn ffi_logout(base_url: String, store: Box<dyn SessionStoreCallback>) -> FfiApiOutcome {
    init_logging();
    ffi_stop_sync();

    let repository = SessionRepository::new(Arc::new(CallbackSessionStore(store)));
    let Some(session) = repository.load() else {
        return FfiApiOutcome {
            success: true,
            message: "No session".to_string(),
        };
    };

    let result = match (
        blocking_runtime(),
        build_client(&base_url, DeviceDescriptor::best_effort()),
    ) {
        (Some(rt), Some(api)) => {
            rt.block_on(api.logout(&session.token, &session.deployment_code))
        }
        _ => crate::types::ApiResult::failure("internal runtime error"),
    };

    repository.clear();
    FfiApiOutcome {
        success: result.success,
        message: result.message,
    }
}

/// Reconcile the cached session against server truth. Returns true when the
/// server confirms it; on false the cached session is cleared and the host
/// should route to re-authentication.
#[uniffi::export]
pub fn ffi_validate_session(base_url: String, store: Box<dyn SessionStoreCallback>) -> bool {
    init_logging();
    let repository = SessionRepository::new(Arc::new(CallbackSessionStore(store)));
    let Some(session) = repository.load() else {
        info!("[FFI] no cached session to validate");
        return false;
    };

    let valid = match (
        blocking_runtime(),
        build_client(&base_url, DeviceDescriptor::best_effort()),
    ) {
        (Some(rt), Some(api)) => {
            let validator = SessionValidator::new(api);
            rt.block_on(validator.validate(&session.token, &session.deployment_code))
        }
        _ => false,
    };

    if !valid {
        repository.clear();
    }
    valid
}

/// Arm the background sync loop with the cached session and the host's
/// platform callbacks. Returns false when no valid session is cached.
/// Re-arming replaces a previously running loop.
#[uniffi::export]
pub fn ffi_start_sync(
    base_url: String,
    sync_interval_seconds: Option<u32>,
    store: Box<dyn SessionStoreCallback>,
    location: Box<dyn LocationCallback>,
    telemetry: Box<dyn TelemetryCallback>,
    permissions: Box<dyn PermissionGateCallback>,
) -> bool {
    init_logging();
    let repository = SessionRepository::new(Arc::new(CallbackSessionStore(store)));
    let Some(session) = repository.load() else {
        warn!("[FFI] start_sync without a cached session");
        return false;
    };

    let telemetry_provider =
        DeviceTelemetryProvider::new(Arc::new(CallbackTelemetrySource(telemetry)));
    let Some(api) = build_client(&base_url, telemetry_provider.device_descriptor()) else {
        return false;
    };
    let location_provider = LocationProvider::new(
        Arc::new(CallbackLocationSource(location)),
        Arc::new(CallbackPermissionGate(permissions)),
    );

    let mut config = SyncConfig::default();
    if let Some(seconds) = sync_interval_seconds {
        config.sync_interval = std::time::Duration::from_secs(u64::from(seconds.max(1)));
    }

    let scheduler = SyncScheduler::new(api, location_provider, telemetry_provider, session, config);
    let handle = start_background_sync(scheduler);

    if let Ok(mut engine) = SYNC_ENGINE.lock() {
        if let Some(previous) = engine.replace(handle) {
            previous.stop();
        }
        true
    } else {
        false
    }
}

/// Forward the platform "task removed" signal to the running loop. No-op
/// when the loop is not armed.
#[uniffi::export]
pub fn ffi_notify_task_removed() {
    init_logging();
    if let Ok(engine) = SYNC_ENGINE.lock() {
        match engine.as_ref() {
            Some(handle) => handle.notify_task_removed(),
            None => warn!("[FFI] task-removed signal with no armed loop"),
        }
    }
}

/// Stop the running sync loop, if any.
#[uniffi::export]
pub fn ffi_stop_sync() {
    if let Ok(mut engine) = SYNC_ENGINE.lock() {
        if let Some(handle) = engine.take() {
            handle.stop();
            info!("[FFI] sync loop stopped");
        }
    }
}

/// Poll the sync loop status.
#[uniffi::export]
pub fn ffi_sync_status() -> FfiSyncStatus {
    let snapshot = sync_status_snapshot();
    FfiSyncStatus {
        state: snapshot.state.as_str().to_string(),
        ticks_completed: snapshot.ticks_completed,
        posts_succeeded: snapshot.posts_succeeded,
        posts_failed: snapshot.posts_failed,
        bursts_fired: snapshot.bursts_fired,
        last_post_ok: snapshot.last_post_ok,
    }
}
