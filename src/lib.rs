//! # beaconrs
//!
//! Background location-reporting core for the deployment-tracking mobile
//! app. The host application (Kotlin/Swift) embeds this crate and delegates
//! everything that must keep running after the UI is gone:
//!
//! - Session validation against server truth on startup
//! - A periodic sync loop posting location/battery/signal reports
//! - Backoff on transient network failure
//! - An aggressive multi-post burst when the app is removed from recents
//!
//! The host stays in charge of screens, permission flows, and secure
//! credential storage; those cross the boundary as callback interfaces.

use std::time::Instant;

// Unified error handling
pub mod error;
pub use error::BeaconError;

// Wire-facing data containers
pub mod types;
pub use types::{
    ApiResult, DeviceDescriptor, LocationSample, Session, SignalClass, SyncRequest, SyncType,
    TelemetrySnapshot,
};

// Timed HTTP POST transport
pub mod transport;
pub use transport::{HttpTransport, RawResponse};

// Remote operations (setUnit / checkStatus / updateLocation / heartbeat)
pub mod api;
pub use api::ApiClient;

// Best-effort battery/signal collection
pub mod telemetry;
pub use telemetry::{BatterySignalSource, DeviceTelemetryProvider, UnavailableSource};

// Bounded-time location acquisition
pub mod location;
pub use location::{
    AlwaysGranted, LocationProvider, LocationSource, NoLocationSource, PermissionGate,
};

// Session persistence boundary and startup validation
pub mod session;
pub use session::{SessionRepository, SessionStore, SessionValidator};

// The periodic sync loop and its burst escalation
pub mod scheduler;
pub use scheduler::{
    start_background_sync, sync_status_snapshot, SyncCommand, SyncConfig, SyncHandle,
    SyncScheduler, SyncState, SyncStatusSnapshot,
};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Helper to calculate elapsed milliseconds from an Instant
#[inline]
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("beaconrs"),
    );
}

#[cfg(all(feature = "ffi", target_os = "ios"))]
pub(crate) fn init_logging() {
    oslog::OsLogger::new("dev.fieldsystems.beaconrs")
        .level_filter(log::LevelFilter::Debug)
        .init()
        .ok();
}

#[cfg(all(feature = "ffi", not(any(target_os = "android", target_os = "ios"))))]
pub(crate) fn init_logging() {
    // No-op on desktop platforms
}
