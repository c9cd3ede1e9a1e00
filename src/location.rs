//! Bounded-time location acquisition.
//!
//! The platform geolocation capability sits behind [`LocationSource`], whose
//! `request_fix` may block while the radio settles. [`LocationProvider`] puts
//! an explicit time bound around every attempt: deadline expiry and platform
//! failure both read as "no fix this tick", never as an error. The permission
//! gate is consulted first, so a revoked permission costs nothing.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::types::LocationSample;

/// Capability check consumed from the host's permission flow.
pub trait PermissionGate: Send + Sync {
    fn has_all_critical_permissions(&self) -> bool;
}

/// Gate for hosts that handle permissions before arming the sync loop.
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn has_all_critical_permissions(&self) -> bool {
        true
    }
}

/// Platform geolocation source. `request_fix` may block up to the caller's
/// time bound; returning `None` means no usable fix.
pub trait LocationSource: Send + Sync {
    fn request_fix(&self) -> Option<LocationSample>;
}

/// Source for headless hosts; never produces a fix, so every report
/// degrades to a heartbeat.
pub struct NoLocationSource;

impl LocationSource for NoLocationSource {
    fn request_fix(&self) -> Option<LocationSample> {
        None
    }
}

/// Bounded-time wrapper over a platform location source.
pub struct LocationProvider {
    source: Arc<dyn LocationSource>,
    gate: Arc<dyn PermissionGate>,
}

impl LocationProvider {
    pub fn new(source: Arc<dyn LocationSource>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { source, gate }
    }

    /// Best-effort fix bounded by `limit`. The blocking platform call runs
    /// off the sync worker; if the bound expires first the call is abandoned
    /// (not cancelled) and the tick proceeds without a sample.
    pub async fn acquire_fix(&self, limit: Duration) -> Option<LocationSample> {
        if !self.gate.has_all_critical_permissions() {
            debug!("[Location] critical permissions missing, skipping fix");
            return None;
        }

        let source = Arc::clone(&self.source);
        let attempt = tokio::task::spawn_blocking(move || source.request_fix());

        match tokio::time::timeout(limit, attempt).await {
            Ok(Ok(fix)) => {
                if fix.is_none() {
                    debug!("[Location] source reported no fix");
                }
                fix
            }
            Ok(Err(join_err)) => {
                warn!("[Location] fix task failed: {join_err}");
                None
            }
            Err(_) => {
                debug!("[Location] no fix within {limit:?}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DeniedGate;

    impl PermissionGate for DeniedGate {
        fn has_all_critical_permissions(&self) -> bool {
            false
        }
    }

    struct TrackingSource {
        called: Arc<AtomicBool>,
    }

    impl LocationSource for TrackingSource {
        fn request_fix(&self) -> Option<LocationSample> {
            self.called.store(true, Ordering::Relaxed);
            Some(LocationSample {
                latitude: 1.0,
                longitude: 2.0,
                accuracy: 5.0,
                altitude: 0.0,
                speed: 0.0,
                heading: 0.0,
                captured_at: "2026-03-01T09:00:00.000Z".to_string(),
            })
        }
    }

    struct SlowSource;

    impl LocationSource for SlowSource {
        fn request_fix(&self) -> Option<LocationSample> {
            std::thread::sleep(Duration::from_millis(400));
            None
        }
    }

    #[tokio::test]
    async fn test_denied_gate_skips_source() {
        let called = Arc::new(AtomicBool::new(false));
        let provider = LocationProvider::new(
            Arc::new(TrackingSource {
                called: Arc::clone(&called),
            }),
            Arc::new(DeniedGate),
        );

        let fix = provider.acquire_fix(Duration::from_secs(1)).await;
        assert!(fix.is_none());
        assert!(!called.load(Ordering::Relaxed), "source must not be polled");
    }

    #[tokio::test]
    async fn test_fix_returned_within_bound() {
        let called = Arc::new(AtomicBool::new(false));
        let provider = LocationProvider::new(
            Arc::new(TrackingSource {
                called: Arc::clone(&called),
            }),
            Arc::new(AlwaysGranted),
        );

        let fix = provider.acquire_fix(Duration::from_secs(1)).await;
        assert_eq!(fix.unwrap().latitude, 1.0);
    }

    #[tokio::test]
    async fn test_expiry_is_no_fix() {
        let provider = LocationProvider::new(Arc::new(SlowSource), Arc::new(AlwaysGranted));
        let fix = provider.acquire_fix(Duration::from_millis(50)).await;
        assert!(fix.is_none());
    }

    #[tokio::test]
    async fn test_no_location_source() {
        let provider = LocationProvider::new(Arc::new(NoLocationSource), Arc::new(AlwaysGranted));
        let fix = provider.acquire_fix(Duration::from_millis(100)).await;
        assert!(fix.is_none());
    }
}
