//! Best-effort device telemetry.
//!
//! The platform source (battery manager, connectivity service) plugs in
//! behind [`BatterySignalSource`]. The provider commits to a default for
//! every reading up front, so no caller ever needs defensive error handling:
//! a snapshot is always produced.

use std::sync::Arc;

use log::debug;

use crate::error::BeaconError;
use crate::types::{DeviceDescriptor, SignalClass, TelemetrySnapshot};

/// Battery level reported when the platform source fails.
pub const DEFAULT_BATTERY_LEVEL: u8 = 100;
/// Signal class reported when the platform source fails.
pub const DEFAULT_SIGNAL_CLASS: SignalClass = SignalClass::Poor;

/// Platform battery/signal readings. Implementations may fail; the provider
/// owns the fallbacks.
pub trait BatterySignalSource: Send + Sync {
    fn battery_level(&self) -> Result<u8, BeaconError>;
    fn signal_class(&self) -> Result<SignalClass, BeaconError>;

    /// Coarse device identity, if the platform can name one.
    fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        None
    }
}

/// Source for hosts that expose no telemetry at all; every read falls back
/// to the provider defaults.
pub struct UnavailableSource;

impl BatterySignalSource for UnavailableSource {
    fn battery_level(&self) -> Result<u8, BeaconError> {
        Err(BeaconError::PermissionDenied {
            capability: "battery".to_string(),
        })
    }

    fn signal_class(&self) -> Result<SignalClass, BeaconError> {
        Err(BeaconError::PermissionDenied {
            capability: "network info".to_string(),
        })
    }
}

/// Never-failing telemetry collector.
pub struct DeviceTelemetryProvider {
    source: Arc<dyn BatterySignalSource>,
}

impl DeviceTelemetryProvider {
    pub fn new(source: Arc<dyn BatterySignalSource>) -> Self {
        Self { source }
    }

    /// Collect a fresh snapshot. Failed reads are logged and replaced by the
    /// committed defaults; out-of-range battery readings are clamped.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let battery_level = match self.source.battery_level() {
            Ok(level) => level.min(100),
            Err(err) => {
                debug!("[Telemetry] battery read failed ({err}), using default");
                DEFAULT_BATTERY_LEVEL
            }
        };
        let signal_class = match self.source.signal_class() {
            Ok(class) => class,
            Err(err) => {
                debug!("[Telemetry] signal read failed ({err}), using default");
                DEFAULT_SIGNAL_CLASS
            }
        };

        TelemetrySnapshot {
            battery_level,
            signal_class,
        }
    }

    /// Device identity for aggressive reports, falling back to compile-time
    /// platform constants.
    pub fn device_descriptor(&self) -> DeviceDescriptor {
        self.source
            .device_descriptor()
            .unwrap_or_else(DeviceDescriptor::best_effort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        battery: u8,
        signal: SignalClass,
    }

    impl BatterySignalSource for FixedSource {
        fn battery_level(&self) -> Result<u8, BeaconError> {
            Ok(self.battery)
        }

        fn signal_class(&self) -> Result<SignalClass, BeaconError> {
            Ok(self.signal)
        }
    }

    #[test]
    fn test_snapshot_uses_source_readings() {
        let provider = DeviceTelemetryProvider::new(Arc::new(FixedSource {
            battery: 63,
            signal: SignalClass::Moderate,
        }));
        let snapshot = provider.snapshot();
        assert_eq!(snapshot.battery_level, 63);
        assert_eq!(snapshot.signal_class, SignalClass::Moderate);
    }

    #[test]
    fn test_snapshot_clamps_battery() {
        let provider = DeviceTelemetryProvider::new(Arc::new(FixedSource {
            battery: 250,
            signal: SignalClass::Strong,
        }));
        assert_eq!(provider.snapshot().battery_level, 100);
    }

    #[test]
    fn test_unavailable_source_falls_back_to_defaults() {
        let provider = DeviceTelemetryProvider::new(Arc::new(UnavailableSource));
        let snapshot = provider.snapshot();
        assert_eq!(snapshot.battery_level, DEFAULT_BATTERY_LEVEL);
        assert_eq!(snapshot.signal_class, DEFAULT_SIGNAL_CLASS);
    }

    #[test]
    fn test_descriptor_falls_back_to_platform_constants() {
        let provider = DeviceTelemetryProvider::new(Arc::new(UnavailableSource));
        let descriptor = provider.device_descriptor();
        assert_eq!(descriptor.platform, std::env::consts::OS);
    }
}
