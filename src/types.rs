//! Wire-facing data containers for the sync core.
//!
//! These types are transient: a `LocationSample` lives for one tick, a
//! `TelemetrySnapshot` is recomputed for every send, and a `SyncRequest` is
//! built per network call and discarded. Only `Session` has a longer life,
//! and it is owned by the host's session store.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current wall-clock time as an ISO 8601 / RFC 3339 string, the format every
/// request body carries in its `timestamp` field.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Session
// ============================================================================

/// Credential pair scoping this device to a deployment.
///
/// Token and deployment code are both present or both absent; the
/// `SessionRepository` enforces that invariant when loading from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub deployment_code: String,
    /// True while the device is administratively locked to its deployment.
    pub lock_flag: bool,
}

// ============================================================================
// Samples and Telemetry
// ============================================================================

/// One GPS fix captured for a single report. Immutable, discarded after
/// posting; samples are never cached or journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Speed in m/s
    pub speed: f64,
    /// Heading in degrees from true north
    pub heading: f64,
    /// ISO 8601 capture time
    pub captured_at: String,
}

/// Coarse network-signal bucket reported with every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalClass {
    Strong,
    Moderate,
    Weak,
    Poor,
}

/// Battery and signal state. Recomputed for every send, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Battery percentage, 0-100
    pub battery_level: u8,
    pub signal_class: SignalClass,
}

/// Sync escalation level. Aggressive is only used on the app-removal path and
/// travels in the `X-Sync-Type` request header, not the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    Normal,
    Aggressive,
}

impl SyncType {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            SyncType::Normal => "normal",
            SyncType::Aggressive => "aggressive",
        }
    }
}

/// Coarse device identity attached to aggressive posts. Best effort: fields
/// fall back to compile-time platform constants when the host provides
/// nothing better.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub platform: String,
    pub os_version: String,
    pub model: String,
}

impl DeviceDescriptor {
    pub fn best_effort() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            model: std::env::consts::ARCH.to_string(),
        }
    }
}

// ============================================================================
// Requests and Results
// ============================================================================

/// One outbound report: credentials scope + optional fix + telemetry, plus
/// the device descriptor on the aggressive path. Built per call, then dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub deployment_code: String,
    /// ISO 8601 send time
    pub timestamp: String,
    /// Liveness marker; a report without a location is still an "online" signal
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSample>,
    pub battery_level: u8,
    pub signal_class: SignalClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceDescriptor>,
    /// Travels as the `X-Sync-Type` header rather than a body field.
    #[serde(skip)]
    pub sync_type: SyncType,
}

impl SyncRequest {
    pub fn new(
        session: &Session,
        location: Option<LocationSample>,
        telemetry: TelemetrySnapshot,
        sync_type: SyncType,
        device: Option<DeviceDescriptor>,
    ) -> Self {
        Self {
            deployment_code: session.deployment_code.clone(),
            timestamp: now_iso8601(),
            status: "online".to_string(),
            location,
            battery_level: telemetry.battery_level,
            signal_class: telemetry.signal_class,
            device,
            sync_type,
        }
    }
}

/// Uniform result of every remote operation. Failures never cross the API
/// boundary as errors; they are folded into `success=false` plus a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult {
    pub success: bool,
    pub message: String,
    /// Full parsed response body when one was available.
    pub data: Option<Map<String, Value>>,
}

impl ApiResult {
    pub fn ok(message: impl Into<String>, data: Option<Map<String, Value>>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure_with_data(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Some(data),
        }
    }

    /// The server's `isLoggedIn` verdict; absent data or field reads as false.
    pub fn is_logged_in(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|data| data.get("isLoggedIn"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LocationSample {
        LocationSample {
            latitude: 51.5074,
            longitude: -0.1278,
            accuracy: 8.0,
            altitude: 11.0,
            speed: 1.2,
            heading: 270.0,
            captured_at: "2026-03-01T09:00:00.000Z".to_string(),
        }
    }

    fn session() -> Session {
        Session {
            token: "T1".to_string(),
            deployment_code: "D1".to_string(),
            lock_flag: true,
        }
    }

    #[test]
    fn test_sync_request_camel_case_fields() {
        let telemetry = TelemetrySnapshot {
            battery_level: 87,
            signal_class: SignalClass::Strong,
        };
        let request = SyncRequest::new(
            &session(),
            Some(sample()),
            telemetry,
            SyncType::Normal,
            None,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["deploymentCode"], "D1");
        assert_eq!(json["status"], "online");
        assert_eq!(json["batteryLevel"], 87);
        assert_eq!(json["signalClass"], "strong");
        assert_eq!(json["location"]["capturedAt"], "2026-03-01T09:00:00.000Z");
        assert!(json.get("syncType").is_none(), "sync type is header-only");
    }

    #[test]
    fn test_heartbeat_request_omits_location_and_device() {
        let telemetry = TelemetrySnapshot {
            battery_level: 100,
            signal_class: SignalClass::Poor,
        };
        let request = SyncRequest::new(&session(), None, telemetry, SyncType::Normal, None);
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("location").is_none());
        assert!(json.get("device").is_none());
        assert_eq!(json["status"], "online");
    }

    #[test]
    fn test_aggressive_request_carries_device() {
        let telemetry = TelemetrySnapshot {
            battery_level: 42,
            signal_class: SignalClass::Weak,
        };
        let request = SyncRequest::new(
            &session(),
            None,
            telemetry,
            SyncType::Aggressive,
            Some(DeviceDescriptor::best_effort()),
        );
        let json = serde_json::to_value(&request).unwrap();

        assert!(json["device"]["platform"].is_string());
        assert_eq!(request.sync_type.as_header_value(), "aggressive");
    }

    #[test]
    fn test_is_logged_in_defaults_false() {
        let result = ApiResult::ok("OK", None);
        assert!(!result.is_logged_in());

        let mut data = Map::new();
        data.insert("isLoggedIn".to_string(), Value::Bool(true));
        let result = ApiResult::ok("OK", Some(data));
        assert!(result.is_logged_in());
    }
}
