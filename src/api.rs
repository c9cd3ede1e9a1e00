//! Remote operations for the deployment-tracking API.
//!
//! Four wire operations: `setUnit` (login/logout, discriminated by the
//! `action` field), `checkStatus`, `updateLocation`, and the location-less
//! `heartbeat` fallback. Every operation returns an [`ApiResult`] and never
//! propagates a transport error to the caller; per-operation timeouts are
//! fixed by the API contract (8 s status check, 10 s normal report, 15 s
//! aggressive report).

use std::time::Duration;

use log::{debug, warn};
use serde_json::{json, Map, Value};

use crate::error::BeaconError;
use crate::transport::{HttpTransport, RawResponse};
use crate::types::{
    now_iso8601, ApiResult, DeviceDescriptor, LocationSample, Session, SyncRequest, SyncType,
    TelemetrySnapshot,
};

pub const ENDPOINT_SET_UNIT: &str = "setUnit";
pub const ENDPOINT_CHECK_STATUS: &str = "checkStatus";
pub const ENDPOINT_UPDATE_LOCATION: &str = "updateLocation";
pub const ENDPOINT_HEARTBEAT: &str = "heartbeat";

pub const CHECK_STATUS_TIMEOUT: Duration = Duration::from_secs(8);
pub const UPDATE_NORMAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPDATE_AGGRESSIVE_TIMEOUT: Duration = Duration::from_secs(15);
const SET_UNIT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SUCCESS_MESSAGE: &str = "OK";
const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";
const INVALID_RESPONSE_MESSAGE: &str = "Invalid response format from server";
const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";
const SESSION_CHECK_TIMEOUT_MESSAGE: &str = "Session check timed out";

/// Client for the deployment-tracking API. Holds the device descriptor it
/// attaches to aggressive reports; normal reports never carry one.
pub struct ApiClient {
    transport: HttpTransport,
    device: DeviceDescriptor,
}

impl ApiClient {
    pub fn new(base_url: &str, device: DeviceDescriptor) -> Result<Self, BeaconError> {
        Ok(Self {
            transport: HttpTransport::new(base_url)?,
            device,
        })
    }

    /// Bind this device to a deployment.
    pub async fn login(&self, token: &str, deployment_code: &str) -> ApiResult {
        self.set_unit("login", token, deployment_code).await
    }

    /// Release this device from its deployment.
    pub async fn logout(&self, token: &str, deployment_code: &str) -> ApiResult {
        self.set_unit("logout", token, deployment_code).await
    }

    async fn set_unit(&self, action: &str, token: &str, deployment_code: &str) -> ApiResult {
        let body = json!({
            "action": action,
            "deploymentCode": deployment_code,
            "timestamp": now_iso8601(),
        });
        match self
            .transport
            .post_json(ENDPOINT_SET_UNIT, token, &body, SET_UNIT_TIMEOUT, None)
            .await
        {
            Ok(raw) => map_generic(&raw),
            Err(err) => {
                warn!("[Api] {action} failed: {err}");
                ApiResult::failure(err.to_string())
            }
        }
    }

    /// Ask the server whether the cached credentials still name a live
    /// session. Timeouts get their own message so the caller can tell a slow
    /// server from a rejected one; every non-200 reads as logged out.
    pub async fn check_status(&self, token: &str, deployment_code: &str) -> ApiResult {
        let body = json!({
            "deploymentCode": deployment_code,
            "timestamp": now_iso8601(),
        });
        let raw = match self
            .transport
            .post_json(
                ENDPOINT_CHECK_STATUS,
                token,
                &body,
                CHECK_STATUS_TIMEOUT,
                None,
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => return check_status_failure(err),
        };

        match raw.status {
            200 => match parse_object(&raw.body) {
                Some(object) => {
                    let message = body_message(&object, DEFAULT_SUCCESS_MESSAGE);
                    ApiResult::ok(message, Some(object))
                }
                None => ApiResult::failure(INVALID_RESPONSE_MESSAGE),
            },
            401 => {
                warn!("[Api] checkStatus rejected: HTTP 401");
                ApiResult::failure_with_data(
                    BeaconError::Auth { status: 401 }.to_string(),
                    logged_out_payload(),
                )
            }
            status => {
                warn!("[Api] checkStatus failed: HTTP {status}");
                ApiResult::failure_with_data(
                    BeaconError::Server { status }.to_string(),
                    logged_out_payload(),
                )
            }
        }
    }

    /// Post one location report. Aggressive mode stretches the deadline to
    /// 15 s and attaches the device descriptor. HTTP 403 short-circuits to
    /// the session-expired message without touching the body.
    pub async fn update_location(
        &self,
        session: &Session,
        sample: &LocationSample,
        telemetry: TelemetrySnapshot,
        sync_type: SyncType,
    ) -> ApiResult {
        self.send_report(
            ENDPOINT_UPDATE_LOCATION,
            session,
            Some(sample.clone()),
            telemetry,
            sync_type,
        )
        .await
    }

    /// Post a location-less liveness report. Same mapping and timeouts as
    /// [`ApiClient::update_location`]; used whenever no fix was obtained.
    pub async fn heartbeat(
        &self,
        session: &Session,
        telemetry: TelemetrySnapshot,
        sync_type: SyncType,
    ) -> ApiResult {
        self.send_report(ENDPOINT_HEARTBEAT, session, None, telemetry, sync_type)
            .await
    }

    async fn send_report(
        &self,
        endpoint: &str,
        session: &Session,
        location: Option<LocationSample>,
        telemetry: TelemetrySnapshot,
        sync_type: SyncType,
    ) -> ApiResult {
        let device = match sync_type {
            SyncType::Aggressive => Some(self.device.clone()),
            SyncType::Normal => None,
        };
        let request = SyncRequest::new(session, location, telemetry, sync_type, device);
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                // Should be unreachable for these plain containers.
                warn!("[Api] request serialization failed: {e}");
                return ApiResult::failure(DEFAULT_FAILURE_MESSAGE);
            }
        };
        let deadline = match sync_type {
            SyncType::Normal => UPDATE_NORMAL_TIMEOUT,
            SyncType::Aggressive => UPDATE_AGGRESSIVE_TIMEOUT,
        };

        let raw = match self
            .transport
            .post_json(endpoint, &session.token, &body, deadline, Some(sync_type))
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!("[Api] {endpoint} failed: {err}");
                return ApiResult::failure(err.to_string());
            }
        };

        if raw.status == 403 {
            warn!("[Api] {endpoint} rejected: HTTP 403, session expired");
            return ApiResult::failure(SESSION_EXPIRED_MESSAGE);
        }

        let result = map_generic(&raw);
        debug!(
            "[Api] {} ({}) -> success={}",
            endpoint,
            sync_type.as_header_value(),
            result.success
        );
        result
    }
}

/// Generic response mapping shared by every operation without a bespoke
/// contract: success requires both HTTP 200 and `success:true` in the body,
/// the message comes from the body or a default, and the full parsed body is
/// handed back as data.
fn map_generic(raw: &RawResponse) -> ApiResult {
    let Some(object) = parse_object(&raw.body) else {
        return ApiResult::failure(INVALID_RESPONSE_MESSAGE);
    };

    let body_success = object
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let success = raw.status == 200 && body_success;
    let fallback = if success {
        DEFAULT_SUCCESS_MESSAGE
    } else {
        DEFAULT_FAILURE_MESSAGE
    };
    let message = body_message(&object, fallback);

    ApiResult {
        success,
        message,
        data: Some(object),
    }
}

/// Transport-failure mapping for `checkStatus`: timeouts get the dedicated
/// message, everything else its classification string.
fn check_status_failure(err: BeaconError) -> ApiResult {
    warn!("[Api] checkStatus failed: {err}");
    match err {
        BeaconError::Timeout { .. } => ApiResult::failure(SESSION_CHECK_TIMEOUT_MESSAGE),
        other => ApiResult::failure(other.to_string()),
    }
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn body_message(object: &Map<String, Value>, fallback: &str) -> String {
    object
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn logged_out_payload() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("isLoggedIn".to_string(), Value::Bool(false));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_map_generic_requires_status_and_body_success() {
        let result = map_generic(&raw(200, r#"{"success":true,"message":"stored"}"#));
        assert!(result.success);
        assert_eq!(result.message, "stored");

        // 200 with success:false in the body is still a failure
        let result = map_generic(&raw(200, r#"{"success":false}"#));
        assert!(!result.success);
        assert_eq!(result.message, "Request failed");

        // body success with a non-200 status is still a failure
        let result = map_generic(&raw(500, r#"{"success":true}"#));
        assert!(!result.success);
    }

    #[test]
    fn test_map_generic_malformed_body() {
        for body in ["not json", "", "[1,2,3]", "\"plain string\"", "{truncated"] {
            let result = map_generic(&raw(200, body));
            assert!(!result.success);
            assert_eq!(result.message, "Invalid response format from server");
            assert!(result.data.is_none());
        }
    }

    #[test]
    fn test_map_generic_keeps_full_body_as_data() {
        let result = map_generic(&raw(200, r#"{"success":true,"unitName":"alpha-3"}"#));
        let data = result.data.unwrap();
        assert_eq!(data.get("unitName").unwrap(), "alpha-3");
    }

    #[test]
    fn test_check_status_failure_timeout_message() {
        let result = check_status_failure(BeaconError::Timeout { seconds: 8 });
        assert!(!result.success);
        assert_eq!(result.message, "Session check timed out");

        let result = check_status_failure(BeaconError::Network {
            message: "connection failed: refused".to_string(),
        });
        assert!(!result.success);
        assert!(result.message.starts_with("Network error:"));
    }

    #[test]
    fn test_logged_out_payload_shape() {
        let data = logged_out_payload();
        assert_eq!(data.get("isLoggedIn").unwrap(), &Value::Bool(false));
    }
}
