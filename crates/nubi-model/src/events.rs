//! Subscriber event contracts
//!
//! Each message serializes as `{"type": ..., "payload": ...}`. The framing
//! (WebSocket, SSE, anything push-shaped) is up to the surface; the shapes
//! here are the contract.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// nginx health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxStatusPayload {
    /// Master process is alive (pidfile resolves to a live process)
    pub running: bool,
    /// Last `nginx -t` passed
    pub config_valid: bool,
    /// `nginx -v` output, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Global maintenance-mode state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePayload {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Periodic metrics snapshot
///
/// Scrape failures zero-fill; subscribers never see an error event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub active_connections: i64,
    /// Daemon uptime in seconds
    pub uptime: i64,
    /// Human-readable uptime, e.g. `2d 4h 12m`
    pub uptime_string: String,
    pub reading: i64,
    pub writing: i64,
    pub waiting: i64,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
}

/// A typed event delivered to every subscriber sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    NginxStatus(NginxStatusPayload),
    MaintenanceMode(MaintenancePayload),
    Metrics(MetricsPayload),
}

/// Format seconds as a short human-readable duration.
pub fn format_uptime(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_shape() {
        let event = Event::NginxStatus(NginxStatusPayload {
            running: true,
            config_valid: true,
            version: Some("nginx/1.24.0".into()),
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "nginx_status");
        assert_eq!(json["payload"]["running"], true);
        assert_eq!(json["payload"]["configValid"], true);
    }

    #[test]
    fn metrics_payload_uses_camel_case() {
        let event = Event::Metrics(MetricsPayload {
            active_connections: 3,
            uptime: 61,
            uptime_string: format_uptime(61),
            ..Default::default()
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "metrics");
        assert_eq!(json["payload"]["activeConnections"], 3);
        assert_eq!(json["payload"]["uptimeString"], "1m 1s");
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(30), "30s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3_700), "1h 1m 40s");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }
}
