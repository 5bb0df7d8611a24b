//! Proxy host entity
//!
//! A proxy host maps a domain pattern to either a single upstream URL or a
//! weighted backend pool, and carries the TLS and rendering flags the config
//! renderer consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Load-balancing policy for multi-backend hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LbMethod {
    /// nginx default; no policy directive is emitted
    #[default]
    RoundRobin,
    LeastConn,
    IpHash,
}

/// A single backend server in a load-balanced pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Backend address in `host:port` form
    pub address: String,
    /// Load-balancing weight; only emitted when greater than 1
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Backup servers only receive traffic when primaries are down
    #[serde(default)]
    pub backup: bool,
}

fn default_weight() -> u32 {
    1
}

/// A reverse-proxy host record
///
/// The id is stable across renames; the domain is unique across enabled and
/// disabled hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHost {
    /// Opaque identifier, stable across renames
    pub id: String,
    /// Domain pattern, e.g. `example.com` or `*.example.com`
    pub domain: String,
    /// Upstream URL for single-backend mode, e.g. `http://127.0.0.1:3000`
    #[serde(default)]
    pub target: String,
    /// Backend pool; two or more entries switch rendering to an `upstream` block
    #[serde(default)]
    pub backends: Vec<Backend>,
    /// Load-balancing policy for the backend pool
    #[serde(default)]
    pub lb_method: LbMethod,
    /// Serve HTTPS on 443
    #[serde(default)]
    pub ssl: bool,
    /// Redirect plain HTTP to HTTPS; requires `ssl`
    #[serde(default)]
    pub force_ssl: bool,
    /// Bound certificate id; must resolve in the state store when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    /// Whether the enabled-symlink is present
    #[serde(default)]
    pub enabled: bool,
    /// Serve a 503 maintenance page instead of proxying
    #[serde(default)]
    pub maintenance: bool,
    /// Forward WebSocket upgrade headers and extend the read timeout
    #[serde(default)]
    pub websocket: bool,
    /// Opaque directive block appended verbatim inside `server{}`
    #[serde(default)]
    pub custom_nginx: String,
    /// Tag ids for grouping and bulk operations
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProxyHost {
    /// True when the host renders an `upstream` block
    pub fn has_load_balancing(&self) -> bool {
        self.backends.len() >= 2
    }

    /// nginx upstream name: `nubi_` + domain with non-alphanumerics mapped to `_`
    pub fn upstream_name(&self) -> String {
        let safe: String = self
            .domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("nubi_{safe}")
    }
}

/// Caller-supplied fields for host create/update
///
/// The store assigns the id and timestamps; every other field is copied
/// in after validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    pub domain: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub backends: Vec<Backend>,
    #[serde(default)]
    pub lb_method: LbMethod,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub force_ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub websocket: bool,
    #[serde(default)]
    pub custom_nginx: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl HostSpec {
    /// Materialize a new host record from this spec.
    pub fn into_host(self, id: String, now: DateTime<Utc>) -> ProxyHost {
        ProxyHost {
            id,
            domain: self.domain,
            target: self.target,
            backends: self.backends,
            lb_method: self.lb_method,
            ssl: self.ssl,
            force_ssl: self.force_ssl,
            certificate_id: self.certificate_id,
            enabled: self.enabled,
            maintenance: self.maintenance,
            websocket: self.websocket,
            custom_nginx: self.custom_nginx,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply this spec onto an existing host, preserving id and creation time.
    pub fn apply_to(self, host: &ProxyHost, now: DateTime<Utc>) -> ProxyHost {
        ProxyHost {
            id: host.id.clone(),
            created_at: host.created_at,
            updated_at: now,
            domain: self.domain,
            target: self.target,
            backends: self.backends,
            lb_method: self.lb_method,
            ssl: self.ssl,
            force_ssl: self.force_ssl,
            certificate_id: self.certificate_id,
            enabled: self.enabled,
            maintenance: self.maintenance,
            websocket: self.websocket,
            custom_nginx: self.custom_nginx,
            tags: self.tags,
        }
    }
}

impl From<ProxyHost> for HostSpec {
    fn from(host: ProxyHost) -> Self {
        HostSpec {
            domain: host.domain,
            target: host.target,
            backends: host.backends,
            lb_method: host.lb_method,
            ssl: host.ssl,
            force_ssl: host.force_ssl,
            certificate_id: host.certificate_id,
            enabled: host.enabled,
            maintenance: host.maintenance,
            websocket: host.websocket,
            custom_nginx: host.custom_nginx,
            tags: host.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(domain: &str) -> ProxyHost {
        HostSpec {
            domain: domain.to_string(),
            target: "http://127.0.0.1:3000".to_string(),
            ..Default::default()
        }
        .into_host("test-id".to_string(), Utc::now())
    }

    #[test]
    fn upstream_name_mangles_non_alphanumerics() {
        assert_eq!(host("lb.example.com").upstream_name(), "nubi_lb_example_com");
        assert_eq!(
            host("*.example.com").upstream_name(),
            "nubi___example_com"
        );
    }

    #[test]
    fn load_balancing_needs_two_backends() {
        let mut h = host("a.example.com");
        assert!(!h.has_load_balancing());

        h.backends.push(Backend {
            address: "10.0.0.1:80".into(),
            weight: 1,
            backup: false,
        });
        assert!(!h.has_load_balancing());

        h.backends.push(Backend {
            address: "10.0.0.2:80".into(),
            weight: 1,
            backup: false,
        });
        assert!(h.has_load_balancing());
    }

    #[test]
    fn spec_roundtrip_preserves_identity() {
        let original = host("a.example.com");
        let spec = HostSpec::from(original.clone());
        let updated = spec.apply_to(&original, Utc::now());
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.domain, original.domain);
    }

    #[test]
    fn backend_weight_defaults_to_one() {
        let b: Backend = serde_json::from_str(r#"{"address":"10.0.0.1:80"}"#).unwrap();
        assert_eq!(b.weight, 1);
        assert!(!b.backup);
    }
}
