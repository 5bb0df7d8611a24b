//! Input validation applied at create/update boundaries
//!
//! The renderer is total for validated entities, so everything that could
//! produce invalid nginx syntax through structured fields is rejected here.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::host::HostSpec;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](-?[A-Za-z0-9])*(\.[A-Za-z0-9](-?[A-Za-z0-9])*)+$").unwrap()
});

/// Validate a domain pattern. A single leading wildcard label is allowed.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::validation("domain is required"));
    }

    let stripped = domain.strip_prefix("*.").unwrap_or(domain);
    if !DOMAIN_RE.is_match(stripped) {
        return Err(Error::validation(format!(
            "invalid domain format: {domain}"
        )));
    }

    Ok(())
}

/// Validate a single-backend target URL.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(Error::validation("target is required"));
    }

    if !target.starts_with("http://") && !target.starts_with("https://") {
        return Err(Error::validation(
            "target must start with http:// or https://",
        ));
    }

    Ok(())
}

/// Validate a backend address in `host:port` form, port 1..=65535.
pub fn validate_backend_address(address: &str) -> Result<()> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        Error::validation(format!("backend address must be host:port: {address}"))
    })?;

    if host.is_empty() {
        return Err(Error::validation(format!(
            "backend address has an empty host: {address}"
        )));
    }

    match port.parse::<u32>() {
        Ok(p) if (1..=65_535).contains(&p) => Ok(()),
        _ => Err(Error::validation(format!(
            "backend port must be between 1 and 65535: {address}"
        ))),
    }
}

/// Validate every structured field of a host spec.
pub fn validate_host_spec(spec: &HostSpec) -> Result<()> {
    validate_domain(&spec.domain)?;

    if spec.backends.is_empty() {
        validate_target(&spec.target)?;
    } else {
        for backend in &spec.backends {
            validate_backend_address(&backend.address)?;
            if backend.weight == 0 {
                return Err(Error::validation(format!(
                    "backend weight must be at least 1: {}",
                    backend.address
                )));
            }
        }
    }

    if spec.force_ssl && !spec.ssl {
        return Err(Error::validation(
            "forceSsl requires ssl to be enabled",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Backend;

    #[test]
    fn accepts_plain_and_wildcard_domains() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("sub.example.com").is_ok());
        assert!(validate_domain("*.example.com").is_ok());
        assert!(validate_domain("a-b.example.com").is_ok());
    }

    #[test]
    fn rejects_malformed_domains() {
        assert!(validate_domain("").is_err());
        assert!(validate_domain("example").is_err());
        assert!(validate_domain("-example.com").is_err());
        assert!(validate_domain("example-.com").is_err());
        assert!(validate_domain("ex ample.com").is_err());
        assert!(validate_domain("*.*.example.com").is_err());
        assert!(validate_domain(".example.com").is_err());
        assert!(validate_domain("example.com.").is_err());
    }

    #[test]
    fn target_requires_http_scheme() {
        assert!(validate_target("http://127.0.0.1:3000").is_ok());
        assert!(validate_target("https://backend.internal").is_ok());
        assert!(validate_target("").is_err());
        assert!(validate_target("127.0.0.1:3000").is_err());
        assert!(validate_target("ftp://x").is_err());
    }

    #[test]
    fn backend_address_bounds() {
        assert!(validate_backend_address("10.0.0.1:80").is_ok());
        assert!(validate_backend_address("backend.internal:65535").is_ok());
        assert!(validate_backend_address("10.0.0.1").is_err());
        assert!(validate_backend_address(":80").is_err());
        assert!(validate_backend_address("10.0.0.1:0").is_err());
        assert!(validate_backend_address("10.0.0.1:65536").is_err());
        assert!(validate_backend_address("10.0.0.1:http").is_err());
    }

    #[test]
    fn host_spec_single_target_mode() {
        let spec = HostSpec {
            domain: "api.example.com".into(),
            target: "http://127.0.0.1:3000".into(),
            ..Default::default()
        };
        assert!(validate_host_spec(&spec).is_ok());
    }

    #[test]
    fn host_spec_load_balanced_mode_skips_target_check() {
        let spec = HostSpec {
            domain: "lb.example.com".into(),
            backends: vec![
                Backend {
                    address: "10.0.0.1:80".into(),
                    weight: 3,
                    backup: false,
                },
                Backend {
                    address: "10.0.0.2:80".into(),
                    weight: 1,
                    backup: true,
                },
            ],
            ..Default::default()
        };
        assert!(validate_host_spec(&spec).is_ok());
    }

    #[test]
    fn force_ssl_requires_ssl() {
        let spec = HostSpec {
            domain: "a.example.com".into(),
            target: "http://127.0.0.1:1".into(),
            force_ssl: true,
            ssl: false,
            ..Default::default()
        };
        assert!(validate_host_spec(&spec).is_err());
    }

    #[test]
    fn zero_weight_backend_rejected() {
        let spec = HostSpec {
            domain: "lb.example.com".into(),
            backends: vec![Backend {
                address: "10.0.0.1:80".into(),
                weight: 0,
                backup: false,
            }],
            ..Default::default()
        };
        assert!(validate_host_spec(&spec).is_err());
    }
}
