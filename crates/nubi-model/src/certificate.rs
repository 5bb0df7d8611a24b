//! TLS certificate entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How a certificate entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CertProvenance {
    /// PEM material supplied by the operator
    Uploaded,
    /// Issued through the ACME agent
    AcmeIssued,
    /// Generated locally for development
    SelfSigned,
}

/// A managed TLS certificate
///
/// Paths point at the on-disk PEM files under the data directory. On renewal
/// the expiry advances and the paths may be rewritten; the id (and therefore
/// every host binding) is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    /// Display name
    pub name: String,
    /// Domains covered by this certificate
    pub domains: Vec<String>,
    /// Path to the certificate (or full chain) PEM
    pub cert_path: String,
    /// Path to the private key PEM, mode 0600
    pub key_path: String,
    /// Optional CA chain path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_path: Option<String>,
    pub provenance: CertProvenance,
    pub expires_at: DateTime<Utc>,
    /// Eligible for the renewal scan (ACME-issued certificates only)
    #[serde(default)]
    pub auto_renew: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Whole days until expiry; negative once expired.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }

    /// True when the renewal scan should report this certificate.
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        self.auto_renew
            && self.provenance == CertProvenance::AcmeIssued
            && self.expires_at - now < chrono::Duration::days(30)
    }
}

/// Metadata for certificate create/update; file material travels separately.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub auto_renew: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One entry in the renewal-scan report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewalCandidate {
    pub id: String,
    pub name: String,
    pub domains: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub days_until_expiry: i64,
}

impl RenewalCandidate {
    pub fn from_certificate(cert: &Certificate, now: DateTime<Utc>) -> Self {
        RenewalCandidate {
            id: cert.id.clone(),
            name: cert.name.clone(),
            domains: cert.domains.clone(),
            expires_at: cert.expires_at,
            days_until_expiry: cert.days_until_expiry(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(provenance: CertProvenance, auto_renew: bool, days: i64) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: "c1".into(),
            name: "test".into(),
            domains: vec!["example.com".into()],
            cert_path: "/tmp/c1.crt".into(),
            key_path: "/tmp/c1.key".into(),
            chain_path: None,
            provenance,
            expires_at: now + chrono::Duration::days(days),
            auto_renew,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn renewal_applies_to_acme_certs_inside_window() {
        let now = Utc::now();
        assert!(cert(CertProvenance::AcmeIssued, true, 10).needs_renewal(now));
        assert!(cert(CertProvenance::AcmeIssued, true, -1).needs_renewal(now));
        assert!(!cert(CertProvenance::AcmeIssued, true, 45).needs_renewal(now));
        assert!(!cert(CertProvenance::AcmeIssued, false, 10).needs_renewal(now));
        assert!(!cert(CertProvenance::Uploaded, true, 10).needs_renewal(now));
    }

    #[test]
    fn days_until_expiry_goes_negative() {
        let now = Utc::now();
        let c = cert(CertProvenance::AcmeIssued, true, -2);
        assert!(c.days_until_expiry(now) < 0);
    }

    #[test]
    fn provenance_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CertProvenance::AcmeIssued).unwrap(),
            r#""acme-issued""#
        );
        assert_eq!(
            serde_json::to_string(&CertProvenance::SelfSigned).unwrap(),
            r#""self-signed""#
        );
    }
}
