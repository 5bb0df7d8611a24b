//! Certificate operations
//!
//! Certificates never touch nginx on their own, so these mutate directly;
//! binding a certificate to a host goes through the orchestrator instead.

use chrono::{DateTime, Utc};
use tracing::info;

use nubi_model::{Certificate, CertificateSpec, Error, RenewalCandidate, Result};

use crate::hosts::monotonic_now;
use crate::StateStore;

impl StateStore {
    /// All certificates, ordered by creation time then id.
    pub fn list_certificates(&self) -> Vec<Certificate> {
        let inner = self.inner.read().unwrap();
        let mut certs: Vec<Certificate> = inner.certificates.values().cloned().collect();
        certs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        certs
    }

    pub fn get_certificate(&self, id: &str) -> Result<Certificate> {
        let inner = self.inner.read().unwrap();
        inner
            .certificates
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("certificate", id))
    }

    /// Insert a fully-built certificate record and persist.
    pub fn insert_certificate(&self, cert: Certificate) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.certificates.insert(cert.id.clone(), cert.clone());
        }
        info!(cert_id = %cert.id, name = %cert.name, "stored certificate");
        self.persist_certificates()
    }

    /// Update display metadata; paths and provenance are untouched.
    pub fn update_certificate_meta(&self, id: &str, spec: CertificateSpec) -> Result<Certificate> {
        let updated = {
            let mut inner = self.inner.write().unwrap();
            let cert = inner
                .certificates
                .get_mut(id)
                .ok_or_else(|| Error::not_found("certificate", id))?;

            cert.name = spec.name;
            cert.domains = spec.domains;
            cert.auto_renew = spec.auto_renew;
            cert.tags = spec.tags;
            cert.updated_at = monotonic_now(cert.updated_at);
            cert.clone()
        };
        self.persist_certificates()?;
        Ok(updated)
    }

    /// Rewrite material paths and expiry after a renewal, preserving the id
    /// so host bindings stay valid.
    pub fn update_certificate_material(
        &self,
        id: &str,
        cert_path: String,
        key_path: String,
        chain_path: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate> {
        let updated = {
            let mut inner = self.inner.write().unwrap();
            let cert = inner
                .certificates
                .get_mut(id)
                .ok_or_else(|| Error::not_found("certificate", id))?;

            cert.cert_path = cert_path;
            cert.key_path = key_path;
            cert.chain_path = chain_path;
            cert.expires_at = expires_at;
            cert.updated_at = monotonic_now(cert.updated_at);
            cert.clone()
        };
        info!(cert_id = %id, expires_at = %updated.expires_at, "renewed certificate material");
        self.persist_certificates()?;
        Ok(updated)
    }

    /// Delete a certificate. Refused while any host still references it.
    pub fn delete_certificate(&self, id: &str) -> Result<Certificate> {
        let removed = {
            let mut inner = self.inner.write().unwrap();

            let bound: Vec<String> = inner
                .hosts
                .values()
                .filter(|h| h.certificate_id.as_deref() == Some(id))
                .map(|h| h.domain.clone())
                .collect();
            if !bound.is_empty() {
                return Err(Error::Conflict(format!(
                    "certificate is in use by: {}",
                    bound.join(", ")
                )));
            }

            inner
                .certificates
                .remove(id)
                .ok_or_else(|| Error::not_found("certificate", id))?
        };
        info!(cert_id = %id, "deleted certificate");
        self.persist_certificates()?;
        Ok(removed)
    }

    /// Ids of hosts currently bound to a certificate.
    pub fn hosts_bound_to_certificate(&self, id: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner
            .hosts
            .values()
            .filter(|h| h.certificate_id.as_deref() == Some(id))
            .map(|h| h.id.clone())
            .collect()
    }

    /// The renewal scan: auto-renewing ACME certificates within 30 days of
    /// expiry (or past it). Read-only.
    pub fn renewal_candidates(&self, now: DateTime<Utc>) -> Vec<RenewalCandidate> {
        let mut candidates: Vec<RenewalCandidate> = {
            let inner = self.inner.read().unwrap();
            inner
                .certificates
                .values()
                .filter(|c| c.needs_renewal(now))
                .map(|c| RenewalCandidate::from_certificate(c, now))
                .collect()
        };
        candidates.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        candidates
    }
}
