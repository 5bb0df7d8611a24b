//! Proxy host operations
//!
//! Prepare steps validate and build the post-mutation record without
//! touching the maps; the orchestrator commits only after `nginx -t`
//! passes. Operations with no nginx side effect (bulk tagging) mutate
//! directly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use nubi_model::validate::validate_host_spec;
use nubi_model::{Error, HostSpec, ProxyHost, Result};

use crate::StateStore;

/// Direction of a bulk tag operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BulkTagAction {
    Add,
    Remove,
}

/// Outcome of a bulk tag operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagResult {
    pub updated_hosts: usize,
    pub updated_certificates: usize,
    pub errors: Vec<String>,
}

/// Outcome of a host import
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// `updated_at` must move forward even when the wall clock does not.
pub(crate) fn monotonic_now(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + Duration::milliseconds(1)
    }
}

impl StateStore {
    /// All hosts, ordered by creation time then id for stable output.
    pub fn list_hosts(&self) -> Vec<ProxyHost> {
        let inner = self.inner.read().unwrap();
        let mut hosts: Vec<ProxyHost> = inner.hosts.values().cloned().collect();
        hosts.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        hosts
    }

    pub fn get_host(&self, id: &str) -> Result<ProxyHost> {
        let inner = self.inner.read().unwrap();
        inner
            .hosts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("proxy host", id))
    }

    pub fn find_host_by_domain(&self, domain: &str) -> Option<ProxyHost> {
        let inner = self.inner.read().unwrap();
        inner.hosts.values().find(|h| h.domain == domain).cloned()
    }

    /// Validate a create and build the new record. Nothing is inserted.
    pub fn prepare_create_host(&self, spec: HostSpec) -> Result<ProxyHost> {
        validate_host_spec(&spec)?;

        let inner = self.inner.read().unwrap();
        if inner.hosts.values().any(|h| h.domain == spec.domain) {
            return Err(Error::Conflict(format!(
                "domain already exists: {}",
                spec.domain
            )));
        }
        if let Some(cert_id) = &spec.certificate_id {
            if !inner.certificates.contains_key(cert_id) {
                return Err(Error::validation(format!(
                    "certificate does not exist: {cert_id}"
                )));
            }
        }
        drop(inner);

        Ok(spec.into_host(Uuid::new_v4().to_string(), Utc::now()))
    }

    /// Validate an update and build the post-mutation record alongside the
    /// current one. Nothing is modified.
    pub fn prepare_update_host(&self, id: &str, spec: HostSpec) -> Result<(ProxyHost, ProxyHost)> {
        validate_host_spec(&spec)?;

        let inner = self.inner.read().unwrap();
        let previous = inner
            .hosts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("proxy host", id))?;

        if spec.domain != previous.domain
            && inner
                .hosts
                .values()
                .any(|h| h.id != id && h.domain == spec.domain)
        {
            return Err(Error::Conflict(format!(
                "domain already exists: {}",
                spec.domain
            )));
        }
        if let Some(cert_id) = &spec.certificate_id {
            if !inner.certificates.contains_key(cert_id) {
                return Err(Error::validation(format!(
                    "certificate does not exist: {cert_id}"
                )));
            }
        }
        drop(inner);

        let updated = spec.apply_to(&previous, monotonic_now(previous.updated_at));
        Ok((updated, previous))
    }

    /// Build the record for an enabled-flag flip.
    pub fn prepare_toggle_host(&self, id: &str, enabled: bool) -> Result<ProxyHost> {
        let mut host = self.get_host(id)?;
        host.enabled = enabled;
        host.updated_at = monotonic_now(host.updated_at);
        Ok(host)
    }

    /// Build the record for a per-host maintenance flip.
    pub fn prepare_host_maintenance(&self, id: &str, maintenance: bool) -> Result<ProxyHost> {
        let mut host = self.get_host(id)?;
        host.maintenance = maintenance;
        host.updated_at = monotonic_now(host.updated_at);
        Ok(host)
    }

    /// Build the record binding a certificate to a host.
    pub fn prepare_apply_certificate(&self, host_id: &str, cert_id: &str) -> Result<ProxyHost> {
        {
            let inner = self.inner.read().unwrap();
            if !inner.certificates.contains_key(cert_id) {
                return Err(Error::not_found("certificate", cert_id));
            }
        }

        let mut host = self.get_host(host_id)?;
        host.certificate_id = Some(cert_id.to_string());
        host.ssl = true;
        host.updated_at = monotonic_now(host.updated_at);
        Ok(host)
    }

    /// Insert or replace a prepared host record and persist.
    pub fn commit_host(&self, host: ProxyHost) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.hosts.insert(host.id.clone(), host.clone());
        }
        info!(host_id = %host.id, domain = %host.domain, "committed proxy host");
        self.persist_hosts()
    }

    /// Remove a host and persist. The caller has already withdrawn its
    /// fragment.
    pub fn remove_host(&self, id: &str) -> Result<ProxyHost> {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            inner
                .hosts
                .remove(id)
                .ok_or_else(|| Error::not_found("proxy host", id))?
        };
        info!(host_id = %id, domain = %removed.domain, "removed proxy host");
        self.persist_hosts()?;
        Ok(removed)
    }

    /// Add or remove one tag across host and certificate sets.
    ///
    /// Idempotent: duplicate adds and missing removes are no-ops counted as
    /// success. Unknown entity ids become per-item error strings.
    pub fn bulk_apply_tag(
        &self,
        tag_id: &str,
        action: BulkTagAction,
        host_ids: &[String],
        certificate_ids: &[String],
    ) -> Result<BulkTagResult> {
        let mut result = BulkTagResult::default();

        {
            let mut inner = self.inner.write().unwrap();

            if action == BulkTagAction::Add && !inner.tags.contains_key(tag_id) {
                return Err(Error::not_found("tag", tag_id));
            }

            for id in host_ids {
                match inner.hosts.get_mut(id) {
                    Some(host) => {
                        apply_tag(&mut host.tags, tag_id, action);
                        host.updated_at = monotonic_now(host.updated_at);
                        result.updated_hosts += 1;
                    }
                    None => result.errors.push(format!("proxy host not found: {id}")),
                }
            }

            for id in certificate_ids {
                match inner.certificates.get_mut(id) {
                    Some(cert) => {
                        apply_tag(&mut cert.tags, tag_id, action);
                        cert.updated_at = monotonic_now(cert.updated_at);
                        result.updated_certificates += 1;
                    }
                    None => result.errors.push(format!("certificate not found: {id}")),
                }
            }
        }

        self.persist_hosts()?;
        self.persist_certificates()?;
        Ok(result)
    }
}

fn apply_tag(tags: &mut Vec<String>, tag_id: &str, action: BulkTagAction) {
    match action {
        BulkTagAction::Add => {
            if !tags.iter().any(|t| t == tag_id) {
                tags.push(tag_id.to_string());
            }
        }
        BulkTagAction::Remove => tags.retain(|t| t != tag_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubi_model::TagSpec;
    use tempfile::TempDir;

    fn spec(domain: &str) -> HostSpec {
        HostSpec {
            domain: domain.into(),
            target: "http://127.0.0.1:3000".into(),
            enabled: true,
            ..Default::default()
        }
    }

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());
        (dir, store)
    }

    #[test]
    fn create_then_get() {
        let (_dir, store) = store();
        let host = store.prepare_create_host(spec("a.example.com")).unwrap();
        store.commit_host(host.clone()).unwrap();

        assert_eq!(store.get_host(&host.id).unwrap().domain, "a.example.com");
        assert!(store.find_host_by_domain("a.example.com").is_some());
    }

    #[test]
    fn duplicate_domain_is_a_conflict() {
        let (_dir, store) = store();
        let host = store.prepare_create_host(spec("a.example.com")).unwrap();
        store.commit_host(host).unwrap();

        let err = store.prepare_create_host(spec("a.example.com")).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn prepare_does_not_mutate() {
        let (_dir, store) = store();
        let _uncommitted = store.prepare_create_host(spec("a.example.com")).unwrap();
        assert!(store.list_hosts().is_empty());
        // The domain is free again because nothing was staged into the map.
        assert!(store.prepare_create_host(spec("a.example.com")).is_ok());
    }

    #[test]
    fn update_keeps_id_and_rejects_stolen_domain() {
        let (_dir, store) = store();
        let a = store.prepare_create_host(spec("a.example.com")).unwrap();
        store.commit_host(a.clone()).unwrap();
        let b = store.prepare_create_host(spec("b.example.com")).unwrap();
        store.commit_host(b.clone()).unwrap();

        let err = store
            .prepare_update_host(&b.id, spec("a.example.com"))
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let (updated, previous) = store
            .prepare_update_host(&b.id, spec("c.example.com"))
            .unwrap();
        assert_eq!(updated.id, b.id);
        assert_eq!(previous.domain, "b.example.com");
        assert!(updated.updated_at > previous.updated_at);
    }

    #[test]
    fn unknown_certificate_binding_is_rejected() {
        let (_dir, store) = store();
        let mut s = spec("a.example.com");
        s.certificate_id = Some("missing-cert".into());
        let err = store.prepare_create_host(s).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn toggle_flips_enabled_only() {
        let (_dir, store) = store();
        let host = store.prepare_create_host(spec("a.example.com")).unwrap();
        store.commit_host(host.clone()).unwrap();

        let toggled = store.prepare_toggle_host(&host.id, false).unwrap();
        assert!(!toggled.enabled);
        assert_eq!(toggled.domain, host.domain);
        // Not yet committed.
        assert!(store.get_host(&host.id).unwrap().enabled);
    }

    #[test]
    fn bulk_tag_is_idempotent() {
        let (_dir, store) = store();
        let host = store.prepare_create_host(spec("a.example.com")).unwrap();
        store.commit_host(host.clone()).unwrap();
        let tag = store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: "#ff0000".into(),
            })
            .unwrap();

        let ids = vec![host.id.clone()];
        let first = store
            .bulk_apply_tag(&tag.id, BulkTagAction::Add, &ids, &[])
            .unwrap();
        let second = store
            .bulk_apply_tag(&tag.id, BulkTagAction::Add, &ids, &[])
            .unwrap();
        assert_eq!(first.updated_hosts, 1);
        assert_eq!(second.updated_hosts, 1);
        assert_eq!(store.get_host(&host.id).unwrap().tags, vec![tag.id.clone()]);

        // Removing twice is also fine.
        store
            .bulk_apply_tag(&tag.id, BulkTagAction::Remove, &ids, &[])
            .unwrap();
        let after = store
            .bulk_apply_tag(&tag.id, BulkTagAction::Remove, &ids, &[])
            .unwrap();
        assert!(after.errors.is_empty());
        assert!(store.get_host(&host.id).unwrap().tags.is_empty());
    }

    #[test]
    fn bulk_tag_reports_unknown_ids() {
        let (_dir, store) = store();
        let tag = store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: String::new(),
            })
            .unwrap();

        let result = store
            .bulk_apply_tag(&tag.id, BulkTagAction::Add, &["ghost".to_string()], &[])
            .unwrap();
        assert_eq!(result.updated_hosts, 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn monotonic_now_never_goes_backwards() {
        let future = Utc::now() + Duration::seconds(60);
        assert!(monotonic_now(future) > future);
    }
}
