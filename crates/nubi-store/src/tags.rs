//! Tag operations
//!
//! Deleting a tag scrubs its id from every host and certificate tag set so
//! no dangling references survive.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use nubi_model::{Error, Result, Tag, TagSpec};

use crate::hosts::monotonic_now;
use crate::StateStore;

impl StateStore {
    /// All tags, ordered by creation time then id.
    pub fn list_tags(&self) -> Vec<Tag> {
        let inner = self.inner.read().unwrap();
        let mut tags: Vec<Tag> = inner.tags.values().cloned().collect();
        tags.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        tags
    }

    pub fn get_tag(&self, id: &str) -> Result<Tag> {
        let inner = self.inner.read().unwrap();
        inner
            .tags
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("tag", id))
    }

    pub fn create_tag(&self, spec: TagSpec) -> Result<Tag> {
        if spec.name.trim().is_empty() {
            return Err(Error::validation("tag name is required"));
        }

        let tag = {
            let mut inner = self.inner.write().unwrap();
            if inner.tags.values().any(|t| t.name == spec.name) {
                return Err(Error::Conflict(format!(
                    "tag name already exists: {}",
                    spec.name
                )));
            }

            let tag = Tag {
                id: Uuid::new_v4().to_string(),
                name: spec.name,
                color: spec.color,
                created_at: Utc::now(),
            };
            inner.tags.insert(tag.id.clone(), tag.clone());
            tag
        };
        info!(tag_id = %tag.id, name = %tag.name, "created tag");
        self.persist_tags()?;
        Ok(tag)
    }

    pub fn update_tag(&self, id: &str, spec: TagSpec) -> Result<Tag> {
        if spec.name.trim().is_empty() {
            return Err(Error::validation("tag name is required"));
        }

        let updated = {
            let mut inner = self.inner.write().unwrap();
            if inner.tags.values().any(|t| t.id != id && t.name == spec.name) {
                return Err(Error::Conflict(format!(
                    "tag name already exists: {}",
                    spec.name
                )));
            }

            let tag = inner
                .tags
                .get_mut(id)
                .ok_or_else(|| Error::not_found("tag", id))?;
            tag.name = spec.name;
            tag.color = spec.color;
            tag.clone()
        };
        self.persist_tags()?;
        Ok(updated)
    }

    /// Delete a tag and scrub its id from every host and certificate.
    pub fn delete_tag(&self, id: &str) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.tags.remove(id).is_none() {
                return Err(Error::not_found("tag", id));
            }

            for host in inner.hosts.values_mut() {
                if host.tags.iter().any(|t| t == id) {
                    host.tags.retain(|t| t != id);
                    host.updated_at = monotonic_now(host.updated_at);
                }
            }
            for cert in inner.certificates.values_mut() {
                if cert.tags.iter().any(|t| t == id) {
                    cert.tags.retain(|t| t != id);
                    cert.updated_at = monotonic_now(cert.updated_at);
                }
            }
        }
        info!(tag_id = %id, "deleted tag and scrubbed references");

        self.persist_tags()?;
        self.persist_hosts()?;
        self.persist_certificates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BulkTagAction;
    use nubi_model::{CertProvenance, Certificate, HostSpec};
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());
        (dir, store)
    }

    #[test]
    fn tag_names_are_unique() {
        let (_dir, store) = store();
        store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: "#00ff00".into(),
            })
            .unwrap();

        let err = store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: "#0000ff".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn delete_scrubs_hosts_and_certificates() {
        let (_dir, store) = store();
        let tag = store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: String::new(),
            })
            .unwrap();

        let host = store
            .prepare_create_host(HostSpec {
                domain: "a.example.com".into(),
                target: "http://127.0.0.1:1".into(),
                ..Default::default()
            })
            .unwrap();
        store.commit_host(host.clone()).unwrap();

        let now = Utc::now();
        store
            .insert_certificate(Certificate {
                id: "c1".into(),
                name: "c1".into(),
                domains: vec!["a.example.com".into()],
                cert_path: "/tmp/c1.crt".into(),
                key_path: "/tmp/c1.key".into(),
                chain_path: None,
                provenance: CertProvenance::Uploaded,
                expires_at: now,
                auto_renew: false,
                tags: vec![],
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        store
            .bulk_apply_tag(
                &tag.id,
                BulkTagAction::Add,
                &[host.id.clone()],
                &["c1".to_string()],
            )
            .unwrap();
        assert_eq!(store.get_host(&host.id).unwrap().tags, vec![tag.id.clone()]);
        assert_eq!(store.get_certificate("c1").unwrap().tags, vec![tag.id.clone()]);

        store.delete_tag(&tag.id).unwrap();
        assert!(store.get_host(&host.id).unwrap().tags.is_empty());
        assert!(store.get_certificate("c1").unwrap().tags.is_empty());
        assert!(store.get_tag(&tag.id).is_err());
    }

    #[test]
    fn rename_collision_rejected() {
        let (_dir, store) = store();
        store
            .create_tag(TagSpec {
                name: "prod".into(),
                color: String::new(),
            })
            .unwrap();
        let staging = store
            .create_tag(TagSpec {
                name: "staging".into(),
                color: String::new(),
            })
            .unwrap();

        let err = store
            .update_tag(
                &staging.id,
                TagSpec {
                    name: "prod".into(),
                    color: String::new(),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
