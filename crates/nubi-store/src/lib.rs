//! Authoritative state store for the Nubi control plane
//!
//! The single source of truth for proxy hosts, certificates, tags, the
//! default route and the maintenance backup slot. Each collection persists
//! to its own pretty-printed JSON file under the data directory; unreadable
//! state at startup logs a warning and starts empty, because a first run
//! has no files.
//!
//! Mutations driven through the orchestrator's reload barrier are split
//! into a prepare step (validate, no map change) and a commit step (map
//! change + persist), so a failed `nginx -t` leaves the maps untouched.

mod certificates;
mod hosts;
mod route;
mod tags;

pub use hosts::{BulkTagAction, BulkTagResult, ImportReport};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use nubi_model::{Certificate, DefaultRoute, MaintenanceBackup, ProxyHost, Result, Tag};

const HOSTS_FILE: &str = "proxy_hosts.json";
const CERTIFICATES_FILE: &str = "certificates.json";
const TAGS_FILE: &str = "tags.json";
const DEFAULT_ROUTE_FILE: &str = "default_route_state.json";
const MAINTENANCE_FILE: &str = "maintenance_backup_state.json";

#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) hosts: HashMap<String, ProxyHost>,
    pub(crate) certificates: HashMap<String, Certificate>,
    pub(crate) tags: HashMap<String, Tag>,
    pub(crate) default_route: DefaultRoute,
    pub(crate) maintenance: Option<MaintenanceBackup>,
}

/// In-memory maps plus their JSON persistence
pub struct StateStore {
    pub(crate) inner: RwLock<Inner>,
    data_dir: PathBuf,
}

impl StateStore {
    /// Load persisted state from the data directory, starting empty for
    /// anything missing or unreadable.
    pub fn load(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let mut inner = Inner::default();

        let hosts: Vec<ProxyHost> = load_file(&data_dir.join(HOSTS_FILE));
        inner.hosts = hosts.into_iter().map(|h| (h.id.clone(), h)).collect();

        let certs: Vec<Certificate> = load_file(&data_dir.join(CERTIFICATES_FILE));
        inner.certificates = certs.into_iter().map(|c| (c.id.clone(), c)).collect();

        let tags: Vec<Tag> = load_file(&data_dir.join(TAGS_FILE));
        inner.tags = tags.into_iter().map(|t| (t.id.clone(), t)).collect();

        inner.default_route = load_file(&data_dir.join(DEFAULT_ROUTE_FILE));
        inner.maintenance = load_optional(&data_dir.join(MAINTENANCE_FILE));

        info!(
            hosts = inner.hosts.len(),
            certificates = inner.certificates.len(),
            tags = inner.tags.len(),
            "state store loaded"
        );

        Self {
            inner: RwLock::new(inner),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn persist_hosts(&self) -> Result<()> {
        let hosts = self.list_hosts();
        self.write_file(HOSTS_FILE, &hosts)
    }

    pub(crate) fn persist_certificates(&self) -> Result<()> {
        let certs = self.list_certificates();
        self.write_file(CERTIFICATES_FILE, &certs)
    }

    pub(crate) fn persist_tags(&self) -> Result<()> {
        let tags = self.list_tags();
        self.write_file(TAGS_FILE, &tags)
    }

    pub(crate) fn persist_default_route(&self) -> Result<()> {
        let route = self.default_route();
        self.write_file(DEFAULT_ROUTE_FILE, &route)
    }

    pub(crate) fn persist_maintenance(&self) -> Result<()> {
        let backup = self.maintenance_backup();
        match backup {
            Some(backup) => self.write_file(MAINTENANCE_FILE, &backup),
            None => {
                match std::fs::remove_file(self.data_dir.join(MAINTENANCE_FILE)) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(self.data_dir.join(name), json)?;
        Ok(())
    }
}

fn load_file<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not parse state file, starting empty");
                T::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read state file, starting empty");
            T::default()
        }
    }
}

fn load_optional<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not parse state file, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubi_model::HostSpec;
    use tempfile::TempDir;

    #[test]
    fn fresh_directory_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());
        assert!(store.list_hosts().is_empty());
        assert!(store.list_certificates().is_empty());
        assert!(store.list_tags().is_empty());
        assert!(!store.default_route().enabled);
        assert!(store.maintenance_backup().is_none());
    }

    #[test]
    fn corrupt_state_file_starts_empty_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(HOSTS_FILE), "{not json").unwrap();

        let store = StateStore::load(dir.path());
        assert!(store.list_hosts().is_empty());
    }

    #[test]
    fn hosts_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());

        let host = store
            .prepare_create_host(HostSpec {
                domain: "a.example.com".into(),
                target: "http://127.0.0.1:3000".into(),
                enabled: true,
                ..Default::default()
            })
            .unwrap();
        store.commit_host(host.clone()).unwrap();

        let reloaded = StateStore::load(dir.path());
        let hosts = reloaded.list_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0], host);
    }

    #[test]
    fn state_files_are_pretty_printed_arrays() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());

        let host = store
            .prepare_create_host(HostSpec {
                domain: "a.example.com".into(),
                target: "http://127.0.0.1:3000".into(),
                ..Default::default()
            })
            .unwrap();
        store.commit_host(host).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(HOSTS_FILE)).unwrap();
        assert!(raw.starts_with('['));
        assert!(raw.contains('\n'));
    }
}
