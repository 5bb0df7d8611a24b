//! Default-route and maintenance singletons

use nubi_model::{DefaultRoute, MaintenanceBackup, Result};

use crate::StateStore;

impl StateStore {
    pub fn default_route(&self) -> DefaultRoute {
        self.inner.read().unwrap().default_route.clone()
    }

    /// Replace the default-route singleton and persist. Called by the
    /// orchestrator after the new fragment survived `nginx -t`.
    pub fn commit_default_route(&self, route: DefaultRoute) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.default_route = route;
        }
        self.persist_default_route()
    }

    pub fn maintenance_backup(&self) -> Option<MaintenanceBackup> {
        self.inner.read().unwrap().maintenance.clone()
    }

    /// Maintenance mode is on exactly while a backup slot exists.
    pub fn maintenance_enabled(&self) -> bool {
        self.inner.read().unwrap().maintenance.is_some()
    }

    pub fn set_maintenance_backup(&self, backup: Option<MaintenanceBackup>) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.maintenance = backup;
        }
        self.persist_maintenance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubi_model::DefaultRouteMode;
    use tempfile::TempDir;

    #[test]
    fn default_route_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());

        let route = DefaultRoute {
            enabled: true,
            mode: DefaultRouteMode::Proxy,
            target: "http://127.0.0.1:9000".into(),
            ..Default::default()
        };
        store.commit_default_route(route.clone()).unwrap();

        let reloaded = StateStore::load(dir.path());
        assert_eq!(reloaded.default_route(), route);
    }

    #[test]
    fn maintenance_backup_slot_tracks_enabled() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());
        assert!(!store.maintenance_enabled());

        store
            .set_maintenance_backup(Some(MaintenanceBackup {
                message: "Be right back".into(),
                previous: Some(DefaultRoute {
                    enabled: true,
                    mode: DefaultRouteMode::Proxy,
                    target: "http://127.0.0.1:9000".into(),
                    ..Default::default()
                }),
            }))
            .unwrap();
        assert!(store.maintenance_enabled());

        // Survives a restart, then clears.
        let reloaded = StateStore::load(dir.path());
        assert!(reloaded.maintenance_enabled());
        reloaded.set_maintenance_backup(None).unwrap();
        assert!(!reloaded.maintenance_enabled());
        assert!(!dir.path().join("maintenance_backup_state.json").exists());
    }
}
