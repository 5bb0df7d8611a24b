//! Filesystem reconciliation of rendered fragments
//!
//! The on-disk config tree is the contract with nginx: fragments live under
//! sites-available and are activated by a same-named symlink under
//! sites-enabled. Writes go through a temp file and rename so a fragment is
//! never observed half-written. Withdrawal tolerates missing files.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use nubi_model::Result;

/// Snapshot of one fragment used for rollback
///
/// `contents: None` means the fragment did not exist before the mutation;
/// restoring such a state withdraws the fragment again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentState {
    pub name: String,
    pub contents: Option<Vec<u8>>,
    pub enabled: bool,
}

/// Owns the sites-available/sites-enabled tree and the custom HTML bodies
#[derive(Debug, Clone)]
pub struct Reconciler {
    available_dir: PathBuf,
    enabled_dir: PathBuf,
    html_dir: PathBuf,
}

impl Reconciler {
    pub fn new(
        available_dir: impl Into<PathBuf>,
        enabled_dir: impl Into<PathBuf>,
        html_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            available_dir: available_dir.into(),
            enabled_dir: enabled_dir.into(),
            html_dir: html_dir.into(),
        }
    }

    pub fn html_dir(&self) -> &Path {
        &self.html_dir
    }

    fn available_path(&self, name: &str) -> PathBuf {
        self.available_dir.join(name)
    }

    fn enabled_path(&self, name: &str) -> PathBuf {
        self.enabled_dir.join(name)
    }

    /// Write a fragment and reconcile its enabled-symlink.
    pub async fn materialize(&self, name: &str, rendered: &str, enabled: bool) -> Result<()> {
        create_dir_0755(&self.available_dir).await?;

        let target = self.available_path(name);
        let tmp = self.available_dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, rendered).await?;
        fs::rename(&tmp, &target).await?;
        debug!(fragment = %name, enabled, "materialized config fragment");

        self.set_enabled(name, enabled).await
    }

    /// Create or remove the enabled-symlink without touching the fragment.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let link = self.enabled_path(name);
        remove_if_exists(&link).await?;

        if enabled {
            create_dir_0755(&self.enabled_dir).await?;
            fs::symlink(self.available_path(name), &link).await?;
        }

        Ok(())
    }

    /// Remove a fragment and its symlink. Missing files are not errors.
    pub async fn withdraw(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.enabled_path(name)).await?;
        remove_if_exists(&self.available_path(name)).await?;
        debug!(fragment = %name, "withdrew config fragment");
        Ok(())
    }

    /// Capture a fragment's current state for rollback.
    pub async fn snapshot(&self, name: &str) -> Result<FragmentState> {
        let contents = match fs::read(self.available_path(name)).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let enabled = fs::symlink_metadata(self.enabled_path(name)).await.is_ok();

        Ok(FragmentState {
            name: name.to_string(),
            contents,
            enabled,
        })
    }

    /// Restore a previously captured state bit-identically.
    pub async fn restore(&self, state: &FragmentState) -> Result<()> {
        match &state.contents {
            Some(bytes) => {
                create_dir_0755(&self.available_dir).await?;
                let target = self.available_path(&state.name);
                let tmp = self.available_dir.join(format!(".{}.tmp", state.name));
                fs::write(&tmp, bytes).await?;
                fs::rename(&tmp, &target).await?;
                self.set_enabled(&state.name, state.enabled).await?;
            }
            None => {
                self.withdraw(&state.name).await?;
            }
        }
        warn!(fragment = %state.name, "restored fragment after failed validation");
        Ok(())
    }

    /// Write a custom HTML body under the html directory.
    pub async fn write_html(&self, filename: &str, body: &str) -> Result<()> {
        create_dir_0755(&self.html_dir).await?;
        fs::write(self.html_dir.join(filename), body).await?;
        Ok(())
    }

    /// Remove a custom HTML body; missing files are not errors.
    pub async fn remove_html(&self, filename: &str) -> Result<()> {
        remove_if_exists(&self.html_dir.join(filename)).await
    }
}

async fn create_dir_0755(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reconciler(dir: &TempDir) -> Reconciler {
        Reconciler::new(
            dir.path().join("sites-available"),
            dir.path().join("sites-enabled"),
            dir.path().join("html"),
        )
    }

    #[tokio::test]
    async fn materialize_writes_fragment_and_symlink() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        r.materialize("nubi-host-a_example_com.conf", "server {}\n", true)
            .await
            .unwrap();

        let available = dir.path().join("sites-available/nubi-host-a_example_com.conf");
        let enabled = dir.path().join("sites-enabled/nubi-host-a_example_com.conf");
        assert_eq!(std::fs::read_to_string(&available).unwrap(), "server {}\n");
        assert!(std::fs::symlink_metadata(&enabled).unwrap().is_symlink());
        assert_eq!(std::fs::read_link(&enabled).unwrap(), available);
    }

    #[tokio::test]
    async fn disabled_host_has_no_symlink() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        r.materialize("f.conf", "server {}\n", true).await.unwrap();
        r.materialize("f.conf", "server {}\n", false).await.unwrap();

        assert!(dir.path().join("sites-available/f.conf").exists());
        assert!(std::fs::symlink_metadata(dir.path().join("sites-enabled/f.conf")).is_err());
    }

    #[tokio::test]
    async fn withdraw_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        r.materialize("f.conf", "x", true).await.unwrap();
        r.withdraw("f.conf").await.unwrap();
        r.withdraw("f.conf").await.unwrap();

        assert!(!dir.path().join("sites-available/f.conf").exists());
    }

    #[tokio::test]
    async fn snapshot_and_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        r.materialize("f.conf", "original contents\n", true)
            .await
            .unwrap();
        let before = r.snapshot("f.conf").await.unwrap();

        r.materialize("f.conf", "broken contents\n", false)
            .await
            .unwrap();
        r.restore(&before).await.unwrap();

        let after = r.snapshot("f.conf").await.unwrap();
        assert_eq!(before, after);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sites-available/f.conf")).unwrap(),
            "original contents\n"
        );
    }

    #[tokio::test]
    async fn restore_of_absent_state_withdraws() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        let before = r.snapshot("f.conf").await.unwrap();
        assert!(before.contents.is_none());

        r.materialize("f.conf", "newly created\n", true).await.unwrap();
        r.restore(&before).await.unwrap();

        assert!(!dir.path().join("sites-available/f.conf").exists());
        assert!(std::fs::symlink_metadata(dir.path().join("sites-enabled/f.conf")).is_err());
    }

    #[tokio::test]
    async fn html_bodies() {
        let dir = TempDir::new().unwrap();
        let r = reconciler(&dir);

        r.write_html("nubi_error_404.html", "<h1>gone</h1>").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("html/nubi_error_404.html")).unwrap(),
            "<h1>gone</h1>"
        );
        r.remove_html("nubi_error_404.html").await.unwrap();
        r.remove_html("nubi_error_404.html").await.unwrap();
    }
}
