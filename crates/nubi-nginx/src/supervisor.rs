//! Child-process supervision of the nginx binary
//!
//! Every invocation carries a 5-second deadline. Combined stdout/stderr is
//! always returned so callers can surface nginx's own diagnostic text, even
//! on failure.

use std::path::PathBuf;
use std::time::Duration;

use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use nubi_model::{Error, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BINARY: &str = "nginx";
const DEFAULT_PIDFILE: &str = "/run/nginx.pid";

/// Result of one nginx invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    /// Trimmed combined stdout + stderr
    pub output: String,
}

/// Aggregated health record for the status surface
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    /// Master process is alive (pidfile resolves to a live process)
    pub running: bool,
    /// `nginx -t` passed
    pub config_valid: bool,
    /// Raw `nginx -t` output
    pub config_test: String,
    /// `nginx -v` output, when the binary answered
    pub version: Option<String>,
}

/// Thin wrapper around the nginx binary
#[derive(Debug, Clone)]
pub struct Supervisor {
    binary: String,
    pidfile: PathBuf,
}

impl Supervisor {
    /// Create a supervisor, falling back to `nginx` on PATH and the
    /// conventional pidfile location when unset.
    pub fn new(binary: Option<String>, pidfile: Option<PathBuf>) -> Self {
        let binary = match binary {
            Some(b) if !b.trim().is_empty() => b,
            _ => DEFAULT_BINARY.to_string(),
        };
        Self {
            binary,
            pidfile: pidfile.unwrap_or_else(|| PathBuf::from(DEFAULT_PIDFILE)),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let result = timeout(
            COMMAND_TIMEOUT,
            Command::new(&self.binary).args(args).output(),
        )
        .await
        .map_err(|_| Error::Transient(format!("nginx {} timed out", args.join(" "))))?;

        let output = result
            .map_err(|e| Error::Transient(format!("failed to invoke {}: {e}", self.binary)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        debug!(
            binary = %self.binary,
            args = ?args,
            success = output.status.success(),
            "nginx invocation finished"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            output: combined,
        })
    }

    /// Run `nginx -t` and return the combined diagnostic output.
    pub async fn validate(&self) -> Result<CommandOutput> {
        self.run(&["-t"]).await
    }

    /// Ask nginx to reload its configuration.
    pub async fn reload(&self) -> Result<CommandOutput> {
        self.run(&["-s", "reload"]).await
    }

    /// Return the nginx version string.
    pub async fn version(&self) -> Result<CommandOutput> {
        self.run(&["-v"]).await
    }

    /// True when the pidfile names a live process.
    pub async fn is_running(&self) -> bool {
        let pid = match fs::read_to_string(&self.pidfile).await {
            Ok(contents) => contents.trim().to_string(),
            Err(_) => return false,
        };
        if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        fs::metadata(format!("/proc/{pid}")).await.is_ok()
    }

    /// Collect config-test, version and liveness into one record.
    ///
    /// Never fails: invocation errors degrade to `config_valid = false`
    /// with the error text as diagnostic.
    pub async fn status(&self) -> SupervisorStatus {
        let running = self.is_running().await;

        let (config_valid, config_test) = match self.validate().await {
            Ok(out) => (out.success, out.output),
            Err(e) => {
                warn!(error = %e, "nginx config test unavailable");
                (false, e.to_string())
            }
        };

        let version = match self.version().await {
            Ok(out) if !out.output.is_empty() => Some(out.output),
            _ => None,
        };

        SupervisorStatus {
            running,
            config_valid,
            config_test,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn fake_nginx(dir: &TempDir, script: &str) -> String {
        let path = dir.path().join("nginx");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        writeln!(f, "{script}").unwrap();
        drop(f);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn validate_reports_success_and_output() {
        let dir = TempDir::new().unwrap();
        let bin = fake_nginx(&dir, r#"echo "nginx: configuration file test is successful""#);
        let sup = Supervisor::new(Some(bin), None);

        let out = sup.validate().await.unwrap();
        assert!(out.success);
        assert!(out.output.contains("successful"));
    }

    #[tokio::test]
    async fn validate_surfaces_diagnostics_on_failure() {
        let dir = TempDir::new().unwrap();
        let bin = fake_nginx(
            &dir,
            r#"echo "nginx: [emerg] unknown directive" >&2; exit 1"#,
        );
        let sup = Supervisor::new(Some(bin), None);

        let out = sup.validate().await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("unknown directive"));
    }

    #[tokio::test]
    async fn missing_binary_is_transient() {
        let sup = Supervisor::new(Some("/nonexistent/nginx".into()), None);
        let err = sup.validate().await.unwrap_err();
        assert_eq!(err.kind(), "transient");
    }

    #[tokio::test]
    async fn is_running_checks_pidfile_liveness() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("nginx.pid");

        // No pidfile at all.
        let sup = Supervisor::new(None, Some(pidfile.clone()));
        assert!(!sup.is_running().await);

        // Pidfile naming this test process, which is certainly alive.
        std::fs::write(&pidfile, format!("{}\n", std::process::id())).unwrap();
        assert!(sup.is_running().await);

        // Garbage pid.
        std::fs::write(&pidfile, "not-a-pid").unwrap();
        assert!(!sup.is_running().await);
    }

    #[tokio::test]
    async fn status_aggregates_without_failing() {
        let dir = TempDir::new().unwrap();
        let bin = fake_nginx(&dir, r#"echo "nginx version: nginx/1.24.0" >&2"#);
        let sup = Supervisor::new(Some(bin), Some(dir.path().join("missing.pid")));

        let status = sup.status().await;
        assert!(!status.running);
        assert!(status.config_valid);
        assert_eq!(status.version.as_deref(), Some("nginx version: nginx/1.24.0"));
    }
}
