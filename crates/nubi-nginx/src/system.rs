//! Platform readers for process uptime and interface counters
//!
//! Everything here degrades gracefully: a missing pidfile, stat file or
//! interface yields zeroed fields (or "unknown" for the uptime string),
//! never an error. Wrong numbers are worse than absent ones.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use utoipa::ToSchema;

use nubi_model::events::format_uptime;

/// Jiffies per second; Linux reports process start time in clock ticks.
const CLOCK_TICKS: i64 = 100;

/// RX/TX totals for one network interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCounters {
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub rx_packets: i64,
    pub tx_packets: i64,
}

/// Reads /proc for nginx process uptime and interface counters
#[derive(Debug, Clone)]
pub struct SystemProbe {
    proc_root: PathBuf,
    pidfile: PathBuf,
    interface: String,
}

impl SystemProbe {
    pub fn new(pidfile: impl Into<PathBuf>, interface: impl Into<String>) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            pidfile: pidfile.into(),
            interface: interface.into(),
        }
    }

    #[cfg(test)]
    fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// nginx master process uptime in seconds plus a human-readable form.
    ///
    /// Returns `(0, "unknown")` whenever any input is unavailable.
    pub async fn nginx_uptime(&self) -> (i64, String) {
        match self.read_uptime().await {
            Some(seconds) => (seconds, format_uptime(seconds)),
            None => (0, "unknown".to_string()),
        }
    }

    async fn read_uptime(&self) -> Option<i64> {
        let pid = fs::read_to_string(&self.pidfile).await.ok()?;
        let pid = pid.trim();
        if pid.is_empty() {
            return None;
        }

        let stat = fs::read_to_string(self.proc_root.join(pid).join("stat"))
            .await
            .ok()?;
        let start_ticks = stat_start_time(&stat)?;

        let uptime_file = fs::read_to_string(self.proc_root.join("uptime")).await.ok()?;
        let system_uptime = uptime_file
            .split_whitespace()
            .next()?
            .parse::<f64>()
            .ok()? as i64;

        let process_uptime = system_uptime - start_ticks / CLOCK_TICKS;
        Some(process_uptime.max(0))
    }

    /// RX/TX byte and packet totals for the configured interface.
    ///
    /// Zeroed counters when the file or interface is missing.
    pub async fn network_counters(&self) -> NetworkCounters {
        let contents = match fs::read_to_string(self.proc_root.join("net/dev")).await {
            Ok(c) => c,
            Err(_) => return NetworkCounters::default(),
        };

        let prefix = format!("{}:", self.interface);
        for line in contents.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix(&prefix) else {
                continue;
            };

            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() < 10 {
                return NetworkCounters::default();
            }

            return NetworkCounters {
                rx_bytes: fields[0].parse().unwrap_or(0),
                rx_packets: fields[1].parse().unwrap_or(0),
                tx_bytes: fields[8].parse().unwrap_or(0),
                tx_packets: fields[9].parse().unwrap_or(0),
            };
        }

        NetworkCounters::default()
    }
}

/// Field 22 of /proc/<pid>/stat (start time in jiffies).
///
/// The comm field may contain spaces and parentheses, so parsing starts
/// after the last `)`.
fn stat_start_time(stat: &str) -> Option<i64> {
    let (_, rest) = stat.rsplit_once(')')?;
    // rest begins at field 3 (state); start_time is field 22.
    rest.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NET_DEV: &str = "Inter-|   Receive                                                |  Transmit\n face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    lo: 1000 10 0 0 0 0 0 0 1000 10 0 0 0 0 0 0\n  eth0: 123456 100 0 0 0 0 0 0 654321 200 0 0 0 0 0 0\n";

    fn probe(dir: &TempDir) -> SystemProbe {
        SystemProbe::new(dir.path().join("nginx.pid"), "eth0")
            .with_proc_root(dir.path().join("proc"))
    }

    #[test]
    fn stat_start_time_skips_comm_with_spaces() {
        // 52 fields total; start_time (field 22) is 44400.
        let stat = "1234 (nginx: master) S 1 1234 1234 0 -1 4194560 100 0 0 0 5 3 0 0 20 0 1 0 44400 10000000 250 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        assert_eq!(stat_start_time(stat), Some(44_400));
    }

    #[tokio::test]
    async fn uptime_unknown_without_pidfile() {
        let dir = TempDir::new().unwrap();
        let (seconds, human) = probe(&dir).nginx_uptime().await;
        assert_eq!(seconds, 0);
        assert_eq!(human, "unknown");
    }

    #[tokio::test]
    async fn uptime_computed_from_proc() {
        let dir = TempDir::new().unwrap();
        let proc_dir = dir.path().join("proc/4242");
        std::fs::create_dir_all(&proc_dir).unwrap();

        std::fs::write(dir.path().join("nginx.pid"), "4242\n").unwrap();
        // Started at tick 100000 = second 1000; system is at second 5000.
        std::fs::write(
            proc_dir.join("stat"),
            "4242 (nginx) S 1 1 1 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 100000 0 0 0",
        )
        .unwrap();
        std::fs::write(dir.path().join("proc/uptime"), "5000.12 9000.00\n").unwrap();

        let (seconds, human) = probe(&dir).nginx_uptime().await;
        assert_eq!(seconds, 4_000);
        assert_eq!(human, format_uptime(4_000));
    }

    #[tokio::test]
    async fn network_counters_for_named_interface() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proc/net")).unwrap();
        std::fs::write(dir.path().join("proc/net/dev"), NET_DEV).unwrap();

        let counters = probe(&dir).network_counters().await;
        assert_eq!(
            counters,
            NetworkCounters {
                rx_bytes: 123_456,
                rx_packets: 100,
                tx_bytes: 654_321,
                tx_packets: 200,
            }
        );
    }

    #[tokio::test]
    async fn missing_interface_zero_fills() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proc/net")).unwrap();
        std::fs::write(dir.path().join("proc/net/dev"), "    lo: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n").unwrap();

        let counters = probe(&dir).network_counters().await;
        assert_eq!(counters, NetworkCounters::default());
    }
}
