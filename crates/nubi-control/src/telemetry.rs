//! Periodic telemetry scrape and broadcast
//!
//! A 5-second timer scrapes stub_status, the network counters and the
//! state store's maintenance flag, assembles the three typed events and
//! hands them to the fanout. Scrape failures zero-fill; the timer swallows
//! errors to keep its cadence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use nubi_model::{
    events::format_uptime, Event, MaintenancePayload, MetricsPayload, NginxStatusPayload,
};
use nubi_nginx::{StubStatus, StubStatusClient, Supervisor, SystemProbe};
use nubi_store::StateStore;

use crate::fanout::Fanout;

/// Cadence of the periodic broadcast.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// Assembles telemetry events from the scrape sources
pub struct Telemetry {
    store: Arc<StateStore>,
    supervisor: Arc<Supervisor>,
    stub_status: StubStatusClient,
    probe: SystemProbe,
    fanout: Arc<Fanout>,
    started_at: Instant,
}

impl Telemetry {
    pub fn new(
        store: Arc<StateStore>,
        supervisor: Arc<Supervisor>,
        stub_status: StubStatusClient,
        probe: SystemProbe,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            store,
            supervisor,
            stub_status,
            probe,
            fanout,
            started_at: Instant::now(),
        }
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Current nginx health as a broadcastable event.
    pub async fn nginx_status_event(&self) -> Event {
        let status = self.supervisor.status().await;
        Event::NginxStatus(NginxStatusPayload {
            running: status.running,
            config_valid: status.config_valid,
            version: status.version,
        })
    }

    /// Current maintenance-mode state as a broadcastable event.
    pub fn maintenance_event(&self) -> Event {
        let backup = self.store.maintenance_backup();
        Event::MaintenanceMode(MaintenancePayload {
            enabled: backup.is_some(),
            message: backup.map(|b| b.message).filter(|m| !m.is_empty()),
        })
    }

    /// stub_status counters, zero-filled when the scrape fails.
    pub async fn stub_counters(&self) -> StubStatus {
        match self.stub_status.scrape().await {
            Ok(stub) => stub,
            Err(e) => {
                debug!(error = %e, "stub_status scrape failed, zero-filling");
                StubStatus::default()
            }
        }
    }

    /// Interface counters, zero-filled when unavailable.
    pub async fn network_counters(&self) -> nubi_nginx::NetworkCounters {
        self.probe.network_counters().await
    }

    /// nginx master process uptime; `(0, "unknown")` when unreadable.
    pub async fn nginx_process_uptime(&self) -> (i64, String) {
        self.probe.nginx_uptime().await
    }

    /// Current metrics snapshot as a broadcastable event. Never fails;
    /// unavailable sources contribute zeroes.
    pub async fn metrics_event(&self) -> Event {
        let stub = self.stub_counters().await;
        let network = self.probe.network_counters().await;
        let uptime = self.started_at.elapsed().as_secs() as i64;

        Event::Metrics(MetricsPayload {
            active_connections: stub.active_connections,
            uptime,
            uptime_string: format_uptime(uptime),
            reading: stub.reading,
            writing: stub.writing,
            waiting: stub.waiting,
            rx_bytes: network.rx_bytes,
            tx_bytes: network.tx_bytes,
        })
    }

    /// The full snapshot a freshly connected subscriber receives.
    pub async fn snapshot_events(&self) -> Vec<Event> {
        vec![
            self.nginx_status_event().await,
            self.maintenance_event(),
            self.metrics_event().await,
        ]
    }

    /// One broadcast tick: nginx status plus metrics.
    pub async fn broadcast_tick(&self) {
        let status = self.nginx_status_event().await;
        let metrics = self.metrics_event().await;
        self.fanout.broadcast(status);
        self.fanout.broadcast(metrics);
    }

    /// Spawn the periodic broadcast loop.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.broadcast_tick().await;
            }
        })
    }
}
