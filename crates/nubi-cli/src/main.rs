//! nubid - the Nubi control-plane daemon
//!
//! Wires the state store, renderer, reconciler, nginx supervisor, ACME
//! agent and telemetry fanout together, reconciles persisted state with
//! the filesystem, then serves the operator surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nubi_acme::{AcmeAgent, AcmeConfig};
use nubi_api::AppState;
use nubi_control::{telemetry::BROADCAST_INTERVAL, Fanout, Orchestrator, Telemetry};
use nubi_nginx::{Reconciler, Renderer, StubStatusClient, Supervisor, SystemProbe};
use nubi_store::StateStore;

/// Nubi - nginx control-plane daemon
#[derive(Parser, Debug)]
#[command(name = "nubid")]
#[command(about = "Manage a local nginx reverse-proxy deployment", long_about = None)]
struct Cli {
    /// HTTP listen address (`:8080` binds all interfaces)
    #[arg(long, default_value = ":8080", env = "NUBI_ADDR")]
    addr: String,

    /// Path to static UI assets; headless when omitted
    #[arg(long = "static")]
    static_dir: Option<PathBuf>,

    /// Path to the nginx binary (defaults to looking it up on PATH)
    #[arg(long)]
    nginx_bin: Option<String>,

    /// nginx master pidfile
    #[arg(long, default_value = "/run/nginx.pid")]
    nginx_pidfile: PathBuf,

    /// Data directory for persisted state and certificate material
    #[arg(long, default_value = "/var/lib/nubi", env = "NUBI_DATA_DIR")]
    data_dir: PathBuf,

    /// nginx sites-available directory
    #[arg(long, default_value = "/etc/nginx/sites-available")]
    sites_available: PathBuf,

    /// nginx sites-enabled directory
    #[arg(long, default_value = "/etc/nginx/sites-enabled")]
    sites_enabled: PathBuf,

    /// stub_status scrape URL
    #[arg(long, default_value = "http://127.0.0.1:80/.nubi/status")]
    stub_status_url: String,

    /// Network interface for RX/TX counters
    #[arg(long, default_value = "eth0")]
    interface: String,

    /// nginx access log tailed by the log endpoints
    #[arg(long, default_value = "/var/log/nginx/access.log")]
    access_log: PathBuf,

    /// Contact email for ACME registration
    #[arg(long, default_value = "", env = "NUBI_ACME_EMAIL")]
    acme_email: String,

    /// Use the Let's Encrypt staging environment
    #[arg(long, env = "NUBI_ACME_STAGING")]
    acme_staging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let addr = parse_listen_addr(&cli.addr)
        .with_context(|| format!("invalid listen address: {}", cli.addr))?;

    let html_dir = cli.data_dir.join("html");
    let store = Arc::new(StateStore::load(&cli.data_dir));
    let renderer = Renderer::new(html_dir.to_string_lossy().into_owned());
    let reconciler = Reconciler::new(&cli.sites_available, &cli.sites_enabled, &html_dir);
    let supervisor = Arc::new(Supervisor::new(
        cli.nginx_bin.clone(),
        Some(cli.nginx_pidfile.clone()),
    ));
    let acme = Arc::new(AcmeAgent::new(AcmeConfig {
        contact_email: cli.acme_email.clone(),
        use_staging: cli.acme_staging,
        certs_dir: cli.data_dir.join("certs"),
    }));

    let fanout = Arc::new(Fanout::new());
    let telemetry = Arc::new(Telemetry::new(
        store.clone(),
        supervisor.clone(),
        StubStatusClient::new(Some(cli.stub_status_url.clone())),
        SystemProbe::new(cli.nginx_pidfile.clone(), cli.interface.clone()),
        fanout.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        renderer,
        reconciler,
        supervisor,
        acme,
        telemetry.clone(),
    ));

    // Bring the nginx config tree in line with persisted state before
    // accepting operator traffic.
    match orchestrator.reconcile_startup().await {
        Ok(None) => {}
        Ok(Some(warning)) => warn!(warning = %warning, "startup reconciliation incomplete"),
        Err(e) => warn!(error = %e, "startup reconciliation failed"),
    }

    telemetry.clone().spawn(BROADCAST_INTERVAL);

    let state = Arc::new(AppState {
        orchestrator,
        access_log: cli.access_log.clone(),
    });

    info!(addr = %addr, "starting nubid");
    nubi_api::serve(addr, state, cli.static_dir.clone())
        .await
        .context("http server failed")?;

    Ok(())
}

/// Accept `:8080` shorthand alongside full `host:port` addresses.
fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    Ok(full.parse()?)
}
