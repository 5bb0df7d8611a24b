//! Operator surface: REST routes plus the WebSocket event stream
//!
//! The surface is a thin shell over the orchestrator; every mutation is
//! delegated, and the error taxonomy maps onto HTTP statuses in one place.

pub mod handlers;
pub mod models;
pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use nubi_control::Orchestrator;

/// Shared handler state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// nginx access log tailed by the log endpoints
    pub access_log: PathBuf,
}

/// Build the full router.
///
/// `static_dir`, when set, serves the operator UI assets; the daemon works
/// headless without it.
pub fn build_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/hosts", get(handlers::list_hosts).post(handlers::create_host))
        .route("/api/hosts/export", get(handlers::export_hosts))
        .route("/api/hosts/import", post(handlers::import_hosts))
        .route(
            "/api/hosts/{id}",
            get(handlers::get_host)
                .put(handlers::update_host)
                .delete(handlers::delete_host),
        )
        .route("/api/hosts/{id}/toggle", post(handlers::toggle_host))
        .route(
            "/api/hosts/{id}/maintenance",
            post(handlers::set_host_maintenance),
        )
        .route(
            "/api/certificates",
            get(handlers::list_certificates).post(handlers::upload_certificate),
        )
        .route(
            "/api/certificates/self-signed",
            post(handlers::create_self_signed),
        )
        .route(
            "/api/certificates/{id}",
            get(handlers::get_certificate)
                .put(handlers::update_certificate)
                .delete(handlers::delete_certificate),
        )
        .route(
            "/api/certificates/{id}/apply",
            post(handlers::apply_certificate),
        )
        .route("/api/letsencrypt/issue", post(handlers::issue_certificate))
        .route("/api/letsencrypt/renew", post(handlers::renew_certificate))
        .route(
            "/api/letsencrypt/renewal-check",
            get(handlers::renewal_check),
        )
        .route("/api/letsencrypt/providers", get(handlers::dns_providers))
        .route("/api/tags", get(handlers::list_tags).post(handlers::create_tag))
        .route(
            "/api/tags/{id}",
            axum::routing::put(handlers::update_tag).delete(handlers::delete_tag),
        )
        .route("/api/tags/{id}/bulk", post(handlers::bulk_tag))
        .route(
            "/api/route/default",
            get(handlers::get_default_route)
                .post(handlers::set_default_route)
                .delete(handlers::delete_default_route),
        )
        .route(
            "/api/maintenance",
            get(handlers::get_maintenance).post(handlers::set_maintenance),
        )
        .route("/api/nginx/status", get(handlers::nginx_status))
        .route("/api/nginx/reload", post(handlers::nginx_reload))
        .route("/api/nginx/test", post(handlers::nginx_test))
        .route("/api/nginx/metrics", get(handlers::nginx_metrics))
        .route("/api/logs/recent", get(handlers::recent_logs))
        .route("/api/logs/stats", get(handlers::log_stats))
        .route("/ws", get(ws::handle_ws))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    router.layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
) -> std::io::Result<()> {
    let router = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "operator surface listening");
    axum::serve(listener, router).await
}
