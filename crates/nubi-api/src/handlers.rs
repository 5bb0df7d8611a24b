//! REST handlers over the orchestrator

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use nubi_acme::dns::{provider_catalog, ProviderInfo};
use nubi_model::{Certificate, CertificateSpec, DefaultRoute, MaintenancePayload, Tag, TagSpec};
use nubi_nginx::access_log;
use nubi_store::{BulkTagResult, ImportReport};

use crate::models::*;
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a reload-barrier mutation detached from the request, so a client
/// disconnect cannot cancel the sequence after fragments were written.
async fn detached<T, F>(fut: F) -> Result<T, nubi_model::Error>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, nubi_model::Error>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| nubi_model::Error::Transient(format!("mutation task failed: {e}")))?
}

// ---------------------------------------------------------------------
// Proxy hosts
// ---------------------------------------------------------------------

/// List all proxy hosts
#[utoipa::path(get, path = "/api/hosts",
    responses((status = 200, body = HostList)), tag = "hosts")]
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Json<HostList> {
    let hosts = state.orchestrator.store().list_hosts();
    let count = hosts.len();
    Json(HostList { hosts, count })
}

/// Get one proxy host
#[utoipa::path(get, path = "/api/hosts/{id}",
    responses((status = 200, body = HostResponse), (status = 404, body = ErrorResponse)),
    tag = "hosts")]
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<HostResponse> {
    let host = state.orchestrator.store().get_host(&id).map_err(into_api_error)?;
    Ok(Json(HostResponse {
        host,
        warning: None,
    }))
}

/// Create a proxy host
#[utoipa::path(post, path = "/api/hosts",
    responses((status = 201, body = HostResponse), (status = 422, body = ErrorResponse)),
    tag = "hosts")]
pub async fn create_host(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<nubi_model::HostSpec>,
) -> Result<(StatusCode, Json<HostResponse>), ApiError> {
    let outcome = detached(async move { state.orchestrator.create_host(spec).await })
        .await
        .map_err(into_api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(HostResponse {
            host: outcome.value,
            warning: outcome.warning,
        }),
    ))
}

/// Update a proxy host
#[utoipa::path(put, path = "/api/hosts/{id}",
    responses((status = 200, body = HostResponse), (status = 422, body = ErrorResponse)),
    tag = "hosts")]
pub async fn update_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(spec): Json<nubi_model::HostSpec>,
) -> ApiResult<HostResponse> {
    let outcome = detached(async move { state.orchestrator.update_host(&id, spec).await })
        .await
        .map_err(into_api_error)?;
    Ok(Json(HostResponse {
        host: outcome.value,
        warning: outcome.warning,
    }))
}

/// Delete a proxy host
#[utoipa::path(delete, path = "/api/hosts/{id}",
    responses((status = 200, body = HostResponse), (status = 404, body = ErrorResponse)),
    tag = "hosts")]
pub async fn delete_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<HostResponse> {
    let outcome = detached(async move { state.orchestrator.delete_host(&id).await })
        .await
        .map_err(into_api_error)?;
    Ok(Json(HostResponse {
        host: outcome.value,
        warning: outcome.warning,
    }))
}

/// Enable or disable a proxy host
#[utoipa::path(post, path = "/api/hosts/{id}/toggle",
    responses((status = 200, body = HostResponse)), tag = "hosts")]
pub async fn toggle_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ToggleHostRequest>,
) -> ApiResult<HostResponse> {
    let outcome = detached(async move { state.orchestrator.toggle_host(&id, req.enabled).await })
        .await
        .map_err(into_api_error)?;
    Ok(Json(HostResponse {
        host: outcome.value,
        warning: outcome.warning,
    }))
}

/// Toggle per-host maintenance mode
#[utoipa::path(post, path = "/api/hosts/{id}/maintenance",
    responses((status = 200, body = HostResponse)), tag = "hosts")]
pub async fn set_host_maintenance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MaintenanceHostRequest>,
) -> ApiResult<HostResponse> {
    let outcome = detached(async move {
        state
            .orchestrator
            .set_host_maintenance(&id, req.maintenance)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(HostResponse {
        host: outcome.value,
        warning: outcome.warning,
    }))
}

/// Export every host
#[utoipa::path(get, path = "/api/hosts/export",
    responses((status = 200, body = ExportResponse)), tag = "hosts")]
pub async fn export_hosts(State(state): State<Arc<AppState>>) -> Json<ExportResponse> {
    Json(ExportResponse {
        version: "1.0".to_string(),
        exported_at: Utc::now(),
        hosts: state.orchestrator.store().list_hosts(),
    })
}

/// Import hosts; same-domain entries are skipped unless overwrite is set
#[utoipa::path(post, path = "/api/hosts/import",
    responses((status = 200, body = ImportReport)), tag = "hosts")]
pub async fn import_hosts(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<ImportReport> {
    if req.hosts.is_empty() {
        return Err(into_api_error(nubi_model::Error::validation(
            "no hosts to import",
        )));
    }
    let outcome = detached(async move {
        state
            .orchestrator
            .import_hosts(req.hosts, req.overwrite)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(outcome.value))
}

// ---------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------

/// List all certificates
#[utoipa::path(get, path = "/api/certificates",
    responses((status = 200, body = CertificateList)), tag = "certificates")]
pub async fn list_certificates(State(state): State<Arc<AppState>>) -> Json<CertificateList> {
    Json(CertificateList {
        certificates: state.orchestrator.store().list_certificates(),
    })
}

/// Get one certificate
#[utoipa::path(get, path = "/api/certificates/{id}",
    responses((status = 200, body = Certificate), (status = 404, body = ErrorResponse)),
    tag = "certificates")]
pub async fn get_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Certificate> {
    let cert = state
        .orchestrator
        .store()
        .get_certificate(&id)
        .map_err(into_api_error)?;
    Ok(Json(cert))
}

/// Upload PEM certificate material
#[utoipa::path(post, path = "/api/certificates",
    responses((status = 201, body = Certificate), (status = 400, body = ErrorResponse)),
    tag = "certificates")]
pub async fn upload_certificate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadCertificateRequest>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let cert = state
        .orchestrator
        .upload_certificate(req.name, req.cert_pem, req.key_pem, req.auto_renew)
        .await
        .map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(cert)))
}

/// Update certificate metadata
#[utoipa::path(put, path = "/api/certificates/{id}",
    responses((status = 200, body = Certificate)), tag = "certificates")]
pub async fn update_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(spec): Json<CertificateSpec>,
) -> ApiResult<Certificate> {
    let cert = state
        .orchestrator
        .update_certificate(&id, spec)
        .await
        .map_err(into_api_error)?;
    Ok(Json(cert))
}

/// Delete a certificate; refused while a host references it
#[utoipa::path(delete, path = "/api/certificates/{id}",
    responses((status = 200, body = Certificate), (status = 409, body = ErrorResponse)),
    tag = "certificates")]
pub async fn delete_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Certificate> {
    let cert = state
        .orchestrator
        .delete_certificate(&id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(cert))
}

/// Bind a certificate to a set of hosts
#[utoipa::path(post, path = "/api/certificates/{id}/apply",
    responses((status = 200, body = ApplyCertificateResponse)), tag = "certificates")]
pub async fn apply_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApplyCertificateRequest>,
) -> ApiResult<ApplyCertificateResponse> {
    let outcome = detached(async move {
        state
            .orchestrator
            .apply_certificate(&id, &req.host_ids)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(ApplyCertificateResponse {
        hosts: outcome.value,
        warning: outcome.warning,
    }))
}

/// Generate a self-signed certificate for development
#[utoipa::path(post, path = "/api/certificates/self-signed",
    responses((status = 201, body = Certificate)), tag = "certificates")]
pub async fn create_self_signed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelfSignedRequest>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let cert = state
        .orchestrator
        .create_self_signed_certificate(req.name, req.domains)
        .await
        .map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(cert)))
}

// ---------------------------------------------------------------------
// Let's Encrypt
// ---------------------------------------------------------------------

/// Issue a certificate through the DNS-01 flow
#[utoipa::path(post, path = "/api/letsencrypt/issue",
    responses((status = 200, body = Certificate), (status = 502, body = ErrorResponse)),
    tag = "letsencrypt")]
pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueCertificateRequest>,
) -> ApiResult<Certificate> {
    let cert = detached(async move {
        state
            .orchestrator
            .issue_certificate(req.name, req.domains, req.dns_provider, req.auto_renew)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(cert))
}

/// Renew an ACME certificate in place
#[utoipa::path(post, path = "/api/letsencrypt/renew",
    responses((status = 200, body = Certificate), (status = 502, body = ErrorResponse)),
    tag = "letsencrypt")]
pub async fn renew_certificate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RenewCertificateRequest>,
) -> ApiResult<Certificate> {
    let outcome = detached(async move {
        state
            .orchestrator
            .renew_certificate(&req.certificate_id, req.dns_provider)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(outcome.value))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewalCheckResponse {
    pub needs_renewal: Vec<nubi_model::RenewalCandidate>,
    pub total: usize,
}

/// Report certificates inside the 30-day renewal window (read-only)
#[utoipa::path(get, path = "/api/letsencrypt/renewal-check",
    responses((status = 200, body = RenewalCheckResponse)), tag = "letsencrypt")]
pub async fn renewal_check(State(state): State<Arc<AppState>>) -> Json<RenewalCheckResponse> {
    let needs_renewal = state.orchestrator.store().renewal_candidates(Utc::now());
    let total = needs_renewal.len();
    Json(RenewalCheckResponse {
        needs_renewal,
        total,
    })
}

/// Supported DNS providers and their required configuration fields
#[utoipa::path(get, path = "/api/letsencrypt/providers",
    responses((status = 200, body = [ProviderInfo])), tag = "letsencrypt")]
pub async fn dns_providers() -> Json<Vec<ProviderInfo>> {
    Json(provider_catalog())
}

// ---------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------

/// List all tags
#[utoipa::path(get, path = "/api/tags",
    responses((status = 200, body = [Tag])), tag = "tags")]
pub async fn list_tags(State(state): State<Arc<AppState>>) -> Json<Vec<Tag>> {
    Json(state.orchestrator.store().list_tags())
}

/// Create a tag
#[utoipa::path(post, path = "/api/tags",
    responses((status = 201, body = Tag), (status = 409, body = ErrorResponse)), tag = "tags")]
pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<TagSpec>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state
        .orchestrator
        .create_tag(spec)
        .await
        .map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// Update a tag
#[utoipa::path(put, path = "/api/tags/{id}",
    responses((status = 200, body = Tag)), tag = "tags")]
pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(spec): Json<TagSpec>,
) -> ApiResult<Tag> {
    let tag = state
        .orchestrator
        .update_tag(&id, spec)
        .await
        .map_err(into_api_error)?;
    Ok(Json(tag))
}

/// Delete a tag, scrubbing it from every host and certificate
#[utoipa::path(delete, path = "/api/tags/{id}",
    responses((status = 200, body = MessageResponse)), tag = "tags")]
pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    state
        .orchestrator
        .delete_tag(&id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(MessageResponse {
        message: "tag deleted".to_string(),
    }))
}

/// Bulk add/remove a tag across hosts and certificates
#[utoipa::path(post, path = "/api/tags/{id}/bulk",
    responses((status = 200, body = BulkTagResult)), tag = "tags")]
pub async fn bulk_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<BulkTagRequest>,
) -> ApiResult<BulkTagResult> {
    let result = state
        .orchestrator
        .bulk_apply_tag(&id, req.action, &req.host_ids, &req.certificate_ids)
        .await
        .map_err(into_api_error)?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------
// Default route and maintenance
// ---------------------------------------------------------------------

/// Current default-route configuration
#[utoipa::path(get, path = "/api/route/default",
    responses((status = 200, body = DefaultRouteResponse)), tag = "route")]
pub async fn get_default_route(State(state): State<Arc<AppState>>) -> Json<DefaultRouteResponse> {
    Json(DefaultRouteResponse {
        config: state.orchestrator.store().default_route(),
        warning: None,
    })
}

/// Apply a default-route configuration
#[utoipa::path(post, path = "/api/route/default",
    responses((status = 200, body = DefaultRouteResponse), (status = 422, body = ErrorResponse)),
    tag = "route")]
pub async fn set_default_route(
    State(state): State<Arc<AppState>>,
    Json(mut route): Json<DefaultRoute>,
) -> ApiResult<DefaultRouteResponse> {
    route.enabled = true;
    let outcome = detached(async move { state.orchestrator.set_default_route(route).await })
        .await
        .map_err(into_api_error)?;
    Ok(Json(DefaultRouteResponse {
        config: outcome.value,
        warning: outcome.warning,
    }))
}

/// Disable the default route
#[utoipa::path(delete, path = "/api/route/default",
    responses((status = 200, body = DefaultRouteResponse)), tag = "route")]
pub async fn delete_default_route(
    State(state): State<Arc<AppState>>,
) -> ApiResult<DefaultRouteResponse> {
    let outcome = detached(async move { state.orchestrator.disable_default_route().await })
        .await
        .map_err(into_api_error)?;
    Ok(Json(DefaultRouteResponse {
        config: outcome.value,
        warning: outcome.warning,
    }))
}

/// Current global maintenance state
#[utoipa::path(get, path = "/api/maintenance",
    responses((status = 200, body = MaintenancePayload)), tag = "maintenance")]
pub async fn get_maintenance(State(state): State<Arc<AppState>>) -> Json<MaintenancePayload> {
    Json(state.orchestrator.maintenance_state())
}

/// Enable or disable global maintenance mode
#[utoipa::path(post, path = "/api/maintenance",
    responses((status = 200, body = MaintenancePayload)), tag = "maintenance")]
pub async fn set_maintenance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetMaintenanceRequest>,
) -> ApiResult<MaintenancePayload> {
    let outcome = detached(async move {
        state
            .orchestrator
            .set_maintenance(req.enabled, req.message)
            .await
    })
    .await
    .map_err(into_api_error)?;
    Ok(Json(outcome.value))
}

// ---------------------------------------------------------------------
// nginx
// ---------------------------------------------------------------------

/// nginx health summary
#[utoipa::path(get, path = "/api/nginx/status",
    responses((status = 200, body = NginxStatusResponse)), tag = "nginx")]
pub async fn nginx_status(State(state): State<Arc<AppState>>) -> Json<NginxStatusResponse> {
    let status = state.orchestrator.nginx_status().await;
    Json(NginxStatusResponse {
        running: status.running,
        config_valid: status.config_valid,
        config_test: status.config_test,
        version: status.version,
    })
}

/// Trigger an nginx reload
#[utoipa::path(post, path = "/api/nginx/reload",
    responses((status = 200, body = MessageResponse), (status = 502, body = ErrorResponse)),
    tag = "nginx")]
pub async fn nginx_reload(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    state
        .orchestrator
        .reload_nginx()
        .await
        .map_err(into_api_error)?;
    Ok(Json(MessageResponse {
        message: "nginx reload triggered".to_string(),
    }))
}

/// Run `nginx -t` and return the diagnostic output
#[utoipa::path(post, path = "/api/nginx/test",
    responses((status = 200, body = MessageResponse), (status = 502, body = ErrorResponse)),
    tag = "nginx")]
pub async fn nginx_test(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    let out = state
        .orchestrator
        .test_config()
        .await
        .map_err(into_api_error)?;
    Ok(Json(MessageResponse { message: out.output }))
}

/// Current nginx and interface metrics
#[utoipa::path(get, path = "/api/nginx/metrics",
    responses((status = 200, body = NginxMetricsResponse)), tag = "nginx")]
pub async fn nginx_metrics(State(state): State<Arc<AppState>>) -> Json<NginxMetricsResponse> {
    let telemetry = state.orchestrator.telemetry();
    let nginx = telemetry.stub_counters().await;
    let network = telemetry.network_counters().await;
    let (nginx_uptime, nginx_uptime_string) = telemetry.nginx_process_uptime().await;
    Json(NginxMetricsResponse {
        nginx,
        nginx_uptime,
        nginx_uptime_string,
        network,
    })
}

// ---------------------------------------------------------------------
// Access logs
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RecentLogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentLogsResponse {
    pub logs: Vec<access_log::AccessLogRecord>,
    pub total: usize,
}

/// Most recent access-log entries, newest first
#[utoipa::path(get, path = "/api/logs/recent",
    responses((status = 200, body = RecentLogsResponse)), tag = "logs")]
pub async fn recent_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentLogsQuery>,
) -> Json<RecentLogsResponse> {
    let limit = query.limit.unwrap_or(50).min(500);
    debug!(limit, "tailing access log");
    let logs = access_log::tail(&state.access_log, limit).await;
    let total = logs.len();
    Json(RecentLogsResponse { logs, total })
}

/// Aggregate access-log statistics
#[utoipa::path(get, path = "/api/logs/stats",
    responses((status = 200, body = access_log::AccessLogStats)), tag = "logs")]
pub async fn log_stats(State(state): State<Arc<AppState>>) -> Json<access_log::AccessLogStats> {
    Json(access_log::stats(&state.access_log, 100).await)
}
