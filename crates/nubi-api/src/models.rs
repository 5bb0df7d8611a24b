//! Wire models for the operator surface
//!
//! The entity and event shapes come from `nubi-model`; this module adds
//! the request/response envelopes around them.

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use nubi_acme::dns::ProviderConfig;
use nubi_model::{Certificate, DefaultRoute, Error, HostSpec, ProxyHost};
use nubi_store::BulkTagAction;

/// Error body; `kind` is the stable taxonomy discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a taxonomy error onto an HTTP status plus displayable body.
pub fn into_api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::ConfigInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::ReloadFailed { .. } => StatusCode::BAD_GATEWAY,
        Error::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Acme(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostList {
    pub hosts: Vec<ProxyHost>,
    pub count: usize,
}

/// A mutated host plus the reload warning, when one applies
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostResponse {
    pub host: ProxyHost,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleHostRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceHostRequest {
    pub maintenance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub hosts: Vec<ProxyHost>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub hosts: Vec<HostSpec>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateList {
    pub certificates: Vec<Certificate>,
}

/// Certificate upload; PEM text travels in the JSON body
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadCertificateRequest {
    pub name: String,
    pub cert_pem: String,
    pub key_pem: String,
    #[serde(default)]
    pub auto_renew: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfSignedRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCertificateRequest {
    pub host_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCertificateResponse {
    pub hosts: Vec<ProxyHost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub domains: Vec<String>,
    pub dns_provider: ProviderConfig,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auto_renew: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewCertificateRequest {
    pub certificate_id: String,
    pub dns_provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    pub action: BulkTagAction,
    #[serde(default)]
    pub host_ids: Vec<String>,
    #[serde(default)]
    pub certificate_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRouteResponse {
    pub config: DefaultRoute,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetMaintenanceRequest {
    pub enabled: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxStatusResponse {
    pub running: bool,
    pub config_valid: bool,
    pub config_test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxMetricsResponse {
    pub nginx: nubi_nginx::StubStatus,
    pub nginx_uptime: i64,
    pub nginx_uptime_string: String,
    pub network: nubi_nginx::NetworkCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_covers_the_taxonomy() {
        let (status, body) = into_api_error(Error::Conflict("duplicate domain".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.kind, "conflict");

        let (status, _) = into_api_error(Error::not_found("proxy host", "x"));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = into_api_error(Error::ConfigInvalid {
            output: "nginx: [emerg]".into(),
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.error.contains("[emerg]"));
    }
}
