//! Default route and maintenance singletons
//!
//! The default route renders as nginx's `default_server` listener and always
//! carries the guarded stub_status location. Maintenance mode shadows it:
//! enabling saves the current route into a backup slot, disabling restores
//! the saved route.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Behavior of the catch-all `default_server` block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRouteMode {
    /// nginx built-in welcome page
    #[default]
    NginxDefault,
    /// Serve a custom HTML page
    CustomPage,
    /// Return a fixed error code
    ErrorCode,
    /// Reverse proxy to a backend
    Proxy,
    /// 302 redirect
    Redirect,
}

/// A custom error body for one status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPage {
    /// Status code, e.g. 404, 500, 502, 503
    pub code: u16,
    /// HTML body; empty means the code keeps nginx's built-in page
    #[serde(default)]
    pub custom_html: String,
}

/// The default-route singleton
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRoute {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: DefaultRouteMode,
    /// Proxy mode target URL
    #[serde(default)]
    pub target: String,
    /// Redirect mode destination
    #[serde(default)]
    pub redirect_url: String,
    /// Error-code mode status
    #[serde(default)]
    pub error_code: u16,
    /// Custom-page mode body
    #[serde(default)]
    pub custom_html: String,
    /// Per-code custom error bodies
    #[serde(default)]
    pub error_pages: Vec<ErrorPage>,
}

/// Saved state while maintenance mode shadows the default route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceBackup {
    /// Operator-supplied maintenance message
    #[serde(default)]
    pub message: String,
    /// The route to restore when maintenance is disabled, if one was active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<DefaultRoute>,
}
