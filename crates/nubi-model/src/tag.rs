//! Tags for grouping hosts and certificates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A tag referenced by id from host and certificate tag sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    /// Display name, unique across all tags
    pub name: String,
    /// Hex presentation color for the UI
    #[serde(default)]
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for tag create/update
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagSpec {
    pub name: String,
    #[serde(default)]
    pub color: String,
}
