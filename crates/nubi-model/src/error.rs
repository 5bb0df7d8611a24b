//! Error taxonomy shared by every Nubi subsystem
//!
//! Callers switch on the variant; the API layer maps each kind to an HTTP
//! status. Only the orchestrator performs rollback, and only for
//! `ConfigInvalid`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input. Surfaced to the operator verbatim; no side effects.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An entity id did not resolve in the state store.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A uniqueness invariant was violated (duplicate domain or tag name).
    #[error("{0}")]
    Conflict(String),

    /// `nginx -t` rejected a generated fragment. The filesystem has been
    /// rolled back to its pre-mutation state.
    #[error("nginx rejected the generated configuration: {output}")]
    ConfigInvalid { output: String },

    /// `nginx -t` passed but `nginx -s reload` did not. State is committed;
    /// the caller may retry the reload independently.
    #[error("nginx reload failed: {output}")]
    ReloadFailed { output: String },

    /// Filesystem or scrape I/O failure.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any failure during ACME issuance or renewal.
    #[error("acme: {0}")]
    Acme(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound { .. } => "not_found",
            Error::Conflict(_) => "conflict",
            Error::ConfigInvalid { .. } => "config_invalid",
            Error::ReloadFailed { .. } => "reload_failed",
            Error::Transient(_) => "transient",
            Error::Acme(_) => "acme",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Transient(err.to_string())
    }
}
