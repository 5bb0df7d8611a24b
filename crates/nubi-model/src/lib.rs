//! Core data model for the Nubi control plane
//!
//! Entities managed by the state store (proxy hosts, certificates, tags,
//! the default route and maintenance singletons), the input validation
//! rules applied at create/update boundaries, the closed error taxonomy,
//! and the subscriber event contracts.

pub mod certificate;
pub mod default_route;
pub mod error;
pub mod events;
pub mod host;
pub mod tag;
pub mod validate;

pub use certificate::{Certificate, CertificateSpec, CertProvenance, RenewalCandidate};
pub use default_route::{DefaultRoute, DefaultRouteMode, ErrorPage, MaintenanceBackup};
pub use error::{Error, Result};
pub use events::{Event, MaintenancePayload, MetricsPayload, NginxStatusPayload};
pub use host::{Backend, HostSpec, LbMethod, ProxyHost};
pub use tag::{Tag, TagSpec};
