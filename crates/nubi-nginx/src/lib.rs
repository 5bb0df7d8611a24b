//! nginx integration for the Nubi control plane
//!
//! Four concerns, all driven by the orchestrator:
//!
//! - [`render`]: pure translation of state-store entities into nginx
//!   configuration fragments
//! - [`reconcile`]: atomic fragment writes and enabled-symlink activation
//! - [`supervisor`]: child-process invocations of the nginx binary
//! - [`stub_status`] / [`system`]: metric scrapes with graceful degradation
//! - [`access_log`]: combined-format access log parsing

pub mod access_log;
pub mod reconcile;
pub mod render;
pub mod stub_status;
pub mod supervisor;
pub mod system;

pub use reconcile::{FragmentState, Reconciler};
pub use render::{fragment_name, Renderer, DEFAULT_ROUTE_FRAGMENT};
pub use stub_status::{StubStatus, StubStatusClient};
pub use supervisor::{CommandOutput, Supervisor, SupervisorStatus};
pub use system::{NetworkCounters, SystemProbe};
