//! Control plane: the orchestrator's reload barrier and the telemetry
//! fanout
//!
//! Every operation that must affect nginx flows through the
//! [`orchestrator::Orchestrator`], which serializes mutations against the
//! nginx child and rolls the filesystem back when a generated fragment
//! fails `nginx -t`. The [`fanout::Fanout`] carries typed events to
//! subscriber sinks; the [`telemetry::Telemetry`] timer feeds it.

pub mod fanout;
pub mod orchestrator;
pub mod telemetry;

pub use fanout::{Fanout, SinkId};
pub use orchestrator::{MutationOutcome, Orchestrator};
pub use telemetry::Telemetry;
