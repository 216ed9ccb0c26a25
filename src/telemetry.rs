//! Telemetry for governance decisions.
//!
//! Every component reports its decisions as a [`GovernanceEvent`] delivered to an
//! injectable [`TelemetrySink`]. The default sink discards events; `LogSink`
//! forwards them to `tracing`, `MemorySink` keeps them for inspection, and
//! `StreamingSink` fans them out to subscribers.
//!
//! # Event Types
//!
//! - **Throttle**: `Allowed`, `Denied`, `Swept`
//! - **Quota**: `Denied`, `Unavailable`, `RolledOver`, `Lapsed`, `Committed`, `Upgraded`
//! - **Selection**: `Picked`
//! - **Generation**: `Succeeded`, `Failed`, `TimedOut`

pub mod events;
pub mod sinks;

#[cfg(feature = "telemetry-json")]
pub use events::event_to_json;
pub use events::{GenerationEvent, GovernanceEvent, QuotaEvent, SelectionEvent, ThrottleEvent};
pub use sinks::{LogSink, MemorySink, NullSink, StreamingSink, TelemetrySink};
