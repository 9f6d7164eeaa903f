//! Herald ingestion router.
//!
//! Takes raw messages from many relay connections, drops the duplicates and
//! the noise, and hands each matching event to a delivery sink exactly once.
//!
//! # Modules
//!
//! - [`dedupe`] - bounded FIFO cache of seen event IDs
//! - [`queue`] - bounded ingest queue with drop-oldest overflow
//! - [`dispatch`] - single-consumer batch dispatch loop
//! - [`pipeline`] - validation, filtering and delivery URI construction
//! - [`registry`] - collaborator traits and in-memory implementations
//! - [`diagnostics`] - non-blocking observability channel
//! - [`router`] - facade tying it all together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Relay sockets   │  (one producer per connection)
//! └────────┬────────┘
//!          │ Router::submit
//!          ▼
//! ┌─────────────────┐
//! │  IngestQueue    │  bounded, drop-oldest
//! └────────┬────────┘
//!          │ Dispatcher (one loop, batches of 10)
//!          ▼
//! ┌─────────────────┐
//! │    Pipeline     │  parse → registry checks → validate → DedupeCache
//! └────────┬────────┘        → exclusions → keywords → delivery URI
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  DeliverySink   │
//! └─────────────────┘
//! ```

pub mod config;
pub mod dedupe;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod router;
pub mod unmatched;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root
pub use config::RouterConfig;
pub use dedupe::{DedupeCache, DedupeStats};
pub use diagnostics::{DiagnosticEvent, Diagnostics, DiagnosticsWorker};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{Error, Result};
pub use pipeline::{DropReason, Outcome, Pipeline, PipelineConfig, PipelineDeps};
pub use queue::{IngestQueue, QueuedMessage};
pub use registry::{
    Configuration, ConfigurationRegistry, DeliverySink, EventFilter, LogSink,
    MemoryConfigurationRegistry, MemorySubscriptionRegistry, RecordingSink, SubscriptionRegistry,
};
pub use router::{Collaborators, Router};
pub use unmatched::{UnmatchedSignal, UnmatchedTracker};
