//! Incident store and lifecycle engine.
//!
//! Owns the authoritative collection of incidents, gates every status change
//! through the fixed workflow (OPEN -> INVESTIGATING -> RESOLVED -> ARCHIVED ->
//! OPEN, plus OPEN -> ARCHIVED), and persists the full collection as one
//! snapshot after each accepted mutation.
//!
//! Single process owns the durable record; no multi-writer coordination.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod store;
pub mod transitions;
pub mod types;
pub mod validate;

pub use backend::{Backend, FileBackend, MemoryBackend, Snapshot};
pub use config::{Config, ConfigError, OnCorrupt};
pub use error::{StoreError, ValidationError};
pub use ingest::{ingest, IngestAborted, IngestSummary};
pub use store::IncidentStore;
pub use types::{Incident, IncidentId, NewIncident, RawIncident, Status};
pub use validate::ValidationRules;
