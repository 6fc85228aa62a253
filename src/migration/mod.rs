//! The migration engine.
//!
//! - [`Importer`]: per-entity strategy, driven in batches by [`drive_records`]
//! - [`Orchestrator`]: dependency ordering, hard-dependency enforcement,
//!   completion checkpoints and secondary passes
//! - [`ImportContext`]: per-run resources (source, target gateway, mapping
//!   view, media) acquired at run start and flushed at run end
//! - [`MigrationResult`]: per-entity counters and itemized outcomes

mod config;
mod context;
mod dependency;
mod error;
mod importer;
mod orchestrator;
mod outcome;
mod registry;
mod reporter;
mod result;

pub use config::{MigrationConfig, DEFAULT_BATCH_SIZE, DEFAULT_DETAIL_LIMIT};
pub use context::{Backends, ImportContext};
pub use dependency::{Dependency, DependencyKind};
pub use error::{MigrationError, Result};
pub use importer::{drive_records, Importer, RecordWindow, SourceScan};
pub use orchestrator::{
    DependencyResolver, EntityState, EntityStatus, Orchestrator, RunReport, SecondaryPass,
};
pub use outcome::{OutcomeKind, RecordOutcome, SkipReason};
pub use registry::ImporterRegistry;
pub use reporter::{Reporter, TracingReporter};
pub use result::{DetailRecord, EntityCounters, MigrationResult};
