//! community-migrate - batch migration of a legacy community platform.
//!
//! Moves users, groups, forums, topics, posts, blogs, comments, products,
//! subscriptions and orders from a read-only legacy database into the schema
//! of a new application. The interesting part is the migration engine:
//!
//! - [`migration::Importer`] implementations (one per entity type, see
//!   [`importers`]) stream their legacy table in bounded batches and turn each
//!   row into a migrated, skipped or failed outcome.
//! - [`migration::Orchestrator`] orders importers by their declared
//!   dependencies and refuses to run one whose hard dependencies are not
//!   complete.
//! - [`mapping::IdentifierMap`] is the only channel through which importers
//!   resolve foreign keys created by other importers.

pub mod config;
pub mod importers;
pub mod mapping;
pub mod media;
pub mod migration;
pub mod repository;
pub mod schema;
pub mod source;
pub mod target;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use migration::{
    Backends, Dependency, DependencyKind, EntityStatus, ImportContext, Importer, ImporterRegistry,
    MigrationConfig, MigrationError, MigrationResult, Orchestrator, RecordOutcome, Reporter,
    RunReport, SkipReason,
};
