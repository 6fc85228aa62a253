//! Errors raised by the migration engine.

use crate::mapping::MappingError;
use crate::media::MediaError;
use crate::source::SourceError;
use crate::target::TargetError;

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors from orchestration and record processing.
///
/// Inside the batch driver every variant is caught per row and recorded as a
/// failed outcome; only the orchestration variants (unmet or cyclic
/// dependencies, unknown entities, invalid configuration) escape a run.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Cannot import {entity}: required dependency '{dependency}' has not completed ({reason})")]
    UnmetDependency {
        entity: String,
        dependency: String,
        reason: String,
    },
    #[error("Dependency cycle among required importers: {}", .entities.join(" -> "))]
    DependencyCycle { entities: Vec<String> },
    #[error("Importer '{entity}' depends on unknown importer '{dependency}'")]
    UnknownDependency { entity: String, dependency: String },
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("Importer '{0}' is registered twice")]
    DuplicateImporter(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Target error: {0}")]
    Target(#[from] TargetError),
    #[error("Mapping store error: {0}")]
    Mapping(#[from] MappingError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}
