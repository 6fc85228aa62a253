//! The destination schema and its persistence boundary.
//!
//! Importers build fully-populated [`TargetEntity`] values and hand every
//! write to a [`TargetRepository`]. The SQLite-backed implementation lives in
//! [`crate::repository`]; [`MemoryTargetRepository`] serves tests and the
//! dry-run shadow.

mod gateway;
mod memory;
pub mod models;

pub use gateway::{TargetGateway, DRY_RUN_ID_BASE};
pub use memory::MemoryTargetRepository;
pub use models::{legacy_key, EntityKind, TargetEntity, TargetId};

use async_trait::async_trait;

/// Result type for target operations.
pub type TargetResult<T> = Result<T, TargetError>;

/// Errors from the target repository.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{kind} conflicts with an existing entity on {field} '{value}'")]
    Conflict {
        kind: EntityKind,
        field: &'static str,
        value: String,
    },
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: TargetId },
    #[error("Cannot change {0} into a different kind of entity")]
    KindMismatch(EntityKind),
}

impl From<diesel::ConnectionError> for TargetError {
    fn from(e: diesel::ConnectionError) -> Self {
        TargetError::Connection(e.to_string())
    }
}

/// How to find an existing entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// Email, blog slug or SKU, depending on kind.
    NaturalKey(String),
    /// The `"<table>:<id>"` provenance marker.
    Legacy(String),
    Slug(String),
}

/// Per-entity create/find operations on the destination schema.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn find(&self, kind: EntityKind, lookup: &Lookup) -> TargetResult<Option<TargetId>>;

    async fn get(&self, kind: EntityKind, id: TargetId) -> TargetResult<Option<TargetEntity>>;

    /// Insert and return the new id. Unique natural keys and slugs are
    /// enforced per kind.
    async fn create(&self, entity: &TargetEntity) -> TargetResult<TargetId>;

    /// Insert `parent` and then each child attached to it (see
    /// [`TargetEntity::attach_to`]) as a single unit: either every entity is
    /// written or none is. Returns the parent id and the child ids in order.
    async fn create_with_children(
        &self,
        parent: &TargetEntity,
        children: &[TargetEntity],
    ) -> TargetResult<(TargetId, Vec<TargetId>)>;

    /// Replace an existing entity of the same kind.
    async fn update(&self, id: TargetId, entity: &TargetEntity) -> TargetResult<()>;

    async fn count(&self, kind: EntityKind) -> TargetResult<u64>;
}
