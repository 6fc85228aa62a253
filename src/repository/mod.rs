//! Repository layer for the target database.
//!
//! All target access uses Diesel with diesel-async over SQLite. The legacy
//! source is read separately through [`crate::source`].

pub mod context;
pub mod entities;
pub mod mappings;
pub mod models;
pub mod pool;

pub use context::DbContext;
pub use entities::DieselTargetRepository;
pub use mappings::DieselMappingStore;
pub use pool::{DbError, SqlitePool};
