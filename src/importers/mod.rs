//! One importer per legacy entity type.
//!
//! Each importer reads one legacy table, resolves foreign keys only through
//! the identifier map, and declares the importers it depends on. The
//! orchestrator decides the order; nothing here calls another importer.

pub mod blogs;
pub mod comments;
pub mod forums;
pub mod groups;
pub mod orders;
pub mod posts;
pub mod product_categories;
pub mod products;
pub mod subscriptions;
pub mod topics;
pub mod users;

use std::sync::Arc;

pub use blogs::BlogImporter;
pub use comments::CommentImporter;
pub use forums::ForumImporter;
pub use groups::GroupImporter;
pub use orders::OrderImporter;
pub use posts::PostImporter;
pub use product_categories::ProductCategoryImporter;
pub use products::ProductImporter;
pub use subscriptions::SubscriptionImporter;
pub use topics::TopicImporter;
pub use users::UserImporter;

use crate::migration::{ImporterRegistry, MigrationError, Result};
use crate::target::{legacy_key, Lookup};
use crate::utils::PriceError;

/// Registry of every built-in importer, in the order ties are broken.
pub fn default_registry() -> Result<ImporterRegistry> {
    ImporterRegistry::new()
        .with(Arc::new(UserImporter))?
        .with(Arc::new(GroupImporter))?
        .with(Arc::new(ForumImporter))?
        .with(Arc::new(TopicImporter))?
        .with(Arc::new(PostImporter))?
        .with(Arc::new(BlogImporter))?
        .with(Arc::new(CommentImporter))?
        .with(Arc::new(ProductCategoryImporter))?
        .with(Arc::new(ProductImporter))?
        .with(Arc::new(SubscriptionImporter))?
        .with(Arc::new(OrderImporter))
}

/// Provenance lookup for a legacy row.
pub(crate) fn legacy(table: &str, id: i64) -> Lookup {
    Lookup::Legacy(legacy_key(table, id))
}

pub(crate) fn price_error(table: &str, id: i64, e: PriceError) -> MigrationError {
    MigrationError::InvalidRecord(format!("{} {}: {}", table, id, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::DependencyResolver;

    #[test]
    fn test_default_plan() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 11);
        let plan = DependencyResolver::new(&registry).resolve(&[]).unwrap();
        assert_eq!(
            plan,
            vec![
                "users",
                "groups",
                "forums",
                "topics",
                "posts",
                "blogs",
                "comments",
                "product_categories",
                "products",
                "subscriptions",
                "orders",
            ]
        );
    }

    #[test]
    fn test_selection_keeps_only_named_entities() {
        let registry = default_registry().unwrap();
        let plan = DependencyResolver::new(&registry)
            .resolve(&["orders".to_string(), "products".to_string()])
            .unwrap();
        assert_eq!(plan, vec!["products", "orders"]);
    }
}
