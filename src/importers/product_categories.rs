//! Product category tree: created flat, then relinked to parents.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::{info, warn};

use super::legacy;
use crate::migration::{
    drive_records, ImportContext, Importer, MigrationConfig, MigrationResult,
    RecordOutcome, Reporter, Result, SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::ProductCategory;
use crate::target::{legacy_key, EntityKind, TargetEntity, TargetRepository};
use crate::utils::clean_text;

const TABLE: &str = "product_categories";

pub struct ProductCategoryImporter;

/// Whether following parents up from `id` leads back to `id`.
fn in_cycle(parents: &HashMap<i64, i64>, id: i64) -> bool {
    let mut seen = HashSet::new();
    let mut current = parents.get(&id).copied();
    while let Some(node) = current {
        if node == id {
            return true;
        }
        if !seen.insert(node) {
            return false;
        }
        current = parents.get(&node).copied();
    }
    false
}

impl ProductCategoryImporter {
    async fn relink(&self, ctx: &ImportContext, config: &MigrationConfig) -> Result<u64> {
        let mut scan = SourceScan::new(
            ctx.source.clone(),
            self.source_query(config).not_null("parent_id"),
            config.batch_size,
        );
        let mut links = Vec::new();
        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                if let Ok(id) = row.id("id") {
                    links.push((id, row.get_ref("parent_id")));
                }
            }
        }
        let parents: HashMap<i64, i64> = links
            .iter()
            .filter_map(|(id, parent)| parent.map(|p| (*id, p)))
            .collect();

        let mut updated = 0;
        for (id, parent_ref) in links {
            let Some(target_id) = ctx.lookup(TABLE, Some(id)).await? else {
                continue;
            };
            let parent_ref = match parent_ref {
                Some(_) if in_cycle(&parents, id) => {
                    warn!(
                        "Product category {} is part of a parent cycle; leaving it at the top level",
                        id
                    );
                    None
                }
                other => other,
            };
            let parent_id = ctx.lookup(TABLE, parent_ref).await?;
            if parent_ref.is_some() && parent_id.is_none() {
                warn!("Product category {} has unmigrated parent {:?}", id, parent_ref);
            }

            let Some(mut category) = ctx
                .target
                .get(EntityKind::ProductCategory, target_id)
                .await?
                .and_then(TargetEntity::into_product_category)
            else {
                continue;
            };
            if category.parent_id == parent_id {
                continue;
            }
            category.parent_id = parent_id;
            ctx.target
                .update(target_id, &TargetEntity::ProductCategory(category))
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl Importer for ProductCategoryImporter {
    fn entity_name(&self) -> &'static str {
        "product_categories"
    }

    fn source_query(&self, _config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id")
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing(TABLE, id, EntityKind::ProductCategory, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let slug = ctx
            .unique_slug(EntityKind::ProductCategory, &title, &format!("category-{}", id))
            .await?;

        let entity = TargetEntity::ProductCategory(ProductCategory {
            legacy_key: Some(legacy_key(TABLE, id)),
            title,
            slug,
            parent_id: None,
            position: record.get_i64("position").unwrap_or(0),
        });
        let target_id = ctx.persist(TABLE, id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    async fn import(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        result: &mut MigrationResult,
        reporter: &dyn Reporter,
    ) -> Result<u64> {
        let processed = drive_records(self, ctx, config, result, reporter).await?;
        let relinked = self.relink(ctx, config).await?;
        info!("Relinked {} product categories to their parents", relinked);
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::test_support::{fixture, row, run_importer};
    use serde_json::json;

    #[tokio::test]
    async fn test_tree_is_relinked() {
        let source = MemorySource::new();
        source
            .insert_all(
                "product_categories",
                [
                    row(json!({"id": 1, "title": "Paperbacks", "parent_id": 3})),
                    row(json!({"id": 2, "title": "Self", "parent_id": 2})),
                    row(json!({"id": 3, "title": "Books", "parent_id": 0})),
                    row(json!({"id": 4, "title": "Orphan", "parent_id": 99})),
                ],
            )
            .await;
        let fx = fixture(source);
        let result = run_importer(
            &ProductCategoryImporter,
            &fx.backends,
            &MigrationConfig::default(),
        )
        .await;
        assert_eq!(result.counters("product_categories").migrated, 4);

        let ids = fx.backends.identifier_map();
        let books = ids.get(TABLE, 3).await.unwrap();
        let categories: Vec<ProductCategory> = fx
            .target
            .all(EntityKind::ProductCategory)
            .await
            .into_iter()
            .filter_map(|(_, e)| e.into_product_category())
            .collect();
        assert_eq!(categories[0].parent_id, books);
        assert_eq!(categories[1].parent_id, None);
        assert_eq!(categories[2].parent_id, None);
        assert_eq!(categories[3].parent_id, None);
    }

    #[test]
    fn test_in_cycle() {
        let parents: HashMap<i64, i64> = [(1, 2), (2, 1), (3, 1), (4, 4), (5, 3)].into_iter().collect();
        assert!(in_cycle(&parents, 1));
        assert!(in_cycle(&parents, 2));
        assert!(in_cycle(&parents, 4));
        // Hanging below a cycle is not being part of it.
        assert!(!in_cycle(&parents, 3));
        assert!(!in_cycle(&parents, 5));
        assert!(!in_cycle(&parents, 6));
    }

    #[tokio::test]
    async fn test_parent_cycles_are_left_unlinked() {
        let source = MemorySource::new();
        source
            .insert_all(
                "product_categories",
                [
                    row(json!({"id": 1, "title": "Fiction", "parent_id": 2})),
                    row(json!({"id": 2, "title": "Novels", "parent_id": 1})),
                    row(json!({"id": 3, "title": "Thrillers", "parent_id": 2})),
                ],
            )
            .await;
        let fx = fixture(source);
        let result = run_importer(
            &ProductCategoryImporter,
            &fx.backends,
            &MigrationConfig::default(),
        )
        .await;
        assert_eq!(result.counters("product_categories").migrated, 3);

        let novels = fx.backends.identifier_map().get(TABLE, 2).await.unwrap();
        let parents: Vec<Option<i64>> = fx
            .target
            .all(EntityKind::ProductCategory)
            .await
            .into_iter()
            .filter_map(|(_, e)| e.into_product_category())
            .map(|c| c.parent_id)
            .collect();
        assert_eq!(parents, vec![None, None, novels]);
    }
}
