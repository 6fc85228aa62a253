//! Subscription packages, migrated as subscription products with one
//! recurring price per currency and interval.

use async_trait::async_trait;

use super::products::{price_children, product_summary};
use super::{legacy, price_error};
use crate::migration::{Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::{Product, ProductKind};
use crate::target::{legacy_key, EntityKind, TargetEntity};
use crate::utils::{clean_text, decode_renewal};

const TABLE: &str = "subscription_packages";

pub struct SubscriptionImporter;

#[async_trait]
impl Importer for SubscriptionImporter {
    fn entity_name(&self) -> &'static str {
        "subscriptions"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::optional("product_categories", "product category"),
            Dependency::optional("groups", "group granted by the package"),
        ]
    }

    fn source_query(&self, _config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id").eq("enabled", 1)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("subscriptions", id, EntityKind::Product, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let prices = match record.get_json("renewal") {
            Ok(Some(blob)) => decode_renewal(&blob).map_err(|e| price_error(TABLE, id, e))?,
            Ok(None) => Vec::new(),
            Err(e) => return Ok(RecordOutcome::invalid(format!("renewal is not JSON: {}", e))),
        };
        if prices.is_empty() {
            return Ok(RecordOutcome::invalid("subscription has no renewal price"));
        }

        let slug = ctx
            .unique_slug(EntityKind::Product, &title, &format!("subscription-{}", id))
            .await?;
        let image = ctx.fetch_media(record.get_str("image"), "products").await;

        let entity = TargetEntity::Product(Product {
            legacy_key: Some(legacy_key(TABLE, id)),
            kind: ProductKind::Subscription,
            sku: None,
            title,
            slug,
            description: record.get_str("description").and_then(clean_text),
            category_id: ctx
                .lookup("product_categories", record.get_ref("category_id"))
                .await?,
            image,
            grants_group_id: ctx.lookup("groups", record.get_ref("group_id")).await?,
        });
        let target_id = ctx
            .persist_with_children("subscriptions", id, &entity, &price_children(&prices))
            .await?;
        Ok(RecordOutcome::migrated(
            target_id,
            product_summary(&entity, &prices),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::target::models::IntervalUnit;
    use crate::test_support::{fixture, row, run_importer};
    use serde_json::json;

    #[tokio::test]
    async fn test_packages_become_subscription_products() {
        let source = MemorySource::new();
        source
            .insert_all(
                "subscription_packages",
                [
                    row(json!({
                        "id": 1, "title": "Gold", "enabled": 1, "group_id": 3,
                        "renewal": {"USD": {"month": {"amount": 5}, "year": {"amount": 50}}}
                    })),
                    row(json!({"id": 2, "title": "Free", "enabled": 1, "renewal": "{}"})),
                ],
            )
            .await;
        let fx = fixture(source);
        let result = run_importer(&SubscriptionImporter, &fx.backends, &MigrationConfig::default()).await;
        assert_eq!(result.counters("subscriptions").migrated, 1);
        assert_eq!(result.counters("subscriptions").skipped, 1);

        let product = fx.target.all(EntityKind::Product).await[0]
            .1
            .clone()
            .into_product()
            .unwrap();
        assert_eq!(product.kind, ProductKind::Subscription);
        // Groups were not migrated; the grant is simply absent.
        assert_eq!(product.grants_group_id, None);

        let prices: Vec<_> = fx
            .target
            .all(EntityKind::Price)
            .await
            .into_iter()
            .filter_map(|(_, e)| e.into_price())
            .collect();
        let units: Vec<IntervalUnit> = prices.iter().filter_map(|p| p.interval).map(|i| i.unit).collect();
        assert_eq!(units, vec![IntervalUnit::Month, IntervalUnit::Year]);
        assert!(prices[0].is_default && !prices[1].is_default);
    }
}
