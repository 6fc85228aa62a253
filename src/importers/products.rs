//! One-time products and their prices.

use async_trait::async_trait;

use super::{legacy, price_error};
use crate::migration::{Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::{Product, ProductKind};
use crate::target::{legacy_key, EntityKind, Lookup, TargetEntity};
use crate::utils::{clean_text, decode_cost, PriceSpec};

const TABLE: &str = "products";

pub struct ProductImporter;

/// Prices to write alongside a product; the product id is filled in by the
/// repository.
pub(crate) fn price_children(prices: &[PriceSpec]) -> Vec<(TargetEntity, Option<(&'static str, i64)>)> {
    prices
        .iter()
        .map(|price| (TargetEntity::Price(price.for_product(0)), None))
        .collect()
}

/// Summary line including the default price, when there is one.
pub(crate) fn product_summary(entity: &TargetEntity, prices: &[PriceSpec]) -> String {
    match prices.iter().find(|p| p.is_default) {
        Some(p) => format!(
            "{} ({} prices, default {} {})",
            entity.summary(),
            prices.len(),
            p.amount_cents,
            p.currency
        ),
        None => entity.summary(),
    }
}

#[async_trait]
impl Importer for ProductImporter {
    fn entity_name(&self) -> &'static str {
        "products"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::optional("product_categories", "product category")]
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
        let sku = record.get_text("sku");

        let mut lookups = Vec::with_capacity(2);
        if let Some(sku) = &sku {
            lookups.push(Lookup::NaturalKey(sku.clone()));
        }
        lookups.push(legacy(TABLE, id));
        if let Some(existing) = ctx
            .find_existing("products", id, EntityKind::Product, &lookups)
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        // Decode before writing anything so a bad blob leaves no partial product.
        let prices = match record.get_json("cost") {
            Ok(Some(blob)) => decode_cost(&blob).map_err(|e| price_error(TABLE, id, e))?,
            Ok(None) => Vec::new(),
            Err(e) => return Ok(RecordOutcome::invalid(format!("cost is not JSON: {}", e))),
        };

        let slug = ctx
            .unique_slug(EntityKind::Product, &title, &format!("product-{}", id))
            .await?;
        let image = ctx.fetch_media(record.get_str("image"), "products").await;

        let entity = TargetEntity::Product(Product {
            legacy_key: Some(legacy_key(TABLE, id)),
            kind: ProductKind::OneTime,
            sku,
            title,
            slug,
            description: record.get_str("description").and_then(clean_text),
            category_id: ctx
                .lookup("product_categories", record.get_ref("category_id"))
                .await?,
            image,
            grants_group_id: None,
        });
        let target_id = ctx
            .persist_with_children("products", id, &entity, &price_children(&prices))
            .await?;
        Ok(RecordOutcome::migrated(
            target_id,
            product_summary(&entity, &prices),
        ))
    }
}
