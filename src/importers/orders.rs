//! Orders together with their line items.
//!
//! An order is only written once every line item resolves to a migrated
//! product or subscription, so a migrated order is always complete.

use async_trait::async_trait;

use super::legacy;
use crate::migration::{
    Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result, SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::{Order, OrderItem, OrderStatus};
use crate::target::{legacy_key, EntityKind, TargetEntity, TargetId};
use crate::utils::{clean_text, parse_amount_cents};

const TABLE: &str = "orders";
const ITEM_TABLE: &str = "order_items";

pub struct OrderImporter;

/// A line item with its product already resolved.
struct ResolvedItem {
    source_id: i64,
    product_id: TargetId,
    title: String,
    quantity: i64,
    unit_price_cents: i64,
}

fn amount_cents(record: &SourceRecord, column: &str) -> Option<i64> {
    record.get(column).and_then(parse_amount_cents)
}

impl OrderImporter {
    async fn resolve_items(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        order_id: i64,
    ) -> Result<std::result::Result<Vec<ResolvedItem>, RecordOutcome>> {
        let query = SourceQuery::table(ITEM_TABLE, "id").eq("order_id", order_id);
        let mut scan = SourceScan::new(ctx.source.clone(), query, config.batch_size);
        let mut items = Vec::new();

        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                let source_id = row.id("id")?;
                let namespace = match row.get_str("product_type").map(str::trim) {
                    Some("subscription") => "subscriptions",
                    _ => "products",
                };
                let product_ref = row.get_ref("product_id");
                let Some(product_id) = ctx.lookup(namespace, product_ref).await? else {
                    return Ok(Err(RecordOutcome::unresolved(namespace, product_ref)));
                };
                let Some(unit_price_cents) = amount_cents(&row, "price") else {
                    return Ok(Err(RecordOutcome::invalid(format!(
                        "order item {} has no valid price",
                        source_id
                    ))));
                };
                items.push(ResolvedItem {
                    source_id,
                    product_id,
                    title: row
                        .get_str("title")
                        .and_then(clean_text)
                        .unwrap_or_else(|| format!("Item {}", source_id)),
                    quantity: row.get_i64("quantity").unwrap_or(1).max(1),
                    unit_price_cents,
                });
            }
        }
        Ok(Ok(items))
    }
}

#[async_trait]
impl Importer for OrderImporter {
    fn entity_name(&self) -> &'static str {
        "orders"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required("users", "customer"),
            Dependency::required("products", "ordered products"),
            Dependency::optional("subscriptions", "ordered subscriptions"),
        ]
    }

    fn namespaces(&self) -> Vec<&'static str> {
        vec!["orders", "order_items"]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id").eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("orders", id, EntityKind::Order, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let user_ref = record.get_ref("user_id");
        let Some(user_id) = ctx.lookup("users", user_ref).await? else {
            return Ok(RecordOutcome::unresolved("users", user_ref));
        };
        let Some(currency) = record
            .get_text("currency")
            .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
            .map(|c| c.to_ascii_uppercase())
        else {
            return Ok(RecordOutcome::invalid("missing or malformed currency"));
        };
        let items = match self.resolve_items(ctx, config, id).await? {
            Ok(items) => items,
            Err(skip) => return Ok(skip),
        };

        let item_total: i64 = items
            .iter()
            .map(|i| i.unit_price_cents.saturating_mul(i.quantity))
            .sum();
        let entity = TargetEntity::Order(Order {
            legacy_key: Some(legacy_key(TABLE, id)),
            user_id,
            status: OrderStatus::from_legacy(record.get_str("status").unwrap_or_default()),
            currency,
            total_cents: amount_cents(record, "total").unwrap_or(item_total),
            placed_at: record.get_datetime("created"),
        });
        let lines: Vec<(TargetEntity, Option<(&str, i64)>)> = items
            .iter()
            .map(|item| {
                let line = TargetEntity::OrderItem(OrderItem {
                    legacy_key: Some(legacy_key(ITEM_TABLE, item.source_id)),
                    order_id: 0,
                    product_id: item.product_id,
                    title: item.title.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                });
                (line, Some(("order_items", item.source_id)))
            })
            .collect();
        let order_id = ctx
            .persist_with_children("orders", id, &entity, &lines)
            .await?;

        Ok(RecordOutcome::migrated(
            order_id,
            format!("{} ({} items)", entity.summary(), items.len()),
        ))
    }
}
