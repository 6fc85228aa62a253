//! Forum categories and forums, stored together in the legacy `forums`
//! table and told apart by `type`.
//!
//! Two passes: every node is created flat first, then each forum is
//! relinked to its category and parent forum by mapping lookup. A forum
//! may reference a category or parent that appears later in source order.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::legacy;
use crate::migration::{
    drive_records, Dependency, ImportContext, Importer, MigrationConfig, MigrationResult,
    RecordOutcome, Reporter, Result, SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::{Forum, ForumCategory};
use crate::target::{legacy_key, EntityKind, TargetEntity, TargetId, TargetRepository};
use crate::utils::clean_text;

const TABLE: &str = "forums";
const CATEGORY_NS: &str = "forum_categories";
const FORUM_NS: &str = "forums";

/// Deepest parent chain followed when looking for a forum's category.
const MAX_DEPTH: usize = 16;

pub struct ForumImporter;

fn is_category(record: &SourceRecord) -> bool {
    record
        .get_str("type")
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("category"))
}

/// Legacy structure needed by the relink pass.
#[derive(Debug, Clone, Copy)]
struct Node {
    is_category: bool,
    parent: Option<i64>,
}

/// Nearest category above `id`, and the direct parent forum if the parent
/// is a forum.
fn ancestry(nodes: &HashMap<i64, Node>, id: i64) -> (Option<i64>, Option<i64>) {
    let Some(node) = nodes.get(&id) else {
        return (None, None);
    };
    let parent_forum = node
        .parent
        .filter(|p| nodes.get(p).is_some_and(|n| !n.is_category));

    let mut current = node.parent;
    for _ in 0..MAX_DEPTH {
        let Some(pid) = current else { break };
        match nodes.get(&pid) {
            Some(n) if n.is_category => return (Some(pid), parent_forum),
            Some(n) if pid != id => current = n.parent,
            _ => break,
        }
    }
    (None, parent_forum)
}

impl ForumImporter {
    async fn import_category(
        &self,
        ctx: &ImportContext,
        id: i64,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        if let Some(existing) = ctx
            .find_existing(CATEGORY_NS, id, EntityKind::ForumCategory, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let slug = ctx
            .unique_slug(EntityKind::ForumCategory, &title, &format!("category-{}", id))
            .await?;

        let entity = TargetEntity::ForumCategory(ForumCategory {
            legacy_key: Some(legacy_key(TABLE, id)),
            title,
            slug,
            description: record.get_str("description").and_then(clean_text),
            position: record.get_i64("position").unwrap_or(0),
            group_id: ctx.lookup("groups", record.get_ref("group_id")).await?,
        });
        let target_id = ctx.persist(CATEGORY_NS, id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    async fn import_forum(
        &self,
        ctx: &ImportContext,
        id: i64,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        if let Some(existing) = ctx
            .find_existing(FORUM_NS, id, EntityKind::Forum, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let slug = ctx
            .unique_slug(EntityKind::Forum, &title, &format!("forum-{}", id))
            .await?;

        // Category and parent links are set by the relink pass.
        let entity = TargetEntity::Forum(Forum {
            legacy_key: Some(legacy_key(TABLE, id)),
            title,
            slug,
            description: record.get_str("description").and_then(clean_text),
            position: record.get_i64("position").unwrap_or(0),
            category_id: None,
            parent_id: None,
            group_id: ctx.lookup("groups", record.get_ref("group_id")).await?,
        });
        let target_id = ctx.persist(FORUM_NS, id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    /// Second pass: set category and parent links on every mapped forum.
    async fn relink(&self, ctx: &ImportContext, config: &MigrationConfig) -> Result<u64> {
        let mut nodes = HashMap::new();
        let mut scan = SourceScan::new(ctx.source.clone(), self.source_query(config), config.batch_size);
        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                // Rows without an id were never migrated.
                let Ok(id) = row.id("id") else {
                    continue;
                };
                nodes.insert(
                    id,
                    Node {
                        is_category: is_category(&row),
                        parent: row.get_ref("parent_id"),
                    },
                );
            }
        }

        let mut forum_ids: Vec<i64> = nodes
            .iter()
            .filter(|(_, n)| !n.is_category)
            .map(|(id, _)| *id)
            .collect();
        forum_ids.sort_unstable();

        let mut updated = 0;
        for id in forum_ids {
            let Some(target_id) = ctx.lookup(FORUM_NS, Some(id)).await? else {
                continue;
            };
            let (category, parent) = ancestry(&nodes, id);
            let category_id = ctx.lookup(CATEGORY_NS, category).await?;
            let parent_id = ctx.lookup(FORUM_NS, parent).await?;
            if category.is_some() && category_id.is_none() {
                warn!("Forum {} references category {:?} which was not migrated", id, category);
            }

            if self.apply_links(ctx, target_id, category_id, parent_id).await? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn apply_links(
        &self,
        ctx: &ImportContext,
        target_id: TargetId,
        category_id: Option<TargetId>,
        parent_id: Option<TargetId>,
    ) -> Result<bool> {
        let Some(mut forum) = ctx
            .target
            .get(EntityKind::Forum, target_id)
            .await?
            .and_then(TargetEntity::into_forum)
        else {
            return Ok(false);
        };
        if forum.category_id == category_id && forum.parent_id == parent_id {
            return Ok(false);
        }
        debug!(
            "Forum {} -> category {:?}, parent {:?}",
            target_id, category_id, parent_id
        );
        forum.category_id = category_id;
        forum.parent_id = parent_id;
        ctx.target
            .update(target_id, &TargetEntity::Forum(forum))
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl Importer for ForumImporter {
    fn entity_name(&self) -> &'static str {
        "forums"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::optional("groups", "group-owned forums")]
    }

    fn namespaces(&self) -> Vec<&'static str> {
        vec![CATEGORY_NS, FORUM_NS]
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
        if is_category(record) {
            self.import_category(ctx, id, record).await
        } else {
            self.import_forum(ctx, id, record).await
        }
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
        info!("Relinked {} forums to their categories and parents", relinked);
        Ok(processed)
    }
}
