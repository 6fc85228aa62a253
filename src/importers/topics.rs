//! Forum topics. Post counters and last-post pointers are filled in by the
//! secondary pass once posts exist.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::legacy;
use super::posts::approved_posts;
use crate::migration::{
    Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Reporter, Result,
    SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::Topic;
use crate::target::{legacy_key, EntityKind, TargetEntity, TargetRepository};
use crate::utils::{clean_text, truncate_chars};

const TABLE: &str = "forum_topics";
const TITLE_MAX_LEN: usize = 255;

pub struct TopicImporter;

#[derive(Default)]
struct PostStats {
    count: i64,
    last_post: Option<i64>,
}

#[async_trait]
impl Importer for TopicImporter {
    fn entity_name(&self) -> &'static str {
        "topics"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required("users", "topic author"),
            Dependency::required("forums", "containing forum"),
            Dependency::post("posts", "post counters and last post"),
        ]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id")
            .eq("approved", 1)
            .eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("topics", id, EntityKind::Topic, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let forum_ref = record.get_ref("forum_id");
        let Some(forum_id) = ctx.lookup("forums", forum_ref).await? else {
            return Ok(RecordOutcome::unresolved("forums", forum_ref));
        };
        let user_ref = record.get_ref("user_id");
        let Some(user_id) = ctx.lookup("users", user_ref).await? else {
            return Ok(RecordOutcome::unresolved("users", user_ref));
        };
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let title = truncate_chars(&title, TITLE_MAX_LEN);
        let slug = ctx
            .unique_slug(EntityKind::Topic, &title, &format!("topic-{}", id))
            .await?;

        let entity = TargetEntity::Topic(Topic {
            legacy_key: Some(legacy_key(TABLE, id)),
            forum_id,
            user_id,
            title,
            slug,
            is_sticky: record.get_bool("sticky").unwrap_or(false),
            is_locked: record.get_bool("locked").unwrap_or(false),
            view_count: record.get_i64("views").unwrap_or(0).max(0),
            post_count: 0,
            last_post_id: None,
            created_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("topics", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    /// Recount migrated posts per topic and point each topic at its latest
    /// migrated post.
    async fn import_secondary(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        _reporter: &dyn Reporter,
    ) -> Result<u64> {
        let mut stats: BTreeMap<i64, PostStats> = BTreeMap::new();
        let mut scan = SourceScan::new(ctx.source.clone(), approved_posts(), config.batch_size);
        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                let Ok(post_id) = row.id("id") else {
                    continue;
                };
                let Some(topic) = row.get_ref("topic_id") else {
                    continue;
                };
                if ctx.lookup("posts", Some(post_id)).await?.is_none() {
                    continue;
                }
                let entry = stats.entry(topic).or_default();
                entry.count += 1;
                // Rows arrive in id order, so the last one seen is the latest.
                entry.last_post = Some(post_id);
            }
        }

        let mut updated = 0;
        for (legacy_topic, topic_stats) in stats {
            let Some(topic_id) = ctx.lookup("topics", Some(legacy_topic)).await? else {
                continue;
            };
            let Some(mut topic) = ctx
                .target
                .get(EntityKind::Topic, topic_id)
                .await?
                .and_then(TargetEntity::into_topic)
            else {
                continue;
            };
            let last_post_id = ctx.lookup("posts", topic_stats.last_post).await?;
            if topic.post_count == topic_stats.count && topic.last_post_id == last_post_id {
                continue;
            }
            topic.post_count = topic_stats.count;
            topic.last_post_id = last_post_id;
            ctx.target
                .update(topic_id, &TargetEntity::Topic(topic))
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::{ForumImporter, PostImporter, UserImporter};
    use crate::source::MemorySource;
    use crate::test_support::{fixture, row, run_importer};
    use serde_json::json;

    async fn source() -> MemorySource {
        let source = MemorySource::new();
        source
            .insert("users", row(json!({"id": 1, "email": "a@example.com", "approved": 1})))
            .await;
        source
            .insert("forums", row(json!({"id": 1, "type": "forum", "title": "General"})))
            .await;
        source
            .insert_all(
                "forum_topics",
                [
                    row(json!({"id": 10, "forum_id": 1, "user_id": 1, "title": "Hello", "approved": 1, "sticky": "1"})),
                    row(json!({"id": 11, "forum_id": 2, "user_id": 1, "title": "Lost", "approved": 1})),
                    row(json!({"id": 12, "forum_id": 1, "user_id": 1, "title": "Hello", "approved": 1})),
                ],
            )
            .await;
        source
            .insert_all(
                "forum_posts",
                [
                    row(json!({"id": 100, "topic_id": 10, "user_id": 1, "body": "first", "approved": 1})),
                    row(json!({"id": 101, "topic_id": 10, "user_id": 1, "body": "second", "approved": 1})),
                    row(json!({"id": 102, "topic_id": 10, "user_id": 1, "body": "hidden", "approved": 0})),
                    row(json!({"id": 103, "topic_id": 12, "user_id": 1, "body": "   ", "approved": 1})),
                ],
            )
            .await;
        source
    }

    #[tokio::test]
    async fn test_topics_and_post_counters() {
        let fx = fixture(source().await);
        let config = MigrationConfig::default();
        run_importer(&UserImporter, &fx.backends, &config).await;
        run_importer(&ForumImporter, &fx.backends, &config).await;
        let topics = run_importer(&TopicImporter, &fx.backends, &config).await;
        assert_eq!(topics.counters("topics").migrated, 2);
        assert_eq!(topics.counters("topics").skipped, 1);

        let posts = run_importer(&PostImporter, &fx.backends, &config).await;
        assert_eq!(posts.counters("posts").migrated, 2);
        assert_eq!(posts.counters("posts").skipped, 1);

        // Secondary pass, as the orchestrator would run it after posts.
        let ctx = ImportContext::open(&fx.backends, &config);
        let reporter = crate::migration::TracingReporter::new();
        let updated = TopicImporter
            .import_secondary(&ctx, &config, &reporter)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let ids = fx.backends.identifier_map();
        let topic_id = ids.get("topics", 10).await.unwrap().unwrap();
        let topic = fx
            .target
            .get(EntityKind::Topic, topic_id)
            .await
            .unwrap()
            .and_then(TargetEntity::into_topic)
            .unwrap();
        assert_eq!(topic.post_count, 2);
        assert_eq!(topic.last_post_id, ids.get("posts", 101).await.unwrap());
        assert!(topic.is_sticky);
        assert_eq!(topic.slug, "hello");

        let other = ids.get("topics", 12).await.unwrap().unwrap();
        let other = fx.target.get(EntityKind::Topic, other).await.unwrap().unwrap();
        assert_eq!(other.slug(), Some("hello-2"));
    }
}
