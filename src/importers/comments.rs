//! Blog comments. Comments by accounts that were not migrated are kept as
//! guest comments.

use async_trait::async_trait;
use tracing::debug;

use super::legacy;
use crate::migration::{Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::Comment;
use crate::target::{legacy_key, EntityKind, TargetEntity};
use crate::utils::{clean_text, truncate_chars};

const TABLE: &str = "comments";
const GUEST_NAME_MAX_LEN: usize = 100;

pub struct CommentImporter;

/// Comments attached to blog entries.
pub(crate) fn blog_comments() -> SourceQuery {
    SourceQuery::table(TABLE, "id").eq("resource_type", "blog")
}

#[async_trait]
impl Importer for CommentImporter {
    fn entity_name(&self) -> &'static str {
        "comments"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required("blogs", "commented blog post"),
            Dependency::optional("users", "comment author"),
        ]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        blog_comments().eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("comments", id, EntityKind::Comment, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let blog_ref = record.get_ref("resource_id");
        let Some(blog_post_id) = ctx.lookup("blogs", blog_ref).await? else {
            return Ok(RecordOutcome::unresolved("blogs", blog_ref));
        };
        let Some(body) = record.get_text("body") else {
            return Ok(RecordOutcome::invalid("empty body"));
        };

        let user_ref = record.get_ref("user_id");
        let user_id = ctx.lookup("users", user_ref).await?;
        let guest_name = match user_id {
            Some(_) => None,
            None => {
                if user_ref.is_some() {
                    debug!("Comment {}: author {:?} not migrated, keeping as guest", id, user_ref);
                }
                Some(
                    record
                        .get_str("name")
                        .and_then(clean_text)
                        .map(|n| truncate_chars(&n, GUEST_NAME_MAX_LEN))
                        .unwrap_or_else(|| "Guest".to_string()),
                )
            }
        };

        let entity = TargetEntity::Comment(Comment {
            legacy_key: Some(legacy_key(TABLE, id)),
            blog_post_id,
            user_id,
            guest_name,
            body,
            created_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("comments", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::{BlogImporter, UserImporter};
    use crate::migration::TracingReporter;
    use crate::source::MemorySource;
    use crate::target::TargetRepository;
    use crate::test_support::{fixture, row, run_importer};
    use serde_json::json;

    #[tokio::test]
    async fn test_comments_fall_back_to_guests_and_update_counts() {
        let source = MemorySource::new();
        source
            .insert("users", row(json!({"id": 1, "email": "a@example.com", "approved": 1})))
            .await;
        source
            .insert("blogs", row(json!({"id": 5, "user_id": 1, "title": "Post", "draft": 0})))
            .await;
        source
            .insert_all(
                "comments",
                [
                    row(json!({"id": 1, "resource_type": "blog", "resource_id": 5, "user_id": 1, "body": "nice"})),
                    row(json!({"id": 2, "resource_type": "blog", "resource_id": 5, "user_id": 77, "name": "Visitor", "body": "hello"})),
                    row(json!({"id": 3, "resource_type": "blog", "resource_id": 5, "user_id": 0, "body": "anon"})),
                    row(json!({"id": 4, "resource_type": "blog", "resource_id": 6, "user_id": 1, "body": "lost"})),
                    row(json!({"id": 5, "resource_type": "video", "resource_id": 5, "user_id": 1, "body": "other"})),
                ],
            )
            .await;
        let fx = fixture(source);
        let config = MigrationConfig::default();
        run_importer(&UserImporter, &fx.backends, &config).await;
        run_importer(&BlogImporter, &fx.backends, &config).await;

        let result = run_importer(&CommentImporter, &fx.backends, &config).await;
        let counters = result.counters("comments");
        assert_eq!((counters.migrated, counters.skipped), (3, 1));

        let comments: Vec<Comment> = fx
            .target
            .all(EntityKind::Comment)
            .await
            .into_iter()
            .filter_map(|(_, e)| e.into_comment())
            .collect();
        assert!(comments[0].user_id.is_some());
        assert_eq!(comments[1].guest_name.as_deref(), Some("Visitor"));
        assert_eq!(comments[2].guest_name.as_deref(), Some("Guest"));

        let ctx = ImportContext::open(&fx.backends, &config);
        let updated = BlogImporter
            .import_secondary(&ctx, &config, &TracingReporter::new())
            .await
            .unwrap();
        assert_eq!(updated, 1);
        let blog_id = ctx.lookup("blogs", Some(5)).await.unwrap().unwrap();
        let blog = fx
            .target
            .get(EntityKind::BlogPost, blog_id)
            .await
            .unwrap()
            .and_then(TargetEntity::into_blog_post)
            .unwrap();
        assert_eq!(blog.comment_count, 3);
    }
}
