//! Forum posts.

use async_trait::async_trait;

use super::legacy;
use crate::migration::{Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::Post;
use crate::target::{legacy_key, EntityKind, TargetEntity};

const TABLE: &str = "forum_posts";

pub struct PostImporter;

/// Every post that is eligible for migration, regardless of user scope.
pub(crate) fn approved_posts() -> SourceQuery {
    SourceQuery::table(TABLE, "id").eq("approved", 1)
}

#[async_trait]
impl Importer for PostImporter {
    fn entity_name(&self) -> &'static str {
        "posts"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required("topics", "containing topic"),
            Dependency::required("users", "post author"),
        ]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        approved_posts().eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("posts", id, EntityKind::Post, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let topic_ref = record.get_ref("topic_id");
        let Some(topic_id) = ctx.lookup("topics", topic_ref).await? else {
            return Ok(RecordOutcome::unresolved("topics", topic_ref));
        };
        let user_ref = record.get_ref("user_id");
        let Some(user_id) = ctx.lookup("users", user_ref).await? else {
            return Ok(RecordOutcome::unresolved("users", user_ref));
        };
        let Some(body) = record.get_text("body") else {
            return Ok(RecordOutcome::invalid("empty body"));
        };

        let entity = TargetEntity::Post(Post {
            legacy_key: Some(legacy_key(TABLE, id)),
            topic_id,
            user_id,
            body,
            created_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("posts", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }
}
