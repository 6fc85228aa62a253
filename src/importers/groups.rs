//! Groups, owned by a migrated user.

use async_trait::async_trait;

use super::legacy;
use crate::migration::{Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Result};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::Group;
use crate::target::{legacy_key, EntityKind, TargetEntity};
use crate::utils::clean_text;

const TABLE: &str = "groups";

pub struct GroupImporter;

fn is_private(record: &SourceRecord) -> bool {
    match record.get_str("privacy") {
        Some(privacy) => !privacy.trim().eq_ignore_ascii_case("public"),
        None => record.get_bool("is_private").unwrap_or(false),
    }
}

#[async_trait]
impl Importer for GroupImporter {
    fn entity_name(&self) -> &'static str {
        "groups"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required("users", "group owner")]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id").eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        if let Some(existing) = ctx
            .find_existing("groups", id, EntityKind::Group, &[legacy(TABLE, id)])
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let owner_ref = record.get_ref("user_id");
        let Some(owner_id) = ctx.lookup("users", owner_ref).await? else {
            return Ok(RecordOutcome::unresolved("users", owner_ref));
        };
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };

        let slug = ctx
            .unique_slug(EntityKind::Group, &title, &format!("group-{}", id))
            .await?;
        let logo = ctx.fetch_media(record.get_str("logo"), "group-logos").await;

        let entity = TargetEntity::Group(Group {
            legacy_key: Some(legacy_key(TABLE, id)),
            owner_id,
            title,
            slug,
            description: record.get_str("description").and_then(clean_text),
            logo,
            is_private: is_private(record),
            created_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("groups", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }
}
