//! Users: approved legacy accounts, keyed by lower-cased email.

use async_trait::async_trait;
use tracing::debug;

use super::legacy;
use crate::migration::{
    Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Reporter, Result,
    SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::User;
use crate::target::{legacy_key, EntityKind, Lookup, TargetEntity, TargetRepository};

const TABLE: &str = "users";

pub struct UserImporter;

fn normalized_email(record: &SourceRecord) -> Option<String> {
    record
        .get_text("email")
        .map(|e| e.to_lowercase())
        .filter(|e| e.contains('@'))
}

#[async_trait]
impl Importer for UserImporter {
    fn entity_name(&self) -> &'static str {
        "users"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::post("groups", "primary group membership")]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id")
            .eq("approved", 1)
            .eq_opt("id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        let Some(email) = normalized_email(record) else {
            return Ok(RecordOutcome::invalid("missing or malformed email"));
        };

        if let Some(existing) = ctx
            .find_existing(
                "users",
                id,
                EntityKind::User,
                &[Lookup::NaturalKey(email.clone()), legacy(TABLE, id)],
            )
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let username = record
            .get_text("username")
            .or_else(|| email.split('@').next().map(str::to_string))
            .unwrap_or_else(|| format!("user{}", id));
        let display_name = record
            .get_text("name")
            .unwrap_or_else(|| username.clone());
        let handle = ctx
            .unique_slug(EntityKind::User, &username, &format!("user-{}", id))
            .await?;
        let avatar = ctx.fetch_media(record.get_str("avatar"), "avatars").await;

        let entity = TargetEntity::User(User {
            legacy_key: Some(legacy_key(TABLE, id)),
            email,
            username,
            display_name,
            handle,
            avatar,
            primary_group_id: None,
            registered_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("users", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    /// Link each migrated user to their legacy primary group, once groups
    /// exist.
    async fn import_secondary(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        _reporter: &dyn Reporter,
    ) -> Result<u64> {
        let mut scan = SourceScan::new(
            ctx.source.clone(),
            self.source_query(config).not_null("group_id"),
            config.batch_size,
        );
        let mut updated = 0;

        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                let Ok(id) = row.id("id") else {
                    continue;
                };
                let Some(group_id) = ctx.lookup("groups", row.get_ref("group_id")).await? else {
                    continue;
                };
                let Some(user_id) = ctx.lookup("users", Some(id)).await? else {
                    continue;
                };
                let Some(mut user) = ctx
                    .target
                    .get(EntityKind::User, user_id)
                    .await?
                    .and_then(TargetEntity::into_user)
                else {
                    continue;
                };
                if user.primary_group_id == Some(group_id) {
                    continue;
                }
                debug!("User {} -> primary group {}", user_id, group_id);
                user.primary_group_id = Some(group_id);
                ctx.target.update(user_id, &TargetEntity::User(user)).await?;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
