//! Blog entries, keyed by slug: a slug that already exists in the target is
//! the same post.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::comments::blog_comments;
use crate::migration::{
    Dependency, ImportContext, Importer, MigrationConfig, RecordOutcome, Reporter, Result,
    SourceScan,
};
use crate::source::{SourceQuery, SourceRecord};
use crate::target::models::BlogPost;
use crate::target::{legacy_key, EntityKind, Lookup, TargetEntity, TargetRepository};
use crate::utils::{clean_text, slugify};

const TABLE: &str = "blogs";

pub struct BlogImporter;

/// The explicit legacy slug, else the slugified title.
fn blog_slug(record: &SourceRecord, id: i64) -> String {
    let slug = record
        .get_text("slug")
        .map(|s| slugify(&s))
        .filter(|s| !s.is_empty())
        .or_else(|| record.get_text("title").map(|t| slugify(&t)))
        .unwrap_or_default();
    if slug.is_empty() {
        format!("blog-{}", id)
    } else {
        slug
    }
}

#[async_trait]
impl Importer for BlogImporter {
    fn entity_name(&self) -> &'static str {
        "blogs"
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::required("users", "blog author"),
            Dependency::post("comments", "comment counts"),
        ]
    }

    fn source_query(&self, config: &MigrationConfig) -> SourceQuery {
        SourceQuery::table(TABLE, "id")
            .eq("draft", 0)
            .eq_opt("user_id", config.user_id_filter)
    }

    async fn import_record(
        &self,
        ctx: &ImportContext,
        _config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome> {
        let id = record.id("id")?;
        let slug = blog_slug(record, id);
        if let Some(existing) = ctx
            .find_existing(
                "blogs",
                id,
                EntityKind::BlogPost,
                &[Lookup::NaturalKey(slug.clone())],
            )
            .await?
        {
            return Ok(RecordOutcome::already_exists(existing));
        }

        let author_ref = record.get_ref("user_id");
        let Some(author_id) = ctx.lookup("users", author_ref).await? else {
            return Ok(RecordOutcome::unresolved("users", author_ref));
        };
        let Some(title) = record.get_str("title").and_then(clean_text) else {
            return Ok(RecordOutcome::invalid("missing title"));
        };
        let cover_image = ctx.fetch_media(record.get_str("image"), "blog-covers").await;

        let entity = TargetEntity::BlogPost(BlogPost {
            legacy_key: Some(legacy_key(TABLE, id)),
            author_id,
            title,
            slug,
            body: record.get_text("body").unwrap_or_default(),
            cover_image,
            comment_count: 0,
            published_at: record.get_datetime("created"),
        });
        let target_id = ctx.persist("blogs", id, &entity).await?;
        Ok(RecordOutcome::migrated(target_id, entity.summary()))
    }

    /// Refresh each blog post's count of migrated comments.
    async fn import_secondary(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        _reporter: &dyn Reporter,
    ) -> Result<u64> {
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        let mut scan = SourceScan::new(ctx.source.clone(), blog_comments(), config.batch_size);
        while let Some(rows) = scan.next_batch().await? {
            for row in rows {
                let Some(blog) = row.get_ref("resource_id") else {
                    continue;
                };
                if ctx.lookup("comments", row.id("id").ok()).await?.is_some() {
                    *counts.entry(blog).or_default() += 1;
                }
            }
        }

        let mut updated = 0;
        for (legacy_blog, count) in counts {
            let Some(blog_id) = ctx.lookup("blogs", Some(legacy_blog)).await? else {
                continue;
            };
            let Some(mut post) = ctx
                .target
                .get(EntityKind::BlogPost, blog_id)
                .await?
                .and_then(TargetEntity::into_blog_post)
            else {
                continue;
            };
            if post.comment_count == count {
                continue;
            }
            post.comment_count = count;
            ctx.target
                .update(blog_id, &TargetEntity::BlogPost(post))
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}
