//! Per-run resources shared by all importers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::config::MigrationConfig;
use super::error::Result;
use crate::mapping::{IdentifierMap, MappingStore, OverlayMappingStore, DEFAULT_MAPPING_TTL};
use crate::media::{DisabledMediaDownloader, MediaDownloader};
use crate::source::SourceConnection;
use crate::target::{EntityKind, Lookup, TargetEntity, TargetGateway, TargetId, TargetRepository};
use crate::utils::{slugify, truncate_chars, SLUG_MAX_LEN};

/// The external collaborators a run is wired to.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn SourceConnection>,
    pub target: Arc<dyn TargetRepository>,
    pub mappings: Arc<dyn MappingStore>,
    pub media: Arc<dyn MediaDownloader>,
    /// Key segment identifying the legacy system in mapping keys.
    pub source_system: String,
    pub mapping_ttl: Duration,
    pub media_base_url: Option<String>,
}

impl Backends {
    pub fn new(
        source: Arc<dyn SourceConnection>,
        target: Arc<dyn TargetRepository>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            source,
            target,
            mappings,
            media: Arc::new(DisabledMediaDownloader),
            source_system: "legacy".to_string(),
            mapping_ttl: DEFAULT_MAPPING_TTL,
            media_base_url: None,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaDownloader>, base_url: Option<String>) -> Self {
        self.media = media;
        self.media_base_url = base_url;
        self
    }

    pub fn with_source_system(mut self, source_system: &str) -> Self {
        self.source_system = source_system.to_string();
        self
    }

    pub fn with_mapping_ttl(mut self, ttl: Duration) -> Self {
        self.mapping_ttl = ttl;
        self
    }

    /// Mapping view over the persistent store.
    pub fn identifier_map(&self) -> IdentifierMap {
        IdentifierMap::new(self.mappings.clone(), &self.source_system, self.mapping_ttl)
    }
}

/// Resources acquired at the start of a run and released at its end.
///
/// In a dry run the target is a shadowing gateway and the mapping store an
/// overlay, so nothing reaches persistent storage while every lookup still
/// sees what earlier importers in the same run produced.
pub struct ImportContext {
    pub source: Arc<dyn SourceConnection>,
    pub target: TargetGateway,
    pub ids: IdentifierMap,
    media: Arc<dyn MediaDownloader>,
    media_base_url: Option<String>,
    download_media: bool,
    dry_run: bool,
    reserved_slugs: Mutex<HashSet<(EntityKind, String)>>,
}

impl ImportContext {
    pub fn open(backends: &Backends, config: &MigrationConfig) -> Self {
        let ids = backends.identifier_map();
        let (target, ids) = if config.dry_run {
            let overlay: Arc<dyn MappingStore> =
                Arc::new(OverlayMappingStore::new(backends.mappings.clone()));
            (
                TargetGateway::dry_run(backends.target.clone()),
                ids.with_store(overlay),
            )
        } else {
            (TargetGateway::live(backends.target.clone()), ids)
        };

        Self {
            source: backends.source.clone(),
            target,
            ids,
            media: backends.media.clone(),
            media_base_url: backends.media_base_url.clone(),
            download_media: config.download_media,
            dry_run: config.dry_run,
            reserved_slugs: Mutex::new(HashSet::new()),
        }
    }

    /// Flush buffered mapping writes.
    pub async fn close(self) -> Result<()> {
        self.ids.flush().await?;
        Ok(())
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Resolve a legacy foreign key through the mapping store.
    pub async fn lookup(&self, namespace: &str, source_id: Option<i64>) -> Result<Option<TargetId>> {
        Ok(self.ids.resolve(namespace, source_id).await?)
    }

    /// Find the target entity a source row was already migrated to.
    ///
    /// A mapping entry is trusted only if its entity still exists; otherwise
    /// each lookup is tried in order. A hit refreshes the mapping.
    pub async fn find_existing(
        &self,
        namespace: &str,
        source_id: i64,
        kind: EntityKind,
        lookups: &[Lookup],
    ) -> Result<Option<TargetId>> {
        if let Some(id) = self.ids.get(namespace, source_id).await? {
            if self.target.get(kind, id).await?.is_some() {
                self.ids.put(namespace, source_id, id).await?;
                return Ok(Some(id));
            }
            debug!(
                "Stale {} mapping for {} -> {}; entity is gone",
                namespace, source_id, id
            );
        }

        for lookup in lookups {
            if let Some(id) = self.target.find(kind, lookup).await? {
                self.ids.put(namespace, source_id, id).await?;
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Create an entity and record its mapping.
    pub async fn persist(
        &self,
        namespace: &str,
        source_id: i64,
        entity: &TargetEntity,
    ) -> Result<TargetId> {
        let id = self.target.create(entity).await?;
        self.ids.put(namespace, source_id, id).await?;
        Ok(id)
    }

    /// Create an entity together with its children in one write, then record
    /// the mappings.
    ///
    /// Children carrying a `(namespace, source_id)` pair get a mapping of
    /// their own. Nothing is mapped unless the whole write succeeded, so a
    /// failed row is retried in full on the next run.
    pub async fn persist_with_children(
        &self,
        namespace: &str,
        source_id: i64,
        entity: &TargetEntity,
        children: &[(TargetEntity, Option<(&str, i64)>)],
    ) -> Result<TargetId> {
        let entities: Vec<TargetEntity> = children.iter().map(|(e, _)| e.clone()).collect();
        let (id, child_ids) = self.target.create_with_children(entity, &entities).await?;

        self.ids.put(namespace, source_id, id).await?;
        for ((_, mapping), child_id) in children.iter().zip(child_ids) {
            if let Some((child_namespace, child_source_id)) = mapping {
                self.ids.put(child_namespace, *child_source_id, child_id).await?;
            }
        }
        Ok(id)
    }

    fn is_reserved(&self, kind: EntityKind, slug: &str) -> bool {
        self.reserved_slugs
            .lock()
            .map(|set| set.contains(&(kind, slug.to_string())))
            .unwrap_or(false)
    }

    fn reserve(&self, kind: EntityKind, slug: &str) {
        if let Ok(mut set) = self.reserved_slugs.lock() {
            set.insert((kind, slug.to_string()));
        }
    }

    /// Slug for `text`, suffixed `-2`, `-3`, ... until unused by persisted
    /// entities and by slugs handed out earlier in this run.
    pub async fn unique_slug(&self, kind: EntityKind, text: &str, fallback: &str) -> Result<String> {
        let mut base = slugify(text);
        if base.is_empty() {
            base = slugify(fallback);
        }
        if base.is_empty() {
            base = kind.as_str().replace('_', "-");
        }

        let mut candidate = base.clone();
        let mut n: u64 = 2;
        loop {
            if !self.is_reserved(kind, &candidate)
                && self
                    .target
                    .find(kind, &Lookup::Slug(candidate.clone()))
                    .await?
                    .is_none()
            {
                self.reserve(kind, &candidate);
                return Ok(candidate);
            }
            let suffix = format!("-{}", n);
            let stem = truncate_chars(&base, SLUG_MAX_LEN.saturating_sub(suffix.len()));
            candidate = format!("{}{}", stem.trim_end_matches('-'), suffix);
            n += 1;
        }
    }

    /// Download a media attribute. Off in dry runs and when disabled.
    pub async fn fetch_media(&self, relative_path: Option<&str>, folder: &str) -> Option<String> {
        let relative_path = relative_path?.trim();
        if relative_path.is_empty() || self.dry_run || !self.download_media {
            return None;
        }
        let Some(base_url) = &self.media_base_url else {
            warn!("Media download requested but no media base URL is configured");
            return None;
        };
        self.media.fetch(base_url, relative_path, folder).await
    }
}
