//! The importer contract and the batch driver shared by all importers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::MigrationConfig;
use super::context::ImportContext;
use super::dependency::Dependency;
use super::error::Result;
use super::outcome::RecordOutcome;
use super::reporter::Reporter;
use super::result::MigrationResult;
use crate::source::{SourceConnection, SourceQuery, SourceRecord};

/// Migrates one entity type end to end.
///
/// Implementations describe their source scan and per-row transform; the
/// default `import` streams the scan through [`drive_records`], which handles
/// batching, resumable windows, per-row error isolation and reporting.
/// Foreign keys are resolved only through [`ImportContext::ids`].
#[async_trait]
pub trait Importer: Send + Sync {
    /// Registry name; also the main mapping namespace.
    fn entity_name(&self) -> &'static str;

    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Mapping namespaces written by this importer.
    fn namespaces(&self) -> Vec<&'static str> {
        vec![self.entity_name()]
    }

    /// The filtered scan, ordered by the legacy primary key.
    fn source_query(&self, config: &MigrationConfig) -> SourceQuery;

    /// Transform and persist one row.
    ///
    /// Returning `Err` marks the row failed; the driver logs it and moves on.
    async fn import_record(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        record: &SourceRecord,
    ) -> Result<RecordOutcome>;

    /// Source rows matching the base filter.
    async fn total_count(&self, ctx: &ImportContext, config: &MigrationConfig) -> Result<u64> {
        Ok(ctx.source.count(&self.source_query(config)).await?)
    }

    /// Main pass. Returns the number of rows processed.
    async fn import(
        &self,
        ctx: &ImportContext,
        config: &MigrationConfig,
        result: &mut MigrationResult,
        reporter: &dyn Reporter,
    ) -> Result<u64> {
        drive_records(self, ctx, config, result, reporter).await
    }

    /// Deferred pass run after the main passes of a run. Returns the number
    /// of entities updated.
    async fn import_secondary(
        &self,
        _ctx: &ImportContext,
        _config: &MigrationConfig,
        _reporter: &dyn Reporter,
    ) -> Result<u64> {
        Ok(0)
    }

    async fn is_completed(&self, ctx: &ImportContext) -> Result<bool> {
        Ok(ctx.ids.is_completed(self.entity_name()).await?)
    }

    async fn mark_completed(&self, ctx: &ImportContext) -> Result<()> {
        Ok(ctx.ids.mark_completed(self.entity_name()).await?)
    }

    /// Discard this importer's mappings and completion marker.
    async fn cleanup(&self, ctx: &ImportContext) -> Result<u64> {
        let mut removed = 0;
        for namespace in self.namespaces() {
            removed += ctx.ids.forget(namespace).await?;
        }
        Ok(removed)
    }
}

/// Offsets and sizes of the chunks covering `[offset, offset + limit)`.
///
/// Chunks never extend past the limit, so a limit that ends mid-chunk stops
/// iteration exactly there.
#[derive(Debug, Clone)]
pub struct RecordWindow {
    next_offset: u64,
    remaining: Option<u64>,
    batch_size: u64,
    exhausted: bool,
}

impl RecordWindow {
    pub fn new(offset: u64, limit: Option<u64>, batch_size: u64) -> Self {
        Self {
            next_offset: offset,
            remaining: limit,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.offset, config.limit, config.batch_size)
    }

    /// Next `(offset, size)` to fetch.
    pub fn next_chunk(&self) -> Option<(u64, u64)> {
        if self.exhausted {
            return None;
        }
        let size = match self.remaining {
            Some(remaining) => self.batch_size.min(remaining),
            None => self.batch_size,
        };
        (size > 0).then_some((self.next_offset, size))
    }

    /// Record that `received` rows came back for a chunk of `requested`.
    /// A short chunk means the source is exhausted.
    pub fn advance(&mut self, received: u64, requested: u64) {
        self.next_offset += received;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(received);
        }
        if received < requested {
            self.exhausted = true;
        }
    }
}

/// Batched full scan of a query, for passes that must see every row
/// regardless of the run's window.
pub struct SourceScan {
    source: Arc<dyn SourceConnection>,
    query: SourceQuery,
    window: RecordWindow,
}

impl SourceScan {
    pub fn new(source: Arc<dyn SourceConnection>, query: SourceQuery, batch_size: u64) -> Self {
        Self {
            source,
            query,
            window: RecordWindow::new(0, None, batch_size),
        }
    }

    pub fn id_column(&self) -> &str {
        &self.query.id_column
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<SourceRecord>>> {
        let Some((offset, size)) = self.window.next_chunk() else {
            return Ok(None);
        };
        let rows = self.source.fetch(&self.query, offset, size).await?;
        self.window.advance(rows.len() as u64, size);
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

/// Stream an importer's source window and record one outcome per row.
pub async fn drive_records<I>(
    importer: &I,
    ctx: &ImportContext,
    config: &MigrationConfig,
    result: &mut MigrationResult,
    reporter: &dyn Reporter,
) -> Result<u64>
where
    I: Importer + ?Sized,
{
    let entity = importer.entity_name();
    let query = importer.source_query(config);

    let total = ctx.source.count(&query).await?;
    let available = total.saturating_sub(config.offset);
    let planned = config.limit.map_or(available, |limit| limit.min(available));
    result.touch(entity);
    reporter.progress(planned);

    let mut window = RecordWindow::from_config(config);
    let mut processed = 0u64;

    while let Some((offset, size)) = window.next_chunk() {
        let mut rows = ctx.source.fetch(&query, offset, size).await?;
        let received = rows.len() as u64;
        rows.truncate(size as usize);
        debug!("{}: fetched {} rows at offset {}", entity, received, offset);

        for row in &rows {
            let source_id = row.id(&query.id_column).ok();
            let outcome = match source_id {
                None => RecordOutcome::failed(format!("row has no {}", query.id_column)),
                Some(id) => match importer.import_record(ctx, config, row).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Failed to import {} {}: {}", entity, id, e);
                        reporter.error(&format!("{} {}: {}", entity, id, e));
                        RecordOutcome::failed(e)
                    }
                },
            };

            if let RecordOutcome::Skipped { reason, .. } = &outcome {
                debug!("Skipped {} {:?}: {}", entity, source_id, reason);
            }
            result.record(entity, source_id, &outcome);
            reporter.advance();
            processed += 1;
        }

        window.advance(received.min(size), size);
    }

    reporter.finish();
    Ok(processed)
}
