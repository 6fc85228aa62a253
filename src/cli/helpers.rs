//! Shared helper functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use community_migrate::config::Settings;
use community_migrate::media::HttpMediaDownloader;
use community_migrate::repository::DbContext;
use community_migrate::source::{MemorySource, SourceConnection, SqliteSource};
use community_migrate::Backends;

/// Whether a source path names a JSON dump rather than a SQLite database.
pub fn is_json_dump(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

async fn open_source(settings: &Settings, required: bool) -> anyhow::Result<Arc<dyn SourceConnection>> {
    let Some(path) = settings.source.as_deref() else {
        if required {
            anyhow::bail!(
                "No legacy source configured. Set `source` in the config file or LEGACY_SOURCE"
            );
        }
        return Ok(Arc::new(MemorySource::new()));
    };

    if is_json_dump(path) {
        let source = MemorySource::from_json_file(path)
            .await
            .with_context(|| format!("Failed to load JSON dump {}", path.display()))?;
        Ok(Arc::new(source))
    } else {
        let source = SqliteSource::open(path)
            .with_context(|| format!("Failed to open legacy database {}", path.display()))?;
        Ok(Arc::new(source))
    }
}

/// Open the target database, creating its schema when missing.
pub async fn open_target(settings: &Settings) -> anyhow::Result<DbContext> {
    if let Some(parent) = settings.target_database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = DbContext::new(&settings.target_database);
    db.init_schema().await.with_context(|| {
        format!(
            "Failed to initialize target database {}",
            settings.target_database.display()
        )
    })?;
    Ok(db)
}

/// Wire source, target, mapping store and media for a run.
///
/// Without `source_required` a missing source falls back to an empty one,
/// which is enough for commands that only touch the mapping store.
pub async fn open_backends(
    settings: &Settings,
    source_required: bool,
    download_media: bool,
) -> anyhow::Result<Backends> {
    let source = open_source(settings, source_required).await?;
    let db = open_target(settings).await?;

    let mut backends = Backends::new(source, Arc::new(db.entities()), Arc::new(db.mappings()))
        .with_source_system(&settings.source_system)
        .with_mapping_ttl(settings.mapping_ttl());

    if download_media {
        if settings.media_base_url.is_none() {
            tracing::warn!("Media downloads enabled without media_base_url; relative paths will be skipped");
        }
        std::fs::create_dir_all(&settings.media_dir)?;
        let downloader = HttpMediaDownloader::new(&settings.media_dir, settings.request_timeout())?;
        backends = backends.with_media(Arc::new(downloader), settings.media_base_url.clone());
    }

    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_json_dump() {
        assert!(is_json_dump(Path::new("dump.json")));
        assert!(is_json_dump(Path::new("/tmp/DUMP.JSON")));
        assert!(!is_json_dump(Path::new("legacy.db")));
        assert!(!is_json_dump(Path::new("legacy")));
    }
}
