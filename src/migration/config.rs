//! Execution parameters for a migration run.

use serde::{Deserialize, Serialize};

use super::error::{MigrationError, Result};

/// Default rows fetched per source query.
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Default cap on itemized detail records per entity.
pub const DEFAULT_DETAIL_LIMIT: usize = 1000;

/// Parameters shared by every importer in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched per source query.
    pub batch_size: u64,
    /// Stop after this many rows (resumable window end).
    pub limit: Option<u64>,
    /// Skip this many rows of the ordered source query (window start).
    pub offset: u64,
    /// Make every decision but persist nothing.
    pub dry_run: bool,
    /// Restrict user-owned entities to one legacy user.
    pub user_id_filter: Option<i64>,
    pub download_media: bool,
    /// Keep itemized per-record outcomes.
    pub record_details: bool,
    pub detail_limit: usize,
    /// Re-run entities already marked completed.
    pub force: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            offset: 0,
            dry_run: false,
            user_id_filter: None,
            download_media: false,
            record_details: false,
            detail_limit: DEFAULT_DETAIL_LIMIT,
            force: false,
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MigrationError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.limit == Some(0) {
            return Err(MigrationError::InvalidConfig(
                "limit must be at least 1 when given".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a window that processed `processed` rows of `total` reached
    /// the end of the source.
    pub fn reaches_end(&self, processed: u64, total: u64) -> bool {
        self.window_end(processed) >= total
    }

    /// First row after a window that processed `processed` rows.
    pub fn window_end(&self, processed: u64) -> u64 {
        self.offset.saturating_add(processed)
    }

    /// Whether the window starts inside the rows `[0, cursor)` earlier runs
    /// worked through, leaving no gap before it.
    pub fn continues_from(&self, cursor: u64) -> bool {
        self.offset <= cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(MigrationConfig::default().validate().is_ok());

        let config = MigrationConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MigrationError::InvalidConfig(_))
        ));

        let config = MigrationConfig {
            limit: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reaches_end() {
        let config = MigrationConfig {
            offset: 10,
            limit: Some(10),
            ..Default::default()
        };
        assert!(!config.reaches_end(10, 25));
        assert!(config.reaches_end(10, 20));
        assert!(config.reaches_end(3, 13));
        assert_eq!(config.window_end(3), 13);
    }

    #[test]
    fn test_continues_from() {
        let config = MigrationConfig {
            offset: 3,
            ..Default::default()
        };
        assert!(!config.continues_from(0));
        assert!(config.continues_from(3));
        assert!(config.continues_from(8));
        assert!(MigrationConfig::default().continues_from(0));
    }
}
