//! Media downloads for avatars, logos, cover images and product images.
//!
//! A failed download only degrades the one attribute it was for: the
//! downloader logs the cause and returns `None`, and the record migrates
//! without it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

/// Errors raised while fetching or storing a media file.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transfers one legacy media file into local storage.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Fetch `relative_path` from `base_url` into `folder`; returns the
    /// stored path, or `None` on any failure.
    async fn fetch(&self, base_url: &str, relative_path: &str, folder: &str) -> Option<String>;
}

/// Downloader used when media transfer is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMediaDownloader;

#[async_trait]
impl MediaDownloader for DisabledMediaDownloader {
    async fn fetch(&self, _base_url: &str, _relative_path: &str, _folder: &str) -> Option<String> {
        None
    }
}

/// Downloads over HTTP and stores files under a media directory.
#[derive(Clone)]
pub struct HttpMediaDownloader {
    client: reqwest::Client,
    media_dir: PathBuf,
}

impl HttpMediaDownloader {
    pub fn new(media_dir: &Path, timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("community-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            media_dir: media_dir.to_path_buf(),
        })
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    async fn try_fetch(
        &self,
        base_url: &str,
        relative_path: &str,
        folder: &str,
    ) -> Result<String, MediaError> {
        let url = media_url(base_url, relative_path)?;
        debug!("Downloading {}", url);

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(MediaError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let content = response.bytes().await?;

        let relative = media_storage_path(folder, &content, file_name(&url));
        let destination = self.media_dir.join(&relative);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&destination, &content).await?;

        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl MediaDownloader for HttpMediaDownloader {
    async fn fetch(&self, base_url: &str, relative_path: &str, folder: &str) -> Option<String> {
        match self.try_fetch(base_url, relative_path, folder).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!("Media download failed for {}: {}", relative_path, e);
                None
            }
        }
    }
}

/// Resolve a legacy media reference against the legacy site's base URL.
///
/// Absolute `http(s)` references are used as-is; relative ones have each
/// path segment percent-encoded.
pub fn media_url(base_url: &str, relative_path: &str) -> Result<Url, MediaError> {
    let relative_path = relative_path.trim();
    if relative_path.starts_with("http://") || relative_path.starts_with("https://") {
        return Url::parse(relative_path).map_err(|e| MediaError::InvalidUrl(e.to_string()));
    }

    let base = format!("{}/", base_url.trim_end_matches('/'));
    let base = Url::parse(&base).map_err(|e| MediaError::InvalidUrl(format!("{}: {}", base, e)))?;

    let encoded: Vec<String> = relative_path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    if encoded.is_empty() {
        return Err(MediaError::InvalidUrl("empty media path".to_string()));
    }

    base.join(&encoded.join("/"))
        .map_err(|e| MediaError::InvalidUrl(e.to_string()))
}

fn file_name(url: &Url) -> &str {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("file")
}

/// Storage path relative to the media directory:
/// `{folder}/{hash[0..2]}/{hash[0..8]}-{name}`.
pub fn media_storage_path(folder: &str, content: &[u8], name: &str) -> PathBuf {
    let hash = hex::encode(Sha256::digest(content));
    let name = urlencoding::decode(name)
        .map(|n| n.into_owned())
        .unwrap_or_else(|_| name.to_string());
    let name: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(100)
        .collect();

    Path::new(folder)
        .join(&hash[..2])
        .join(format!("{}-{}", &hash[..8], name))
}
