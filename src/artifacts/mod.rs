//! Durable artifact store shared by all pipeline stages.
//!
//! Layout under one root directory:
//!
//! ```text
//! fetched/<key>.json        one per fetched URL
//! images/<hash>.<ext>       downloaded images
//! images/rewrite-map.json   original -> local URL mapping
//! sanitized/<key>.json      one per processed fragment
//! exports/                  generated import files
//! ```
//!
//! Keys are derived from the URL, so writes are overwrite-by-key and re-runs
//! are idempotent. Nothing here locks: concurrent writers never share a key.

use crate::fetcher::FetchedFragment;
use crate::images::RewriteMap;
use crate::sanitize::ProcessedFragment;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use url::Url;

const REWRITE_MAP_FILE: &str = "rewrite-map.json";
const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Derive the durable artifact key for a URL: a readable slug plus a short
/// hash of the normalized URL. Stable across runs, safe as a filename.
pub fn artifact_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let digest = md5::compute(normalized.as_str().as_bytes());
    let hash = format!("{digest:x}");

    let raw = format!("{}{}", normalized.host_str().unwrap_or(""), normalized.path());
    let mut slug = String::with_capacity(raw.len());
    let mut last_dash = true;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let slug = &slug[..slug.len().min(MAX_SLUG_LEN)];

    format!("{}-{}", slug, &hash[..10])
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory layout. Safe to call repeatedly.
    pub async fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [
            self.fetched_dir(),
            self.images_dir(),
            self.sanitized_dir(),
            self.exports_dir(),
        ] {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
    pub fn fetched_dir(&self) -> PathBuf {
        self.root.join("fetched")
    }
    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }
    pub fn sanitized_dir(&self) -> PathBuf {
        self.root.join("sanitized")
    }
    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    // -- fetched fragments ---------------------------------------------------

    pub async fn write_fragment(&self, fragment: &FetchedFragment) -> Result<PathBuf, StoreError> {
        let key = artifact_key(&fragment.source_url);
        let path = self.fetched_dir().join(format!("{key}.json"));
        write_json(&path, fragment).await?;
        Ok(path)
    }

    pub async fn load_fragments(&self) -> Result<Vec<FetchedFragment>, StoreError> {
        load_all(&self.fetched_dir()).await
    }

    pub async fn count_fetched(&self) -> usize {
        count_json(&self.fetched_dir()).await
    }

    // -- images --------------------------------------------------------------

    pub async fn write_image(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.images_dir().join(filename);
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn write_rewrite_map(&self, map: &RewriteMap) -> Result<(), StoreError> {
        let path = self.images_dir().join(REWRITE_MAP_FILE);
        write_json(&path, map).await
    }

    /// The persisted rewrite map from an earlier run, if any.
    pub async fn load_rewrite_map(&self) -> Result<Option<RewriteMap>, StoreError> {
        let path = self.images_dir().join(REWRITE_MAP_FILE);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn count_images(&self) -> usize {
        let Ok(mut entries) = fs::read_dir(&self.images_dir()).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy() != REWRITE_MAP_FILE {
                count += 1;
            }
        }
        count
    }

    // -- sanitized fragments -------------------------------------------------

    pub async fn write_processed(
        &self,
        fragment: &ProcessedFragment,
    ) -> Result<PathBuf, StoreError> {
        let key = artifact_key(&fragment.source_url);
        let path = self.sanitized_dir().join(format!("{key}.json"));
        write_json(&path, fragment).await?;
        Ok(path)
    }

    pub async fn load_processed(&self) -> Result<Vec<ProcessedFragment>, StoreError> {
        load_all(&self.sanitized_dir()).await
    }

    pub async fn count_sanitized(&self) -> usize {
        count_json(&self.sanitized_dir()).await
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).await?;
    Ok(())
}

/// Load every `.json` artifact in a directory, sorted by filename so callers
/// see a deterministic order regardless of directory enumeration order.
async fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut paths = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read_to_string(&path).await?;
        items.push(serde_json::from_str(&raw)?);
    }
    Ok(items)
}

async fn count_json(dir: &Path) -> usize {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return 0;
    };
    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    count
}
