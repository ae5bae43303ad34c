//! Image Resolver stage: find, dedupe, download, and (optionally) transcode
//! every image referenced by the fetched fragments, producing the URL rewrite
//! map the sanitizer consumes.

pub mod collect;
pub mod download;
pub mod errors;
pub mod transcode;
pub mod types;

pub use errors::ImageError;
pub use transcode::{DecodeTranscoder, ImageTranscoder};
pub use types::{ImageFormat, ImageRef, RewriteMap};

use crate::artifacts::ArtifactStore;
use crate::fetcher::FetchedFragment;
use crate::pipeline::ItemFailure;
use crate::profile::ImagePolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;

/// Result of the image stage. Failed images are recorded here and excluded
/// from the map; their references stay unrewritten downstream.
#[derive(Debug, Default)]
pub struct ImageOutcome {
    pub map: RewriteMap,
    pub errors: Vec<ItemFailure>,
}

/// Resolve all images referenced by `fragments` under a bounded worker pool.
///
/// Filenames are content-derived (hash of the normalized URL), so re-runs and
/// concurrent retries write the same bytes to the same key and never race.
#[instrument(skip_all, fields(fragments = fragments.len(), max_concurrent = policy.max_concurrent))]
pub async fn resolve(
    fragments: &[FetchedFragment],
    policy: &ImagePolicy,
    store: &ArtifactStore,
    public_base: &str,
    transcoder: Arc<dyn ImageTranscoder>,
    cancel: &CancellationToken,
) -> ImageOutcome {
    let mut outcome = ImageOutcome::default();

    if !policy.enabled {
        info!("image policy disabled, skipping image resolution");
        return outcome;
    }

    let urls = collect::collect_image_urls(fragments);
    info!(unique_images = urls.len(), "collected image references");

    let semaphore = Arc::new(Semaphore::new(policy.max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for url in urls {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let policy = policy.clone();
        let store = store.clone();
        let public_base = public_base.to_string();
        let transcoder = transcoder.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let result = resolve_one(&url, &policy, &store, &public_base, &*transcoder).await;
            (url, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_url, Ok(image))) => outcome.map.insert(image),
            Ok((url, Err(e))) => outcome.errors.push(ItemFailure::new(url, e)),
            Err(e) => warn!("image task panicked: {e}"),
        }
    }

    if let Err(e) = store.write_rewrite_map(&outcome.map).await {
        outcome
            .errors
            .push(ItemFailure::new("rewrite-map.json", e));
    }

    info!(
        downloaded = outcome.map.len(),
        failed = outcome.errors.len(),
        "image stage finished"
    );
    outcome
}

/// Download + format-check + optional transcode for one unique image URL.
async fn resolve_one(
    url: &Url,
    policy: &ImagePolicy,
    store: &ArtifactStore,
    public_base: &str,
    transcoder: &dyn ImageTranscoder,
) -> Result<ImageRef, ImageError> {
    let timeout = Duration::from_secs(policy.timeout_secs);
    let bytes = download::download_image(url, timeout, policy.retry_attempts).await?;

    let format = ImageFormat::detect(&bytes, url.path()).ok_or(ImageError::UnknownFormat)?;

    let (stored_bytes, stored_format) = if format == ImageFormat::Avif && policy.auto_convert_avif
    {
        (transcoder.to_jpeg(&bytes)?, ImageFormat::Jpeg)
    } else if format.allowed_by(&policy.allowed_formats) {
        (bytes.to_vec(), format)
    } else {
        return Err(ImageError::FormatRejected(format.extension().to_string()));
    };

    let digest = md5::compute(url.as_str().as_bytes());
    let filename = format!("{digest:x}.{}", stored_format.extension());

    let local_path = store
        .write_image(&filename, &stored_bytes)
        .await
        .map_err(|e| ImageError::Io(e.to_string()))?;

    Ok(ImageRef {
        original_url: url.to_string(),
        local_path,
        new_public_url: public_url(public_base, &filename),
        format: stored_format,
        bytes: stored_bytes.len() as u64,
    })
}

fn public_url(base: &str, filename: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_joins_without_double_slash() {
        assert_eq!(
            public_url("/wp-content/uploads/", "abc.jpg"),
            "/wp-content/uploads/abc.jpg"
        );
        assert_eq!(
            public_url("https://cdn.example.com/u", "abc.jpg"),
            "https://cdn.example.com/u/abc.jpg"
        );
    }
}
