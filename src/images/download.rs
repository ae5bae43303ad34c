use crate::backoff::retry_delay;
use crate::fetcher::client::get_client;
use crate::images::errors::ImageError;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024; // 20MB

const BACKOFF_BASE_MS: u64 = 500;

/// Download one image with its own timeout and retry budget. Retries only
/// transient classes; a 404 fails immediately.
pub async fn download_image(
    url: &Url,
    timeout: Duration,
    retry_attempts: u32,
) -> Result<Bytes, ImageError> {
    let mut attempt: u32 = 0;
    loop {
        match download_once(url, timeout).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.should_retry() && attempt < retry_attempts => {
                let delay = retry_delay(attempt, BACKOFF_BASE_MS);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying image download after error: {e}"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn download_once(url: &Url, timeout: Duration) -> Result<Bytes, ImageError> {
    let response = get_client()
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(ImageError::from_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ImageError::Http {
            status,
            retriable: status.is_server_error(),
        });
    }

    if let Some(content_length) = response.content_length()
        && content_length > MAX_IMAGE_BYTES
    {
        return Err(ImageError::TooLarge(content_length));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ImageError::Network(e.to_string()))?;

    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge(bytes.len() as u64));
    }

    Ok(bytes)
}
