//! Write-only reporting seam between the pipeline and whatever tracks runs
//! (web dashboard, CLI, tests). The core pushes status transitions and
//! progress snapshots; it never reads anything back.

use crate::pipeline::run::{RunProgress, RunStatus};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait RunSink: Send + Sync {
    async fn on_status(&self, run_id: Uuid, status: RunStatus);
    async fn on_progress(&self, run_id: Uuid, progress: RunProgress);
}

/// Discards everything. Useful for tests and one-shot CLI runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl RunSink for NullSink {
    async fn on_status(&self, _run_id: Uuid, _status: RunStatus) {}
    async fn on_progress(&self, _run_id: Uuid, _progress: RunProgress) {}
}

/// Logs transitions through `tracing`; the default sink for the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl RunSink for TracingSink {
    async fn on_status(&self, run_id: Uuid, status: RunStatus) {
        info!(run_id = %run_id, status = ?status, "run status changed");
    }

    async fn on_progress(&self, run_id: Uuid, progress: RunProgress) {
        info!(
            run_id = %run_id,
            urls_scraped = progress.urls_scraped,
            images_downloaded = progress.images_downloaded,
            files_processed = progress.files_processed,
            "run progress"
        );
    }
}
