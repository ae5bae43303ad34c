//! Pipeline Orchestrator: sequences the four stages, tracks per-item
//! failures, decides skip/resume/abort at each stage boundary, and produces
//! the run summary.
//!
//! Failure policy: item-level errors accumulate in [`RunFailures`] and never
//! halt the run. A stage is fatal only when it yields zero usable outputs
//! from a non-empty input set, except images, which by contract never block
//! the pipeline.

pub mod run;
pub mod sink;

pub use run::{
    ExistingArtifacts, ItemFailure, RunContentType, RunFailures, RunMetrics, RunProgress,
    RunRequest, RunStatus, RunSummary,
};
pub use sink::{NullSink, RunSink, TracingSink};

use crate::artifacts::{ArtifactStore, StoreError};
use crate::config::Config;
use crate::fetcher::{self, FetchOptions, FetchedFragment};
use crate::images::{self, DecodeTranscoder, ImageTranscoder, RewriteMap};
use crate::importer;
use crate::profile::{ClassifierRules, ImagePolicy, SelectorChain};
use crate::sanitize::{self, ProcessOptions, ProcessedFragment};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Infrastructure-level failures. Stage-fatal outcomes are not errors: they
/// come back as a summary with [`RunStatus::Failed`] and a structured cause.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The migration pipeline, configured once and reusable across runs.
pub struct Pipeline {
    config: Config,
    store: ArtifactStore,
    transcoder: Arc<dyn ImageTranscoder>,
    sink: Arc<dyn RunSink>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let store = ArtifactStore::new(config.data_dir().clone());
        Self {
            config,
            store,
            transcoder: Arc::new(DecodeTranscoder),
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn ImageTranscoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Token the caller can use to stop the run: no new items start, in-flight
    /// items finish, and the run terminates as `Failed` with a cancel cause.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Durable artifacts already present per stage, so an interactive caller
    /// can decide skip flags before starting the run.
    pub async fn existing_artifacts(&self) -> ExistingArtifacts {
        ExistingArtifacts {
            fetched: self.store.count_fetched().await,
            images: self.store.count_images().await,
            sanitized: self.store.count_sanitized().await,
        }
    }

    /// Execute one run to a terminal state. Every stage persists its
    /// artifacts before the next begins, so a crashed or cancelled run can be
    /// resumed with the corresponding skip flags.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();

        self.store.ensure_layout().await?;
        self.sink.on_status(run_id, RunStatus::Pending).await;

        let mut state = RunState::new(run_id, started_at);

        // -- stage 1: fetch --------------------------------------------------
        self.sink.on_status(run_id, RunStatus::Fetching).await;
        let fragments = self.fetch_stage(&request, &mut state).await?;
        if fragments.is_empty() && !request.urls.is_empty() {
            return Ok(self
                .finish_failed(state, "fetch", request.urls.len())
                .await);
        }
        state.urls_scraped = fragments.len();
        self.report_progress(run_id, &state).await;
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(state).await);
        }

        // -- stage 2: images -------------------------------------------------
        let rewrite_map = if request.bypass_images {
            info!("image stage bypassed by request");
            RewriteMap::default()
        } else {
            self.sink.on_status(run_id, RunStatus::Imaging).await;
            self.image_stage(&request, &fragments, &mut state).await?
        };
        state.images_downloaded = rewrite_map.len();
        self.report_progress(run_id, &state).await;
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(state).await);
        }

        // -- stage 3: sanitize/classify --------------------------------------
        self.sink.on_status(run_id, RunStatus::Processing).await;
        let fragment_count = fragments.len();
        let processed = self
            .sanitize_stage(&request, fragments, rewrite_map, &mut state)
            .await?;
        if processed.is_empty() && fragment_count > 0 {
            return Ok(self.finish_failed(state, "sanitize", fragment_count).await);
        }
        state.files_processed = processed.len();
        state.posts_detected = processed
            .iter()
            .filter(|p| p.content_type == sanitize::ContentType::Post)
            .count();
        state.pages_detected = processed.len() - state.posts_detected;
        self.report_progress(run_id, &state).await;
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(state).await);
        }

        // -- stage 4: generate -----------------------------------------------
        self.sink.on_status(run_id, RunStatus::Generating).await;
        if !request.skip_generate {
            match importer::build(&processed, &self.store.exports_dir()).await {
                Ok(outcome) => {
                    state.skipped_empty = outcome.stats.skipped_empty;
                    state.export_files = outcome.files;
                }
                Err(e) => {
                    state
                        .failures
                        .generate
                        .push(ItemFailure::new("import-file", &e));
                    return Ok(self.finish_failed(state, "generate", processed.len()).await);
                }
            }
        }

        Ok(self.finish_completed(state).await)
    }

    async fn fetch_stage(
        &self,
        request: &RunRequest,
        state: &mut RunState,
    ) -> Result<Vec<FetchedFragment>, RunError> {
        if request.skip_fetch {
            let fragments = self.store.load_fragments().await?;
            info!(count = fragments.len(), "reusing fetched artifacts");
            return Ok(fragments);
        }

        let chain = self.selector_chain(request);
        let opts = FetchOptions {
            concurrency: self.config.fetch_concurrency(),
            max_retries: self.config.fetch_retries(),
            backoff_ms: self.config.backoff_ms(),
        };
        let outcome =
            fetcher::fetch_all(&request.urls, &chain, &self.store, &opts, &self.cancel).await;
        state.failures.fetch = outcome.errors;
        Ok(outcome.fragments)
    }

    async fn image_stage(
        &self,
        request: &RunRequest,
        fragments: &[FetchedFragment],
        state: &mut RunState,
    ) -> Result<RewriteMap, RunError> {
        if request.skip_images {
            let map = self.store.load_rewrite_map().await?.unwrap_or_default();
            info!(count = map.len(), "reusing persisted rewrite map");
            return Ok(map);
        }

        let policy = request
            .profile
            .as_ref()
            .map(|p| p.image_policy.clone())
            .unwrap_or_else(ImagePolicy::default);

        let outcome = images::resolve(
            fragments,
            &policy,
            &self.store,
            self.config.public_base(),
            self.transcoder.clone(),
            &self.cancel,
        )
        .await;
        state.failures.images = outcome.errors;
        Ok(outcome.map)
    }

    async fn sanitize_stage(
        &self,
        request: &RunRequest,
        fragments: Vec<FetchedFragment>,
        rewrite_map: RewriteMap,
        state: &mut RunState,
    ) -> Result<Vec<ProcessedFragment>, RunError> {
        if request.skip_sanitize {
            let processed = self.store.load_processed().await?;
            info!(count = processed.len(), "reusing sanitized artifacts");
            return Ok(processed);
        }

        let (post_rules, page_rules) = match &request.profile {
            Some(profile) => (profile.post_rules.clone(), profile.page_rules.clone()),
            None => (ClassifierRules::default(), ClassifierRules::default()),
        };

        let mut remove_selectors = request
            .profile
            .as_ref()
            .map(|p| p.remove_selectors.clone())
            .unwrap_or_default();
        remove_selectors.extend(request.custom_remove_selectors.iter().cloned());

        let opts = ProcessOptions {
            workers: self.config.sanitize_workers(),
            declared_type: request.content_type,
            remove_selectors,
            remove_all_classes: request.remove_all_classes,
            keep_ids: request.keep_ids,
        };

        let outcome = sanitize::process_all(
            fragments,
            Arc::new(rewrite_map),
            Arc::new(post_rules),
            Arc::new(page_rules),
            &opts,
            &self.store,
            &self.cancel,
        )
        .await;
        state.failures.sanitize = outcome.errors;
        Ok(outcome.processed)
    }

    /// Run-level custom selectors take precedence over the profile's chain.
    fn selector_chain(&self, request: &RunRequest) -> SelectorChain {
        if let Some(chain) = &request.custom_selectors
            && !chain.is_empty()
        {
            return chain.clone();
        }
        request
            .profile
            .as_ref()
            .map(|p| p.extraction.clone())
            .unwrap_or_default()
    }

    async fn report_progress(&self, run_id: Uuid, state: &RunState) {
        self.sink
            .on_progress(
                run_id,
                RunProgress {
                    urls_scraped: state.urls_scraped,
                    images_downloaded: state.images_downloaded,
                    files_processed: state.files_processed,
                },
            )
            .await;
    }

    async fn finish_completed(&self, state: RunState) -> RunSummary {
        self.sink.on_status(state.run_id, RunStatus::Completed).await;
        state.into_summary(RunStatus::Completed, None)
    }

    async fn finish_cancelled(&self, state: RunState) -> RunSummary {
        error!("run cancelled by operator");
        self.sink.on_status(state.run_id, RunStatus::Failed).await;
        state.into_summary(RunStatus::Failed, Some("run cancelled by operator".into()))
    }

    async fn finish_failed(
        &self,
        state: RunState,
        stage: &'static str,
        attempted: usize,
    ) -> RunSummary {
        let cause = state.failure_cause(stage, attempted);
        error!(stage, attempted, "stage produced no output, halting run");
        self.sink.on_status(state.run_id, RunStatus::Failed).await;
        state.into_summary(RunStatus::Failed, Some(cause))
    }
}

/// Mutable accumulator for one run, folded into the summary at the end.
struct RunState {
    run_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    failures: RunFailures,
    urls_scraped: usize,
    images_downloaded: usize,
    files_processed: usize,
    posts_detected: usize,
    pages_detected: usize,
    skipped_empty: usize,
    export_files: Vec<std::path::PathBuf>,
}

impl RunState {
    fn new(run_id: Uuid, started_at: chrono::DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            failures: RunFailures::default(),
            urls_scraped: 0,
            images_downloaded: 0,
            files_processed: 0,
            posts_detected: 0,
            pages_detected: 0,
            skipped_empty: 0,
            export_files: Vec::new(),
        }
    }

    /// Structured cause for a stage-fatal halt: which stage, how many items,
    /// and the first few error messages.
    fn failure_cause(&self, stage: &str, attempted: usize) -> String {
        let stage_failures = match stage {
            "fetch" => &self.failures.fetch,
            "images" => &self.failures.images,
            "sanitize" => &self.failures.sanitize,
            _ => &self.failures.generate,
        };
        let first_errors: Vec<String> = stage_failures
            .iter()
            .take(3)
            .map(|f| format!("{}: {}", f.item, f.message))
            .collect();
        format!(
            "stage '{stage}' produced no output from {attempted} items; first errors: [{}]",
            first_errors.join("; ")
        )
    }

    fn into_summary(self, status: RunStatus, failure_cause: Option<String>) -> RunSummary {
        let finished_at = Utc::now();
        let metrics = RunMetrics {
            urls_scraped: self.urls_scraped,
            urls_failed: self.failures.fetch.len(),
            images_downloaded: self.images_downloaded,
            images_failed: self.failures.images.len(),
            files_processed: self.files_processed,
            files_failed: self.failures.sanitize.len() + self.skipped_empty,
            posts_detected: self.posts_detected,
            pages_detected: self.pages_detected,
            total_duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            error_count: self.failures.total(),
        };
        RunSummary {
            run_id: self.run_id,
            status,
            started_at: self.started_at,
            finished_at,
            metrics,
            failures: self.failures,
            failure_cause,
            export_files: self.export_files,
        }
    }
}
