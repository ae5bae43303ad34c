//! pressport: migrate web content into a WordPress-importable form.
//!
//! Four-stage pipeline: fetch pages and extract content fragments, resolve
//! and download their images, sanitize and classify the markup, and emit
//! CSV import files. The [`pipeline::Pipeline`] orchestrator sequences the
//! stages, persists artifacts between them for resumable re-runs, and
//! tracks per-item failures without aborting the batch.

pub mod artifacts;
pub mod backoff;
pub mod config;
pub mod fetcher;
pub mod images;
pub mod importer;
pub mod pipeline;
pub mod profile;
pub mod sanitize;
