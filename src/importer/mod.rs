//! Import File Builder: aggregate processed fragments into WordPress-
//! importable CSV files.
//!
//! Column order is a fixed contract with the destination importer:
//! `content_type,title,date,body,source_url`. Records are sorted by source
//! URL so output is diffable across re-runs with the same input set.

use crate::sanitize::{ContentType, ProcessedFragment};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

const CSV_HEADER: &str = "content_type,title,date,body,source_url";
const MAX_ROWS_PER_FILE: usize = 2000;
const MAX_FILE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("no valid records to export")]
    NoValidRecords,

    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the generated import file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub content_type: ContentType,
    pub title: String,
    pub date: String,
    pub body: String,
    pub source_url: Url,
}

impl ImportRecord {
    fn from_fragment(fragment: &ProcessedFragment) -> Self {
        Self {
            content_type: fragment.content_type,
            title: fragment.extracted_title.clone().unwrap_or_default(),
            date: fragment.extracted_date.clone().unwrap_or_default(),
            body: fragment.sanitized_html.clone(),
            source_url: fragment.source_url.clone(),
        }
    }

    fn to_csv_row(&self) -> String {
        [
            self.content_type.as_str(),
            &escape_field(&self.title),
            &escape_field(&self.date),
            &escape_field(&self.body),
            self.source_url.as_str(),
        ]
        .join(",")
    }
}

/// Aggregate counters for one build.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStats {
    pub records_written: usize,
    pub skipped_empty: usize,
    pub files_written: usize,
    pub bytes_written: u64,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub files: Vec<PathBuf>,
    pub stats: FileStats,
}

/// Build the import file(s) for a run.
pub async fn build(
    processed: &[ProcessedFragment],
    out_dir: &Path,
) -> Result<BuildOutcome, GenerateError> {
    build_at(processed, out_dir, Utc::now()).await
}

/// As [`build`], with an explicit generation timestamp (embedded in the
/// output filenames so re-runs never clobber earlier exports).
#[instrument(skip_all, fields(fragments = processed.len()))]
pub async fn build_at(
    processed: &[ProcessedFragment],
    out_dir: &Path,
    generated_at: DateTime<Utc>,
) -> Result<BuildOutcome, GenerateError> {
    let mut stats = FileStats::default();

    let mut records: Vec<ImportRecord> = processed
        .iter()
        .filter(|fragment| {
            if fragment.sanitized_html.trim().is_empty() {
                stats.skipped_empty += 1;
                false
            } else {
                true
            }
        })
        .map(ImportRecord::from_fragment)
        .collect();

    if records.is_empty() {
        return Err(GenerateError::NoValidRecords);
    }

    // Deterministic output order regardless of processing completion order.
    records.sort_by(|a, b| a.source_url.cmp(&b.source_url));

    let mut files = Vec::new();
    let stamp = generated_at.format("%Y-%m-%d-%H%M%S");
    for (index, chunk) in split_rows(&records).into_iter().enumerate() {
        let filename = if index == 0 {
            format!("wordpress-import-{stamp}.csv")
        } else {
            format!("wordpress-import-{stamp}-part{}.csv", index + 1)
        };
        let path = out_dir.join(filename);

        let mut contents = String::with_capacity(chunk.iter().map(String::len).sum::<usize>());
        contents.push_str(CSV_HEADER);
        contents.push('\n');
        for row in &chunk {
            contents.push_str(row);
            contents.push('\n');
        }

        fs::write(&path, &contents).await?;
        stats.bytes_written += contents.len() as u64;
        stats.files_written += 1;
        files.push(path);
    }
    stats.records_written = records.len();

    info!(
        records = stats.records_written,
        skipped = stats.skipped_empty,
        files = stats.files_written,
        "import file generation finished"
    );
    Ok(BuildOutcome { files, stats })
}

/// Greedy split: a new file starts when the current one would exceed the row
/// or byte limit.
fn split_rows(records: &[ImportRecord]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_bytes = CSV_HEADER.len() + 1;

    for record in records {
        let row = record.to_csv_row();
        let row_bytes = row.len() + 1;
        if !current.is_empty()
            && (current.len() >= MAX_ROWS_PER_FILE || current_bytes + row_bytes > MAX_FILE_BYTES)
        {
            chunks.push(std::mem::take(&mut current));
            current_bytes = CSV_HEADER.len() + 1;
        }
        current_bytes += row_bytes;
        current.push(row);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// RFC-4180 style quoting: fields with commas, quotes, or line breaks are
/// wrapped in double quotes, with embedded quotes doubled.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(url: &str, body: &str, content_type: ContentType) -> ProcessedFragment {
        ProcessedFragment {
            source_url: Url::parse(url).unwrap(),
            sanitized_html: body.to_string(),
            content_type,
            extracted_title: Some("A Title".into()),
            extracted_date: Some("2024-01-01".into()),
            size_reduction_pct: 10.0,
        }
    }

    #[test]
    fn escapes_commas_quotes_and_newlines() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn row_has_fixed_column_order() {
        let record = ImportRecord::from_fragment(&processed(
            "https://example.com/a",
            "<p>body, with comma</p>",
            ContentType::Post,
        ));
        let row = record.to_csv_row();
        assert!(row.starts_with("post,A Title,2024-01-01,"));
        assert!(row.ends_with(",https://example.com/a"));
        assert!(row.contains("\"<p>body, with comma</p>\""));
    }

    #[tokio::test]
    async fn output_sorted_by_source_url() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![
            processed("https://example.com/zebra", "<p>z</p>", ContentType::Page),
            processed("https://example.com/apple", "<p>a</p>", ContentType::Post),
            processed("https://example.com/mango", "<p>m</p>", ContentType::Page),
        ];

        let outcome = build(&fragments, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 1);

        let contents = std::fs::read_to_string(&outcome.files[0]).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains("/apple"));
        assert!(lines[2].contains("/mango"));
        assert!(lines[3].contains("/zebra"));
    }

    #[tokio::test]
    async fn empty_bodies_skipped_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![
            processed("https://example.com/a", "<p>content</p>", ContentType::Page),
            processed("https://example.com/b", "   ", ContentType::Page),
        ];

        let outcome = build(&fragments, dir.path()).await.unwrap();
        assert_eq!(outcome.stats.records_written, 1);
        assert_eq!(outcome.stats.skipped_empty, 1);
    }

    #[tokio::test]
    async fn all_empty_is_no_valid_records() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![processed("https://example.com/a", "", ContentType::Page)];
        let err = build(&fragments, dir.path()).await.unwrap_err();
        assert!(matches!(err, GenerateError::NoValidRecords));
    }

    #[tokio::test]
    async fn splits_when_row_limit_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let fragments: Vec<ProcessedFragment> = (0..MAX_ROWS_PER_FILE + 5)
            .map(|i| {
                processed(
                    &format!("https://example.com/p{i:05}"),
                    "<p>x</p>",
                    ContentType::Page,
                )
            })
            .collect();

        let outcome = build(&fragments, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files[1].to_string_lossy().contains("-part2"));
        assert_eq!(outcome.stats.records_written, MAX_ROWS_PER_FILE + 5);
    }

    #[tokio::test]
    async fn filename_embeds_generation_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![processed("https://example.com/a", "<p>a</p>", ContentType::Page)];
        let ts = DateTime::parse_from_rfc3339("2024-06-15T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let outcome = build_at(&fragments, dir.path(), ts).await.unwrap();
        assert!(
            outcome.files[0]
                .to_string_lossy()
                .contains("wordpress-import-2024-06-15-083000.csv")
        );
    }
}
