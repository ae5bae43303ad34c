use async_trait::async_trait;
use pressport::config::Config;
use pressport::images::{ImageError, ImageTranscoder};
use pressport::pipeline::{Pipeline, RunProgress, RunRequest, RunSink, RunStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\npixels";

fn article_page(slug: &str) -> String {
    format!(
        "<html><body>\
         <article>\
         <h1>Story {slug}</h1>\
         <time datetime=\"2024-03-01\">March 1, 2024</time>\
         <p>Body text for {slug}.</p>\
         <img src=\"/img/photo.png\">\
         </article>\
         </body></html>"
    )
}

fn html_response(body: String) -> ResponseTemplate {
    // set_body_raw carries the content-type with the body; a separate header
    // would be shadowed by wiremock's text/plain default.
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    Config::default()
        .with_data_dir(dir.path())
        .with_backoff_ms(5)
        .with_fetch_retries(1)
}

#[derive(Default)]
struct RecordingSink {
    statuses: Mutex<Vec<RunStatus>>,
}

#[async_trait]
impl RunSink for RecordingSink {
    async fn on_status(&self, _run_id: Uuid, status: RunStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    async fn on_progress(&self, _run_id: Uuid, _progress: RunProgress) {}
}

struct JpegStub;

impl ImageTranscoder for JpegStub {
    fn to_jpeg(&self, _bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
        Ok(b"\xFF\xD8\xFF\xE0stub-jpeg".to_vec())
    }
}

async fn mount_pages(server: &MockServer, slugs: &[&str]) {
    for slug in slugs {
        Mock::given(method("GET"))
            .and(path(format!("/{slug}")))
            .respond_with(html_response(article_page(slug)))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn full_run_produces_import_file() {
    let server = MockServer::start().await;
    mount_pages(&server, &["post-one", "post-two"]).await;
    // Both pages reference the same image; it must download exactly once.
    Mock::given(method("GET"))
        .and(path("/img/photo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_MAGIC.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(test_config(&dir)).with_sink(sink.clone());

    let request = RunRequest::new(vec![
        format!("{}/post-one", server.uri()),
        format!("{}/post-two", server.uri()),
    ]);
    let summary = pipeline.run(request).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.metrics.urls_scraped, 2);
    assert_eq!(summary.metrics.images_downloaded, 1);
    assert_eq!(summary.metrics.files_processed, 2);
    assert_eq!(summary.export_files.len(), 1);

    let csv = std::fs::read_to_string(&summary.export_files[0]).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "content_type,title,date,body,source_url"
    );
    assert!(csv.contains("Story post-one"));
    assert!(csv.contains("2024-03-01"));
    assert!(csv.contains("/wp-content/uploads/"));
    assert!(csv.contains("/post-one"));
    assert!(csv.contains("/post-two"));

    let statuses = sink.statuses.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec![
            RunStatus::Pending,
            RunStatus::Fetching,
            RunStatus::Imaging,
            RunStatus::Processing,
            RunStatus::Generating,
            RunStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn bypass_images_leaves_references_untouched() {
    let server = MockServer::start().await;
    mount_pages(&server, &["post-one"]).await;
    // No image mock: nothing may request /img/photo.png.

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&dir));

    let mut request = RunRequest::new(vec![format!("{}/post-one", server.uri())]);
    request.bypass_images = true;
    let summary = pipeline.run(request).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.metrics.images_downloaded, 0);

    let csv = std::fs::read_to_string(&summary.export_files[0]).unwrap();
    assert!(csv.contains("/img/photo.png"));
    assert!(!csv.contains("/wp-content/uploads/"));
}

#[tokio::test]
async fn all_fetch_failures_fail_the_run() {
    let server = MockServer::start().await;
    // No mocks: every page request gets a 404.

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(test_config(&dir)).with_sink(sink.clone());

    let request = RunRequest::new(vec![
        format!("{}/gone-one", server.uri()),
        format!("{}/gone-two", server.uri()),
    ]);
    let summary = pipeline.run(request).await.unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.metrics.urls_failed, 2);
    assert!(summary.export_files.is_empty());
    let cause = summary.failure_cause.unwrap();
    assert!(cause.contains("fetch"));
    assert!(cause.contains("404"));

    let statuses = sink.statuses.lock().unwrap().clone();
    assert_eq!(statuses.last(), Some(&RunStatus::Failed));
}

#[tokio::test]
async fn partial_fetch_failure_still_completes() {
    let server = MockServer::start().await;
    mount_pages(&server, &["post-one"]).await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&dir));

    let mut request = RunRequest::new(vec![
        format!("{}/post-one", server.uri()),
        format!("{}/gone", server.uri()),
    ]);
    request.bypass_images = true;
    let summary = pipeline.run(request).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.metrics.urls_scraped, 1);
    assert_eq!(summary.metrics.urls_failed, 1);
    assert_eq!(summary.failures.fetch.len(), 1);
    assert_eq!(summary.metrics.error_count, 1);
}

#[tokio::test]
async fn skip_fetch_reuses_persisted_artifacts() {
    let server = MockServer::start().await;
    for slug in ["post-one", "post-two"] {
        Mock::given(method("GET"))
            .and(path(format!("/{slug}")))
            .respond_with(html_response(article_page(slug)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let urls = vec![
        format!("{}/post-one", server.uri()),
        format!("{}/post-two", server.uri()),
    ];

    let pipeline = Pipeline::new(test_config(&dir));
    let mut first = RunRequest::new(urls.clone());
    first.bypass_images = true;
    let summary = pipeline.run(first).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);

    // Fresh pipeline over the same data dir, fetch stage skipped. The
    // expect(1) mocks above prove nothing is re-fetched.
    let pipeline = Pipeline::new(test_config(&dir));
    let existing = pipeline.existing_artifacts().await;
    assert_eq!(existing.fetched, 2);

    let mut second = RunRequest::new(urls);
    second.skip_fetch = true;
    second.bypass_images = true;
    let summary = pipeline.run(second).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.metrics.urls_scraped, 2);
    assert_eq!(summary.metrics.files_processed, 2);
}

#[tokio::test]
async fn cancellation_finishes_in_flight_and_fails_the_run() {
    let server = MockServer::start().await;
    for slug in ["slow-one", "slow-two", "slow-three"] {
        Mock::given(method("GET"))
            .and(path(format!("/{slug}")))
            .respond_with(html_response(article_page(slug)).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Arc::new(Pipeline::new(test_config(&dir)).with_sink(sink.clone()));
    let cancel = pipeline.cancellation_token();

    let mut request = RunRequest::new(vec![
        format!("{}/slow-one", server.uri()),
        format!("{}/slow-two", server.uri()),
        format!("{}/slow-three", server.uri()),
    ]);
    request.bypass_images = true;

    let run = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run(request).await }
    });

    // Cancel once the first fetch is in flight (its response is delayed).
    for _ in 0..100 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.failure_cause.unwrap().contains("cancelled"));
    // The in-flight item finished; the remaining two never started.
    assert_eq!(summary.metrics.urls_scraped, 1);

    let statuses = sink.statuses.lock().unwrap().clone();
    assert_eq!(statuses.last(), Some(&RunStatus::Failed));
    assert!(!statuses.contains(&RunStatus::Processing));
}

#[tokio::test]
async fn avif_reference_rewritten_to_jpeg_url() {
    let server = MockServer::start().await;
    let page = "<html><body><article><h1>Hero</h1>\
                <p>text</p><img src=\"/img/hero.avif\"></article></body></html>";
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html_response(page.to_string()))
        .mount(&server)
        .await;
    let mut avif = vec![0, 0, 0, 32];
    avif.extend_from_slice(b"ftypavif");
    avif.extend_from_slice(&[0u8; 24]);
    Mock::given(method("GET"))
        .and(path("/img/hero.avif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(avif))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&dir)).with_transcoder(Arc::new(JpegStub));

    let request = RunRequest::new(vec![format!("{}/post", server.uri())]);
    let summary = pipeline.run(request).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.metrics.images_downloaded, 1);

    let csv = std::fs::read_to_string(&summary.export_files[0]).unwrap();
    assert!(csv.contains(".jpg"));
    assert!(!csv.contains("hero.avif"));
}
