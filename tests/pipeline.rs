//! Pipeline integration tests.
//!
//! Pages are synthesised PNG files and the model is a scripted
//! [`VisionBackend`], so these tests need neither pdfium nor network access.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_pdfocr::{
    extract, extract_to_file, AggregateResult, DocumentSource, ErrorKind, ExtractionError, Mode,
    OcrConfig, OcrError, OcrProgressCallback, TransportError, VisionBackend, VisionReply,
    VisionRequest,
};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    Fail(&'static str),
}

/// Answers by page number, read back from the page-qualified prompt.
#[derive(Default)]
struct PageScript {
    replies: HashMap<usize, Reply>,
    delays: HashMap<usize, Duration>,
    calls: Mutex<Vec<(usize, bool)>>,
}

impl PageScript {
    fn new(replies: &[(usize, Reply)]) -> Self {
        Self {
            replies: replies.iter().cloned().collect(),
            ..Default::default()
        }
    }

    fn with_delay(mut self, page: usize, ms: u64) -> Self {
        self.delays.insert(page, Duration::from_millis(ms));
        self
    }

    fn called_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.calls.lock().unwrap().iter().map(|c| c.0).collect();
        pages.sort_unstable();
        pages
    }
}

fn page_of(prompt: &str) -> usize {
    prompt
        .strip_prefix("This is page ")
        .and_then(|rest| rest.split(' ').next())
        .and_then(|n| n.parse().ok())
        .expect("page-qualified prompt")
}

#[async_trait]
impl VisionBackend for PageScript {
    fn name(&self) -> &str {
        "page-script"
    }

    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply, TransportError> {
        let page = page_of(&request.prompt);
        self.calls
            .lock()
            .unwrap()
            .push((page, request.json_response));
        if let Some(delay) = self.delays.get(&page) {
            tokio::time::sleep(*delay).await;
        }
        match self.replies.get(&page) {
            Some(Reply::Text(text)) => Ok(VisionReply {
                content: Some(text.to_string()),
                prompt_tokens: Some(100),
                completion_tokens: Some(20),
            }),
            Some(Reply::Fail(reason)) => Err(TransportError(reason.to_string())),
            None => Err(TransportError(format!("no reply scripted for page {page}"))),
        }
    }
}

/// Write `count` small PNG pages into `dir`.
fn png_pages(dir: &Path, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let path = dir.join(format!("scan_{i}.png"));
            RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]))
                .save(&path)
                .unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect()
}

fn config(prompt: &str, backend: Arc<PageScript>) -> OcrConfig {
    OcrConfig::builder()
        .prompt(prompt)
        .backend(backend)
        .build()
        .unwrap()
}

// ── Table mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn table_run_skips_malformed_page_and_writes_csv() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 3);
    let backend = Arc::new(PageScript::new(&[
        (1, Reply::Text(r#"{"columns":["A","B"],"rows":[["1","2"]]}"#)),
        (2, Reply::Text("Sorry, I cannot see a table here.")),
        (3, Reply::Text(r#"[{"B":"4","A":"3"}]"#)),
    ]));

    let source = DocumentSource::Images(images);
    let saved = extract_to_file(&source, &config("Extract the table", backend.clone()))
        .await
        .unwrap();

    assert_eq!(saved.path, dir.path().join("scan_1.csv"));
    assert_eq!(saved.mode, Mode::Table);
    assert_eq!(
        std::fs::read_to_string(&saved.path).unwrap(),
        "A,B\n1,2\n3,4\n"
    );
    assert_eq!(saved.warnings.len(), 1);
    assert_eq!(saved.warnings[0].page, 2);
    assert_eq!(saved.stats.processed_pages, 3);
    assert_eq!(saved.stats.skipped_pages, 1);
    assert_eq!(saved.stats.total_rows, 2);
    assert_eq!(saved.stats.total_prompt_tokens, 300);
    assert!(backend.calls.lock().unwrap().iter().all(|(_, json)| *json));
}

#[tokio::test]
async fn first_parseable_page_fixes_schema() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 2);
    let backend = Arc::new(PageScript::new(&[
        (
            1,
            Reply::Text("```json\n{\"columns\":[\"Name\",\"Amount\"],\"rows\":[[\"X\",\"5\"]]}\n```"),
        ),
        (
            2,
            Reply::Text(r#"[{"Amount":"10","Name":"A","Currency":"EUR"}]"#),
        ),
    ]));

    let output = extract(
        &DocumentSource::Images(images),
        &config("Extract the table", backend),
    )
    .await
    .unwrap();

    assert_eq!(
        output.result,
        AggregateResult::Table {
            columns: vec!["Name".into(), "Amount".into()],
            rows: vec![
                vec!["X".into(), "5".into()],
                vec!["A".into(), "10".into()],
            ],
        }
    );
    assert!(output.warnings.is_empty());
}

#[tokio::test]
async fn explicit_table_mode_overrides_prompt() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 1);
    let backend = Arc::new(PageScript::new(&[(
        1,
        Reply::Text(r#"{"columns":["Item"],"rows":[["pen"]]}"#),
    )]));

    let config = OcrConfig::builder()
        .prompt("Read the receipt")
        .mode(Mode::Table)
        .backend(backend.clone())
        .build()
        .unwrap();
    let output = extract(&DocumentSource::Images(images), &config)
        .await
        .unwrap();

    assert_eq!(output.mode, Mode::Table);
    assert_eq!(output.result.row_count(), 1);
    assert_eq!(backend.calls.lock().unwrap()[0], (1, true));
}

#[tokio::test]
async fn table_run_without_any_table_writes_empty_csv() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 2);
    let backend = Arc::new(PageScript::new(&[
        (1, Reply::Text("no table")),
        (2, Reply::Text(r#"{"columns":[],"rows":[]}"#)),
    ]));

    let saved = extract_to_file(
        &DocumentSource::Images(images),
        &config("Extract the table", backend),
    )
    .await
    .unwrap();

    assert_eq!(saved.path, dir.path().join("scan_1.csv"));
    assert_eq!(std::fs::read(&saved.path).unwrap(), b"");
    assert_eq!(
        saved.warnings.iter().map(|w| w.page).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(saved.stats.processed_pages, 2);
    assert_eq!(saved.stats.skipped_pages, 2);
    assert_eq!(saved.stats.total_rows, 0);
}

// ── Text mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_run_writes_one_section_per_page() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 3);
    let backend = Arc::new(PageScript::new(&[
        (1, Reply::Text("Intro paragraph.")),
        (2, Reply::Text("## Findings\n- one\n- two\n")),
        (3, Reply::Text("Closing words.")),
    ]));

    let source = DocumentSource::Images(images);
    let saved = extract_to_file(&source, &config("Transcribe the pages", backend.clone()))
        .await
        .unwrap();

    assert_eq!(saved.path, dir.path().join("scan_1.md"));
    let md = std::fs::read_to_string(&saved.path).unwrap();
    assert_eq!(
        md,
        "# Page 1\n\nIntro paragraph.\n\n---\n\n\
         # Page 2\n\n## Findings\n- one\n- two\n\n---\n\n\
         # Page 3\n\nClosing words.\n"
    );
    assert_eq!(md.matches("# Page ").count(), 3);
    assert!(backend.calls.lock().unwrap().iter().all(|(_, json)| !*json));
}

#[tokio::test]
async fn empty_text_response_is_fatal_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 1);
    let backend = Arc::new(PageScript::new(&[(1, Reply::Text("   \n"))]));

    let err = extract_to_file(
        &DocumentSource::Images(images),
        &config("Transcribe", backend),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        OcrError::Extraction(ExtractionError::EmptyResponse { page: 1 })
    ));
    assert_eq!(err.kind(), ErrorKind::Extraction);
    assert!(!dir.path().join("scan_1.md").exists());
}

#[tokio::test]
async fn transport_failure_aborts_remaining_pages() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 3);
    let backend = Arc::new(PageScript::new(&[
        (1, Reply::Text("fine")),
        (2, Reply::Fail("401 Unauthorized")),
        (3, Reply::Text("never reached")),
    ]));

    let err = extract_to_file(
        &DocumentSource::Images(images),
        &config("Transcribe", backend.clone()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        OcrError::Extraction(ExtractionError::Transport { page: 2, .. })
    ));
    assert_eq!(backend.called_pages(), vec![1, 2]);
    assert!(!dir.path().join("scan_1.md").exists());
}

// ── Ordering, progress, sink ─────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl OcrProgressCallback for Recorder {
    fn on_run_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, rows: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("page {page_num} rows {rows}"));
    }

    fn on_page_skipped(&self, page_num: usize, _total: usize, _reason: &str) {
        self.events.lock().unwrap().push(format!("skip {page_num}"));
    }

    fn on_run_complete(&self, total_pages: usize, skipped_pages: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {total_pages} {skipped_pages}"));
    }
}

#[tokio::test]
async fn concurrent_pages_merge_in_page_order() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 3);
    // Page 1 finishes last, page 3 first.
    let backend = Arc::new(
        PageScript::new(&[
            (1, Reply::Text(r#"{"columns":["N"],"rows":[["1"]]}"#)),
            (2, Reply::Text("garbled")),
            (3, Reply::Text(r#"{"columns":["Other"],"rows":[["3"],["3b"]]}"#)),
        ])
        .with_delay(1, 150)
        .with_delay(2, 50),
    );
    let recorder = Arc::new(Recorder::default());

    let config = OcrConfig::builder()
        .prompt("Extract the table")
        .backend(backend)
        .concurrency(3)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let output = extract(&DocumentSource::Images(images), &config)
        .await
        .unwrap();

    assert_eq!(
        output.result,
        AggregateResult::Table {
            columns: vec!["N".into()],
            rows: vec![vec!["1".into()], vec!["3".into()], vec!["3b".into()]],
        }
    );
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "start 3",
            "page 1 rows 1",
            "skip 2",
            "page 3 rows 2",
            "done 3 1"
        ]
    );
}

#[tokio::test]
async fn explicit_output_is_created_and_rewritten_identically() {
    let dir = TempDir::new().unwrap();
    let images = png_pages(dir.path(), 2);
    let backend = Arc::new(PageScript::new(&[
        (1, Reply::Text(r#"{"columns":["Name","Note"],"rows":[["Smith, J.","ok"]]}"#)),
        (2, Reply::Text(r#"{"columns":["Name","Note"],"rows":[["Lee","said \"hi\""]]}"#)),
    ]));
    let target: PathBuf = dir.path().join("out/nested/result.csv");

    let config = OcrConfig::builder()
        .prompt("Extract the table")
        .backend(backend)
        .output(&target)
        .build()
        .unwrap();
    let source = DocumentSource::Images(images);

    let first = extract_to_file(&source, &config).await.unwrap();
    let first_bytes = std::fs::read(&first.path).unwrap();
    let second = extract_to_file(&source, &config).await.unwrap();
    let second_bytes = std::fs::read(&second.path).unwrap();

    assert_eq!(first.path, target);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(
        String::from_utf8(first_bytes).unwrap(),
        "Name,Note\n\"Smith, J.\",ok\nLee,\"said \"\"hi\"\"\"\n"
    );
}

#[tokio::test]
async fn unsupported_image_fails_before_any_call() {
    let dir = TempDir::new().unwrap();
    let mut images = png_pages(dir.path(), 1);
    let tiff = dir.path().join("scan_2.tiff");
    std::fs::write(&tiff, b"II*\0").unwrap();
    images.push(tiff.to_string_lossy().into_owned());
    let backend = Arc::new(PageScript::new(&[(1, Reply::Text("x"))]));

    let err = extract(&DocumentSource::Images(images), &config("Read", backend.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::UnsupportedImage { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(backend.calls.lock().unwrap().is_empty());
}
