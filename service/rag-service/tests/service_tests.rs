use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chunk_model::{ChunkParams, RetrievalResult, MAX_CHUNK_CHARS, META_PARENT_CONTENT};
use chunking_store::VectorStore;
use embedding_provider::embedder::{l2_normalize, Embedder, EmbedderError, EmbedderInfo, ProviderKind};
use rag_service::answer::NO_ANSWER_REPLY;
use rag_service::retriever::merge_unique;
use chunking_store::StoreError;
use embedding_provider::{HashingConfig, HashingEmbedder};
use rag_service::{
    render_prompt, AnswerContext, ErrorKind, GeneratorError, IndexFailure, IngestStage, ProgressEvent, RagService, ServiceConfig, ServiceError,
};

const SECTIONS: [&str; 7] = [
    "Alpha section describes the warehouse.",
    "Beta section covers staffing levels.",
    "Gamma section lists the invoice totals.",
    "Delta section explains the audit trail.",
    "Epsilon section records travel costs.",
    "Zeta section outlines the training plan.",
    "Eta section closes with final remarks.",
];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase)
}

/// Bag of words over a closed vocabulary; unknown words contribute nothing.
struct VocabEmbedder {
    vocab: Vec<String>,
    info: EmbedderInfo,
}

impl VocabEmbedder {
    fn for_sections() -> Self {
        let mut vocab: Vec<String> = SECTIONS.iter().flat_map(|s| words(s).collect::<Vec<_>>()).collect();
        vocab.sort();
        vocab.dedup();
        let info = EmbedderInfo {
            provider: ProviderKind::Hashing,
            embedding_model_id: "test-vocab".into(),
            dimension: vocab.len(),
            text_repr_version: "v1".into(),
        };
        Self { vocab, info }
    }
}

impl Embedder for VocabEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut v = vec![0.0f32; self.vocab.len()];
        for w in words(text) {
            if let Ok(i) = self.vocab.binary_search(&w) {
                v[i] += 1.0;
            }
        }
        l2_normalize(&mut v);
        Ok(v)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Every call fails the way an unreachable embedding endpoint would.
struct UnavailableEmbedder {
    info: EmbedderInfo,
}

impl UnavailableEmbedder {
    fn new(dimension: usize) -> Self {
        let info = EmbedderInfo {
            provider: ProviderKind::OpenAi,
            embedding_model_id: "unreachable".into(),
            dimension,
            text_repr_version: "v1".into(),
        };
        Self { info }
    }
}

impl Embedder for UnavailableEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        Err(EmbedderError::ProviderFailure { message: "503 service unavailable".into() })
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Err(EmbedderError::ProviderFailure { message: "503 service unavailable".into() })
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
}

fn write_docx(dir: &Path, name: &str, paragraphs: &[&str]) -> PathBuf {
    let body: String = paragraphs.iter().map(|p| paragraph(p)).collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create docx");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("word/document.xml", zip::write::FileOptions::default()).expect("start entry");
    zip.write_all(xml.as_bytes()).expect("write entry");
    zip.finish().expect("finish zip");
    path
}

fn config(store_dir: PathBuf) -> ServiceConfig {
    let mut cfg = ServiceConfig { store_dir, ..ServiceConfig::default() };
    cfg.chunk = ChunkParams { chunk_size: 50, chunk_overlap: 0, window_size: 3 };
    cfg.embed_batch_size = 3;
    cfg
}

fn service(store_dir: PathBuf) -> RagService {
    RagService::new(config(store_dir), Arc::new(VocabEmbedder::for_sections())).expect("service")
}

fn window(range: std::ops::Range<usize>) -> String {
    SECTIONS[range].join("\n")
}

#[test]
fn ingest_docx_writes_one_chunk_per_section() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = service(dir.path().join("store"));

    assert_eq!(svc.ingest(&doc).expect("ingest"), 7);
    let stats = svc.stats().expect("stats");
    assert_eq!((stats.documents, stats.chunks), (1, 7));

    let docs = svc.list_documents().expect("docs");
    assert_eq!(docs[0].source_uri, doc.to_string_lossy());
    assert_eq!(docs[0].chunk_count, 7);
    assert!(docs[0].content_sha256.is_some());

    let snapshot = VectorStore::new(dir.path().join("store")).snapshot().expect("snapshot");
    let parents: Vec<&str> = snapshot.iter().map(|r| r.meta[META_PARENT_CONTENT].as_str()).collect();
    assert_eq!(parents[0], window(0..3));
    assert_eq!(parents[3], window(2..5));
    assert_eq!(parents[6], window(4..7));
}

#[test]
fn invoice_query_returns_its_parent_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = service(dir.path().join("store"));
    svc.ingest(&doc).expect("ingest");

    let lexical = svc.retriever().lexical_search("invoice", 5).expect("lexical");
    assert_eq!(lexical.len(), 1);
    assert_eq!(lexical[0].grounding_text(), window(1..4));
    assert_eq!(lexical[0].sequence_index(), Some(2));

    let ctx = svc.answer_context("invoice", 5).expect("context");
    assert_eq!(ctx.contexts[0], window(1..4));
    let mut unique = ctx.contexts.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ctx.contexts.len(), "contexts must be unique");
}

#[test]
fn absent_token_yields_empty_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = service(dir.path().join("store"));
    svc.ingest(&doc).expect("ingest");

    assert!(svc.retriever().lexical_search("zebra", 5).expect("lexical").is_empty());
    let ctx = svc.answer_context("zebra", 5).expect("context");
    assert!(ctx.is_empty(), "got {:?}", ctx.contexts);
}

#[test]
fn cold_store_answers_empty_and_creates_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store_dir = dir.path().join("never-written");
    let svc = service(store_dir.clone());

    assert!(svc.answer_context("anything", 5).expect("context").is_empty());
    assert!(svc.list_documents().expect("docs").is_empty());
    assert_eq!(svc.stats().expect("stats").chunks, 0);
    assert!(!store_dir.exists());
}

#[test]
fn empty_store_directory_counts_as_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store_dir = dir.path().join("store");
    std::fs::create_dir_all(&store_dir).expect("mkdir");
    let svc = service(store_dir);
    assert!(svc.answer_context("invoice", 5).expect("context").is_empty());
}

#[test]
fn unsupported_format_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, "plain text invoice").expect("write");
    let store_dir = dir.path().join("store");
    let svc = service(store_dir.clone());

    let err = svc.ingest(&txt).unwrap_err();
    assert!(matches!(err, ServiceError::UnsupportedFormat { ref extension } if extension == "txt"), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(!err.is_retryable());
    assert!(!store_dir.exists());
}

#[test]
fn failed_ingestion_reports_and_leaves_store_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let store_dir = dir.path().join("store");
    let svc = service(store_dir.clone());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let params = ChunkParams { chunk_size: 10, chunk_overlap: 10, window_size: 3 };
    let err = svc
        .ingest_with(&doc, &params, Some(Box::new(move |e: ProgressEvent| sink.lock().expect("lock").push(e))))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyAfterSplit);
    assert!(!store_dir.exists());

    let events = events.lock().expect("lock");
    assert_eq!(events.first(), Some(&ProgressEvent::Stage { stage: IngestStage::Received, chunks: 0 }));
    assert!(matches!(events.last(), Some(ProgressEvent::Failed { kind: ErrorKind::EmptyAfterSplit, .. })));
}

#[test]
fn reingestion_appends_but_contexts_stay_unique() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = service(dir.path().join("store"));
    svc.ingest(&doc).expect("first");
    svc.ingest(&doc).expect("second");

    let stats = svc.stats().expect("stats");
    assert_eq!((stats.documents, stats.chunks), (2, 14));

    assert_eq!(svc.retriever().lexical_search("invoice", 5).expect("lexical").len(), 2);
    let ctx = svc.answer_context("invoice", 5).expect("context");
    assert_eq!(ctx.contexts.iter().filter(|c| **c == window(1..4)).count(), 1);
}

#[test]
fn merge_keeps_first_occurrence_of_each_grounding_text() {
    let with_parent = |content: &str, parent: &str| {
        let mut meta = std::collections::BTreeMap::new();
        meta.insert(META_PARENT_CONTENT.to_string(), parent.to_string());
        RetrievalResult::new(content, meta)
    };
    let vector = vec![with_parent("a", "P1"), with_parent("b", "P2")];
    let lexical = vec![with_parent("c", "P2"), RetrievalResult::new("bare", Default::default()), with_parent("d", "P1")];
    let merged = merge_unique(vector, lexical);
    let grounding: Vec<&str> = merged.iter().map(|r| r.grounding_text()).collect();
    assert_eq!(grounding, vec!["P1", "P2", "bare"]);
}

#[test]
fn stored_chunks_never_exceed_the_cap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let long = "invoice ".repeat(600);
    let doc = write_docx(dir.path(), "long.docx", &[long.trim()]);
    let store_dir = dir.path().join("store");
    let svc = service(store_dir.clone());
    let params = ChunkParams { chunk_size: 5000, chunk_overlap: 0, window_size: 3 };
    assert_eq!(svc.ingest_with(&doc, &params, None).expect("ingest"), 1);

    let snapshot = VectorStore::new(store_dir).snapshot().expect("snapshot");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].content.chars().count(), MAX_CHUNK_CHARS);
}

#[test]
fn background_ingestion_reports_every_stage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = Arc::new(service(dir.path().join("store")));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let params = svc.config().chunk;
    let handle = svc.ingest_in_background(&doc, params, Some(Box::new(move |e: ProgressEvent| sink.lock().expect("lock").push(e))));
    assert_eq!(handle.join().expect("thread").expect("ingest"), 7);

    let events = events.lock().expect("lock");
    let expected = vec![
        ProgressEvent::Stage { stage: IngestStage::Received, chunks: 0 },
        ProgressEvent::Stage { stage: IngestStage::Split, chunks: 7 },
        ProgressEvent::Stage { stage: IngestStage::Windowed, chunks: 7 },
        ProgressEvent::EmbedBatch { done: 3, total: 7, batch: 3 },
        ProgressEvent::EmbedBatch { done: 6, total: 7, batch: 3 },
        ProgressEvent::EmbedBatch { done: 7, total: 7, batch: 1 },
        ProgressEvent::Stage { stage: IngestStage::Indexed, chunks: 7 },
    ];
    assert_eq!(*events, expected);
}

#[test]
fn concurrent_ingestions_all_land() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write_docx(dir.path(), "a.docx", &SECTIONS);
    let b = write_docx(dir.path(), "b.docx", &SECTIONS[..4]);
    let svc = Arc::new(service(dir.path().join("store")));
    let params = svc.config().chunk;

    let ha = svc.ingest_in_background(&a, params, None);
    let hb = svc.ingest_in_background(&b, params, None);
    let total = ha.join().expect("thread a").expect("ingest a") + hb.join().expect("thread b").expect("ingest b");
    assert_eq!(total, 11);
    assert_eq!(svc.stats().expect("stats").chunks, 11);
}

#[test]
fn answer_fills_prompt_and_returns_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let svc = service(dir.path().join("store"));
    svc.ingest(&doc).expect("ingest");

    let seen = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&seen);
    let generator = move |prompt: &str| -> Result<String, GeneratorError> {
        *sink.lock().expect("lock") = prompt.to_string();
        Ok("The invoice totals are in the Gamma section.".to_string())
    };
    let answer = svc.answer("Where are the invoice totals?", &generator).expect("answer");

    assert_eq!(answer.answer, "The invoice totals are in the Gamma section.");
    assert!(answer.sources.contains(&window(1..4)));
    let prompt = seen.lock().expect("lock").clone();
    assert!(prompt.contains("Where are the invoice totals?"));
    assert!(prompt.contains(&answer.sources.join("\n")));
    assert!(!prompt.contains("{text}") && !prompt.contains("{question}"));
}

#[test]
fn generator_failure_is_a_generation_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let svc = service(dir.path().join("store"));
    let failing = |_: &str| -> Result<String, GeneratorError> { Err(GeneratorError::new("model offline")) };
    let err = svc.answer("anything", &failing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(err.is_retryable());
}

#[test]
fn embedding_outage_during_ingest_is_an_index_write_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let store_dir = dir.path().join("store");
    let svc = RagService::new(config(store_dir.clone()), Arc::new(UnavailableEmbedder::new(8))).expect("service");

    let err = svc.ingest(&doc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexWrite);
    assert!(matches!(err, ServiceError::IndexWrite(IndexFailure::Embedding(_))), "got {err:?}");
    assert!(err.is_retryable());
    assert!(!store_dir.exists());
}

#[test]
fn embedding_outage_during_query_is_an_index_query_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let store_dir = dir.path().join("store");
    service(store_dir.clone()).ingest(&doc).expect("ingest");

    let dimension = VocabEmbedder::for_sections().info().dimension;
    let svc = RagService::new(config(store_dir), Arc::new(UnavailableEmbedder::new(dimension))).expect("service");
    let err = svc.answer_context("invoice", 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexQuery);
    assert!(matches!(err, ServiceError::IndexQuery(IndexFailure::Embedding(_))), "got {err:?}");
    assert!(err.is_retryable());
}

#[test]
fn dimension_change_is_a_permanent_index_write_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = write_docx(dir.path(), "report.docx", &SECTIONS);
    let store_dir = dir.path().join("store");
    service(store_dir.clone()).ingest(&doc).expect("ingest");

    let hashing = HashingEmbedder::new(HashingConfig { dimension: 7, ..HashingConfig::default() }).expect("embedder");
    let svc = RagService::new(config(store_dir), Arc::new(hashing)).expect("service");
    let err = svc.ingest(&doc).unwrap_err();
    assert!(
        matches!(err, ServiceError::IndexWrite(IndexFailure::Store(StoreError::DimensionMismatch { .. }))),
        "got {err:?}"
    );
    assert!(!err.is_retryable());
    assert_eq!(svc.stats().expect("stats").chunks, 7);
}

#[test]
fn default_prompt_asks_for_the_fixed_no_answer_reply() {
    let context = AnswerContext { contexts: vec!["first passage".into(), "second passage".into()] };
    let prompt = render_prompt(rag_service::DEFAULT_PROMPT_TEMPLATE, &context, "What is {text}?");
    assert!(prompt.contains(&format!("reply exactly: \"{}\"", NO_ANSWER_REPLY)));
    assert!(prompt.contains("Passages:\nfirst passage\nsecond passage\n\nQuestion:\nWhat is {text}?\n"));
}
