use std::io::Write;
use std::path::{Path, PathBuf};

use chunk_model::{ChunkParams, DocumentId, MAX_CHUNK_CHARS, META_DOC_SHA256};
use file_chunker::parent_window::{attach_parent_windows, parent_content_for, window_bounds};
use file_chunker::reader_docx::parse_document_xml;
use file_chunker::reader_pdf::read_pdf_to_blocks;
use file_chunker::splitter::RecursiveSplitter;
use file_chunker::unified_blocks::UnifiedBlock;
use file_chunker::{chunk_document, split_blocks, ChunkError, DocumentKind};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

const SECTIONS: [&str; 7] = [
    "Alpha section describes the warehouse.",
    "Beta section covers staffing levels.",
    "Gamma section lists the invoice totals.",
    "Delta section explains the audit trail.",
    "Epsilon section records travel costs.",
    "Zeta section outlines the training plan.",
    "Eta section closes with final remarks.",
];

fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
}

fn page_break() -> String {
    "<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>".to_string()
}

fn document_xml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    )
}

fn write_docx(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create docx");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    zip.start_file("word/document.xml", options).expect("start entry");
    zip.write_all(document_xml(body).as_bytes()).expect("write entry");
    zip.finish().expect("finish zip");
    path
}

/// One Courier text line per page; an empty string yields a page without text.
fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode content")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("save pdf");
    path
}

fn small_params() -> ChunkParams {
    ChunkParams { chunk_size: 50, chunk_overlap: 0, window_size: 3 }
}

#[test]
fn splitter_merges_words_up_to_chunk_size() {
    let splitter = RecursiveSplitter::new(10, 0);
    let chunks = splitter.split("aaaa bbbb cccc dddd");
    assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd"]);
}

#[test]
fn splitter_carries_overlap_into_next_chunk() {
    let splitter = RecursiveSplitter::new(10, 5);
    let chunks = splitter.split("aaaa bbbb cccc dddd");
    assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
}

#[test]
fn splitter_prefers_paragraph_boundaries() {
    let splitter = RecursiveSplitter::new(30, 0);
    let text = "first paragraph here\n\nsecond paragraph here\n\nthird one";
    let chunks = splitter.split(text);
    assert_eq!(chunks, vec!["first paragraph here", "second paragraph here", "third one"]);
}

#[test]
fn splitter_handles_text_without_whitespace() {
    let splitter = RecursiveSplitter::new(5, 0);
    let text = "これは日本語のテキストです";
    let chunks = splitter.split(text);
    assert!(chunks.len() >= 3);
    for c in &chunks {
        assert!(c.chars().count() <= 5, "chunk too long: {c}");
    }
    assert_eq!(chunks.concat(), text);
}

#[test]
fn splitter_chunks_never_exceed_size_for_prose() {
    let splitter = RecursiveSplitter::new(40, 8);
    let text = SECTIONS.join(" ").repeat(3);
    let chunks = splitter.split(&text);
    assert!(!chunks.is_empty());
    for c in &chunks {
        assert!(c.chars().count() <= 40, "chunk too long: {c}");
        assert_eq!(c.trim(), c);
    }
}

#[test]
fn degenerate_splitter_yields_nothing() {
    assert!(RecursiveSplitter::new(10, 10).split("some text to split").is_empty());
    assert!(RecursiveSplitter::new(0, 0).split("some text to split").is_empty());
}

#[test]
fn window_bounds_are_centred_and_clamped() {
    assert_eq!(window_bounds(0, 7, 3), 0..3);
    assert_eq!(window_bounds(3, 7, 3), 2..5);
    assert_eq!(window_bounds(6, 7, 3), 4..7);
    assert_eq!(window_bounds(1, 2, 5), 0..2);
    for n in 1..10 {
        for w in 1..8 {
            for i in 0..n {
                let r = window_bounds(i, n, w);
                assert_eq!(r.len(), w.min(n), "i={i} n={n} w={w}");
                assert!(r.contains(&i), "i={i} n={n} w={w}");
            }
        }
    }
}

#[test]
fn parent_content_falls_back_to_own_text() {
    let texts = ["one", "two", "three"];
    assert_eq!(parent_content_for(&texts, 1, 3), "one\ntwo\nthree");
    assert_eq!(parent_content_for(&texts, 1, 0), "two");
}

#[test]
fn docx_xml_groups_paragraphs_by_page() {
    let body = format!(
        "{}{}{}{}",
        paragraph("first page text"),
        page_break(),
        paragraph("second page one"),
        paragraph("second page two"),
    );
    let blocks = parse_document_xml(&document_xml(&body));
    assert_eq!(
        blocks,
        vec![
            UnifiedBlock::new("first page text").with_page(1),
            UnifiedBlock::new("second page one\n\nsecond page two").with_page(2),
        ]
    );
}

#[test]
fn chunk_document_windows_docx_sections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let body: String = SECTIONS.iter().map(|s| paragraph(s)).collect();
    let path = write_docx(dir.path(), "report.docx", &body);
    let path_str = path.to_string_lossy().to_string();

    let out = chunk_document(&path_str, &small_params()).expect("chunk docx");
    assert_eq!(out.kind, DocumentKind::Docx);
    assert_eq!(out.doc_id, DocumentId(path_str.clone()));
    assert_eq!(out.chunks.len(), SECTIONS.len());

    for (i, chunk) in out.chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index as usize, i);
        assert_eq!(chunk.text, SECTIONS[i]);
        assert_eq!(chunk.source_uri, path_str);
        assert_eq!(chunk.meta.get(META_DOC_SHA256), out.content_sha256.as_ref());
    }
    assert_eq!(out.chunks[0].parent_content(), Some(SECTIONS[0..3].join("\n").as_str()));
    assert_eq!(out.chunks[3].parent_content(), Some(SECTIONS[2..5].join("\n").as_str()));
    assert_eq!(out.chunks[6].parent_content(), Some(SECTIONS[4..7].join("\n").as_str()));

    let invoice: Vec<u32> = out
        .chunks
        .iter()
        .filter(|c| c.text.contains("invoice"))
        .map(|c| c.sequence_index)
        .collect();
    assert_eq!(invoice, vec![2]);
}

#[test]
fn chunking_is_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let body: String = SECTIONS.iter().map(|s| paragraph(s)).collect();
    let path = write_docx(dir.path(), "again.docx", &body);
    let path_str = path.to_string_lossy().to_string();
    let a = chunk_document(&path_str, &small_params()).expect("first run");
    let b = chunk_document(&path_str, &small_params()).expect("second run");
    assert_eq!(a.chunks, b.chunks);
    assert_eq!(a.content_sha256, b.content_sha256);
}

#[test]
fn windows_never_cross_documents() {
    let params = small_params();
    let mut a = split_blocks(&DocumentId("a".into()), "a", &[UnifiedBlock::new("only chunk of a")], &params)
        .expect("doc a");
    let mut b = split_blocks(&DocumentId("b".into()), "b", &[UnifiedBlock::new("only chunk of b")], &params)
        .expect("doc b");
    attach_parent_windows(&mut a, params.window_size);
    attach_parent_windows(&mut b, params.window_size);
    assert_eq!(a[0].parent_content(), Some("only chunk of a"));
    assert_eq!(b[0].parent_content(), Some("only chunk of b"));
}

#[test]
fn pages_are_inherited_and_sequence_is_contiguous() {
    let blocks = vec![
        UnifiedBlock::new("page one text").with_page(1),
        UnifiedBlock::new("   ").with_page(2),
        UnifiedBlock::new("page three text").with_page(3),
    ];
    let mut chunks = split_blocks(&DocumentId("d".into()), "d.pdf", &blocks, &small_params())
        .expect("split");
    attach_parent_windows(&mut chunks, 3);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].page, Some(1));
    assert_eq!(chunks[1].page, Some(3));
    assert_eq!(chunks[1].sequence_index, 1);
}

#[test]
fn unsupported_extension_is_rejected_before_reading() {
    let err = chunk_document("/does/not/exist/notes.txt", &ChunkParams::default()).unwrap_err();
    match err {
        ChunkError::UnsupportedFormat { extension } => assert_eq!(extension, "txt"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        DocumentKind::from_path("no_extension"),
        Err(ChunkError::UnsupportedFormat { .. })
    ));
    assert_eq!(DocumentKind::from_path("UPPER.PDF").expect("pdf"), DocumentKind::Pdf);
}

#[test]
fn blank_docx_is_an_empty_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let body = format!("{}{}", paragraph("   "), page_break());
    let path = write_docx(dir.path(), "blank.docx", &body);
    let err = chunk_document(&path.to_string_lossy(), &ChunkParams::default()).unwrap_err();
    assert!(matches!(err, ChunkError::EmptyDocument { .. }), "got {err:?}");
}

#[test]
fn degenerate_params_fail_after_split() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_docx(dir.path(), "short.docx", &paragraph("some real text"));
    let params = ChunkParams { chunk_size: 10, chunk_overlap: 10, window_size: 3 };
    let err = chunk_document(&path.to_string_lossy(), &params).unwrap_err();
    assert!(matches!(err, ChunkError::EmptyAfterSplit { .. }), "got {err:?}");
}

#[test]
fn corrupt_files_surface_extraction_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf = dir.path().join("broken.pdf");
    std::fs::write(&pdf, b"definitely not a pdf").expect("write");
    let docx = dir.path().join("broken.docx");
    std::fs::write(&docx, b"definitely not a zip").expect("write");

    for path in [pdf, docx] {
        let err = chunk_document(&path.to_string_lossy(), &ChunkParams::default()).unwrap_err();
        assert!(matches!(err, ChunkError::Extraction { .. }), "got {err:?}");
    }
}

#[test]
fn pdf_pages_become_page_tagged_blocks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_pdf(dir.path(), "report.pdf", &["Alpha page text", "Beta page lists the invoice"]);
    let path_str = path.to_string_lossy().to_string();

    let blocks = read_pdf_to_blocks(&path_str).expect("read pdf");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].page, Some(1));
    assert_eq!(blocks[1].page, Some(2));
    assert!(blocks[0].text.contains("Alpha page text"), "got {:?}", blocks[0].text);
    assert!(blocks[1].text.contains("invoice"), "got {:?}", blocks[1].text);

    let out = chunk_document(&path_str, &small_params()).expect("chunk pdf");
    assert_eq!(out.kind, DocumentKind::Pdf);
    assert_eq!(out.chunks.len(), 2);
    assert_eq!(out.chunks[0].page, Some(1));
    assert_eq!(out.chunks[1].page, Some(2));
    assert_eq!(out.chunks[1].sequence_index, 1);
    assert_eq!(out.chunks[0].parent_content(), Some("Alpha page text\nBeta page lists the invoice"));
    assert!(out.content_sha256.is_some());
}

#[test]
fn pdf_without_text_is_an_empty_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_pdf(dir.path(), "scanned.pdf", &["", ""]);
    let err = chunk_document(&path.to_string_lossy(), &ChunkParams::default()).unwrap_err();
    assert!(matches!(err, ChunkError::EmptyDocument { .. }), "got {err:?}");
}

#[test]
fn chunk_document_caps_long_chunks_after_windowing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let long = "word ".repeat(700);
    let path = write_docx(dir.path(), "long.docx", &paragraph(long.trim()));
    let params = ChunkParams { chunk_size: 5000, chunk_overlap: 0, window_size: 3 };

    let out = chunk_document(&path.to_string_lossy(), &params).expect("chunk");
    assert_eq!(out.chunks.len(), 1);
    assert_eq!(out.capped, 1);
    assert_eq!(out.chunks[0].text.chars().count(), MAX_CHUNK_CHARS);
    assert!(out.chunks[0].parent_content().expect("parent").chars().count() > MAX_CHUNK_CHARS);
}
