use crate::unified_blocks::UnifiedBlock;
use crate::ChunkError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;

fn local_name(q: &[u8]) -> &[u8] {
    match q.iter().position(|&b| b == b':') { Some(i) => &q[i + 1..], None => q }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for attr in e.attributes().with_checks(false).flatten() {
        if local_name(attr.key.as_ref()) == key_local {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

fn is_page_break(e: &BytesStart<'_>) -> bool {
    attr_val(e, b"type").map(|t| t.eq_ignore_ascii_case("page")).unwrap_or(false)
}

/// Open the zip container and return the raw `word/document.xml`.
fn read_document_xml(path: &str) -> Result<String, ChunkError> {
    let extraction = |message: String| ChunkError::Extraction { path: path.to_string(), message };
    let file = File::open(path).map_err(|e| extraction(format!("failed to open DOCX: {e}")))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| extraction(format!("not a valid .docx (zip) file: {e}")))?;
    let mut doc_xml = String::new();
    let mut entry = zip
        .by_name("word/document.xml")
        .map_err(|_| extraction("missing word/document.xml".into()))?;
    entry
        .read_to_string(&mut doc_xml)
        .map_err(|e| extraction(format!("failed to read word/document.xml: {e}")))?;
    Ok(doc_xml)
}

/// Minimal DOCX reader: parses `word/document.xml` and returns one block per page.
///
/// Paragraphs are attributed to the page they start on; explicit page breaks
/// (`<w:br w:type="page"/>`) advance the page counter. Paragraphs of a page are
/// joined with a blank line.
pub fn read_docx_to_blocks(path: &str) -> Result<Vec<UnifiedBlock>, ChunkError> {
    let doc_xml = read_document_xml(path)?;
    Ok(parse_document_xml(&doc_xml))
}

/// Parse an already-extracted `word/document.xml` body into page blocks.
pub fn parse_document_xml(doc_xml: &str) -> Vec<UnifiedBlock> {
    let mut reader = Reader::from_str(doc_xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut pages: Vec<(u32, Vec<String>)> = Vec::new();
    let mut current_page: u32 = 1;
    let mut para_start_page: u32 = 1;
    let mut cur_text = String::new();
    let mut in_t = false;
    let mut in_p = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"p" => { in_p = true; cur_text.clear(); para_start_page = current_page; }
                b"t" => { in_t = true; }
                b"br" => {
                    if is_page_break(&e) { current_page = current_page.saturating_add(1); }
                    cur_text.push('\n');
                }
                b"tab" => cur_text.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"br" => {
                    if is_page_break(&e) { current_page = current_page.saturating_add(1); }
                    cur_text.push('\n');
                }
                b"tab" => cur_text.push('\t'),
                _ => {}
            },
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => { in_t = false; }
                b"p" if in_p => {
                    let text = cur_text.trim();
                    if !text.is_empty() {
                        let same_page = pages.last().map(|(p, _)| *p == para_start_page).unwrap_or(false);
                        if same_page {
                            if let Some((_, paras)) = pages.last_mut() { paras.push(text.to_string()); }
                        } else {
                            pages.push((para_start_page, vec![text.to_string()]));
                        }
                    }
                    in_p = false;
                    cur_text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_t {
                    if let Ok(cow) = t.unescape() { cur_text.push_str(&cow); }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    pages
        .into_iter()
        .map(|(page, paras)| UnifiedBlock::new(paras.join("\n\n")).with_page(page))
        .collect()
}
