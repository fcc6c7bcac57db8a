//! Text extraction and MIME detection.
//!
//! The pipeline reads a file's bytes once (for hashing) and hands them to a
//! [`TextExtractor`] together with the detected MIME type. Extraction runs
//! on a blocking thread, so implementations may be CPU-heavy.
//!
//! [`DefaultExtractor`] handles plain text and source files, JSON, Jupyter
//! notebooks, PDF (`pdf-extract`) and DOCX/PPTX/XLSX (`zip` + `quick-xml`).
//! Unrecognised binary types produce empty text so the file's metadata and
//! name remain searchable.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_IPYNB: &str = "application/x-ipynb+json";
pub const MIME_JSON: &str = "application/json";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_OCTET: &str = "application/octet-stream";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Plain text beyond this many chars is truncated.
const MAX_TEXT_CHARS: usize = 1024 * 1024;
/// Bytes inspected when deciding whether unknown content is text.
const SNIFF_BYTES: usize = 8192;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("notebook extraction failed: {0}")]
    Notebook(String),
}

/// Turns file bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError>;
}

/// Built-in extractor for the supported document formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl TextExtractor for DefaultExtractor {
    fn extract(&self, _path: &Path, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        match extract_text(bytes, mime_type) {
            Err(ExtractError::UnsupportedContentType(_)) => Ok(String::new()),
            other => other,
        }
    }
}

/// Extract plain text from `bytes` according to `content_type`.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_IPYNB => extract_notebook(bytes),
        MIME_JSON | "application/javascript" | "application/xml" | "application/toml" => {
            Ok(decode_text(bytes))
        }
        ct if ct.starts_with("text/") => Ok(decode_text(bytes)),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Detect a MIME type from the file extension, falling back to magic-byte
/// sniffing and finally a text/binary heuristic.
pub fn detect_mime(path: &Path, bytes: &[u8]) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if let Some(mime) = mime_for_extension(&ext) {
        return mime.to_string();
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    if looks_like_text(bytes) {
        MIME_TEXT.to_string()
    } else {
        MIME_OCTET.to_string()
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "txt" | "text" | "log" | "rst" | "ini" | "cfg" | "conf" | "csv" | "tsv" => MIME_TEXT,
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "xml" => "application/xml",
        "yaml" | "yml" => "text/yaml",
        "toml" => "application/toml",
        "json" => MIME_JSON,
        "js" | "mjs" | "ts" | "tsx" | "jsx" => "application/javascript",
        "py" | "rs" | "go" | "java" | "c" | "h" | "cpp" | "hpp" | "cc" | "rb" | "sh" | "sql"
        | "swift" | "kt" | "scala" | "lua" | "php" | "pl" => "text/x-source",
        "ipynb" => MIME_IPYNB,
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        _ => return None,
    };
    Some(mime)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_BYTES)];
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte char may straddle the sniff window.
        Err(e) => e.valid_up_to() + 4 >= head.len(),
    }
}

/// UTF-8 if valid, otherwise Latin-1; truncated to [`MAX_TEXT_CHARS`].
fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    if text.chars().count() > MAX_TEXT_CHARS {
        let mut cut: String = text.chars().take(MAX_TEXT_CHARS).collect();
        cut.push_str("... [truncated]");
        cut
    } else {
        text
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_notebook(bytes: &[u8]) -> Result<String, ExtractError> {
    let nb: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Notebook(e.to_string()))?;

    fn joined(v: Option<&serde_json::Value>) -> String {
        match v {
            Some(serde_json::Value::Array(lines)) => lines
                .iter()
                .filter_map(|l| l.as_str())
                .collect::<Vec<_>>()
                .concat(),
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    let mut out = String::new();
    let cells = nb
        .get("cells")
        .and_then(|c| c.as_array())
        .map(|c| c.as_slice())
        .unwrap_or_default();
    for cell in cells {
        match cell.get("cell_type").and_then(|t| t.as_str()) {
            Some("markdown") | Some("code") => {
                out.push_str(&joined(cell.get("source")));
                out.push_str("\n\n");
            }
            _ => continue,
        }
        let outputs = cell
            .get("outputs")
            .and_then(|o| o.as_array())
            .map(|o| o.as_slice())
            .unwrap_or_default();
        for output in outputs {
            if output.get("output_type").and_then(|t| t.as_str()) == Some("stream") {
                out.push_str(&joined(output.get("text")));
                out.push('\n');
            }
        }
    }
    Ok(out.trim().to_string())
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Entries named `<prefix><N>.xml`, ordered by N.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenate the text of every `<t>` element (any namespace prefix).
/// Paragraph ends (`<p>`) become newlines.
fn collect_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    collect_t_elements(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = collect_t_elements(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let cells = sheet_cells(&xml, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one sheet, space-separated. Shared-string cells are
/// resolved; inline and numeric values are taken as written.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared_cell = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let v = raw.trim();
                let value = if shared_cell {
                    v.parse::<usize>().ok().and_then(|i| shared.get(i)).cloned()
                } else {
                    Some(v.to_string())
                };
                cells.extend(value.filter(|s| !s.is_empty()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", MIME_OCTET).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn default_extractor_yields_empty_text_for_binaries() {
        let text = DefaultExtractor
            .extract(Path::new("x.bin"), &[0, 1, 2], MIME_OCTET)
            .unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    fn pdf_with_text(text: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

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
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn pdf_text_is_extracted() {
        let text = extract_text(&pdf_with_text("Quarterly"), MIME_PDF).unwrap();
        assert!(text.contains("Quarterly"), "got: {:?}", text);
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn latin1_text_is_decoded() {
        let text = extract_text(&[b'c', b'a', b'f', 0xE9], MIME_TEXT).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn notebook_cells_and_stream_outputs() {
        let nb = br##"{"cells":[
            {"cell_type":"markdown","source":["# Title\n","intro"]},
            {"cell_type":"code","source":"print(1)","outputs":[{"output_type":"stream","text":["1\n"]}]},
            {"cell_type":"raw","source":"ignored"}
        ]}"##;
        let text = extract_text(nb, MIME_IPYNB).unwrap();
        assert!(text.contains("# Title\nintro"));
        assert!(text.contains("print(1)"));
        assert!(text.contains('1'));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn detect_by_extension_then_magic() {
        assert_eq!(detect_mime(Path::new("a.MD"), b""), "text/markdown");
        assert_eq!(detect_mime(Path::new("a.ipynb"), b"{}"), MIME_IPYNB);
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(detect_mime(Path::new("noext"), &png), "image/png");
        assert_eq!(detect_mime(Path::new("README"), b"hello world"), MIME_TEXT);
        assert_eq!(detect_mime(Path::new("blob"), &[0u8, 159, 146, 150]), MIME_OCTET);
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = br#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:r><w:t>World</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(collect_t_elements(xml).unwrap(), "Hello\nWorld");
    }
}
