use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::Read;
use thiserror::Error;
use zip::ZipArchive;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC_MIME: &str = "application/msword";
pub const PDF_MIME: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unreadable PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Unreadable DOCX: {0}")]
    Docx(#[from] zip::result::ZipError),

    #[error("DOCX package has no word/document.xml")]
    MissingDocumentPart,

    #[error("Malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

/// Best-effort plain-text extraction, dispatched on content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
    match content_type {
        PDF_MIME => extract_pdf_text(bytes),
        DOC_MIME | DOCX_MIME => extract_docx_text(bytes),
        other => Err(ExtractionError::UnsupportedContentType(other.to_string())),
    }
}

/// Extracts text from every page of a PDF.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    Ok(doc.extract_text(&pages)?)
}

/// Extracts paragraph text from an OOXML word document: the `w:t` runs of
/// `word/document.xml`, one line per `w:p`.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)?;

    let mut xml_content = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractionError::MissingDocumentPart)?
        .read_to_string(&mut xml_content)
        .map_err(|_| ExtractionError::MissingDocumentPart)?;

    let mut reader = Reader::from_str(&xml_content);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            // Empty paragraphs and line breaks arrive as self-closing tags
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" | b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_run => {
                text.push_str(&e.unescape()?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::converter;

    #[test]
    fn test_docx_round_trip() {
        let source = "First paragraph with café text.\n\nSecond paragraph & friends.";
        let bytes = converter::render_docx(source).unwrap();
        let text = extract_docx_text(&bytes).unwrap();
        assert!(text.contains("First paragraph with café text."));
        assert!(text.contains("Second paragraph & friends."));
    }

    fn docx_with_body(body: &str) -> Vec<u8> {
        use std::io::Write;
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}</w:body></w:document>",
            body
        );
        let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        archive
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        archive.write_all(document.as_bytes()).unwrap();
        archive.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_empty_paragraph_keeps_blank_line() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>One</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>Two</w:t></w:r></w:p>",
        );
        let text = extract_docx_text(&bytes).unwrap();
        assert_eq!(text, "One\n\nTwo\n");
    }

    #[test]
    fn test_docx_line_break_splits_runs() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>first</w:t><w:br/><w:t>second</w:t></w:r></w:p>",
        );
        let text = extract_docx_text(&bytes).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }

    #[test]
    fn test_pdf_extraction_finds_rendered_text() {
        let bytes = converter::render_pdf("We recieve alot of feedback.").unwrap();
        let text = extract_pdf_text(&bytes).unwrap();
        assert!(text.contains("recieve"), "extracted: {text:?}");
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        assert!(extract_pdf_text(b"definitely not a pdf").is_err());
    }

    #[test]
    fn test_garbage_docx_is_an_error() {
        assert!(extract_docx_text(b"not a zip either").is_err());
    }

    #[test]
    fn test_unsupported_content_type() {
        assert!(matches!(
            extract_text(b"x", "text/plain"),
            Err(ExtractionError::UnsupportedContentType(_))
        ));
    }
}
