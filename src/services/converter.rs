use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use std::io::Write;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::services::extraction::{DOCX_MIME, PDF_MIME};

/// Page geometry for rendered PDFs (US Letter, 12 pt, 20 pt leading).
const PAGE_WIDTH: i32 = 612;
const PAGE_HEIGHT: i32 = 792;
const MARGIN_X: i32 = 50;
const TOP_Y: i32 = 750;
const LINE_HEIGHT: i32 = 20;
const MAX_LINE_CHARS: usize = 80;
const LINES_PER_PAGE: usize = 36;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("DOCX packaging failed: {0}")]
    Docx(#[from] zip::result::ZipError),

    #[error("DOCX packaging failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Output container for a rewritten document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Pdf,
    Docx,
}

impl TargetFormat {
    /// PDF stays PDF; Word (and anything else) becomes DOCX.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type == PDF_MIME {
            TargetFormat::Pdf
        } else {
            TargetFormat::Docx
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            TargetFormat::Pdf => PDF_MIME,
            TargetFormat::Docx => DOCX_MIME,
        }
    }
}

/// Renders `text` into the requested container. Rich rendering faults fall
/// back to a minimal hand-built file of the same format, so failure requires
/// both paths to break.
pub fn render_as_file(text: &str, format: TargetFormat) -> Result<Vec<u8>, ConversionError> {
    match format {
        TargetFormat::Pdf => Ok(render_pdf(text).unwrap_or_else(|e| {
            tracing::warn!("lopdf rendering failed, using minimal PDF: {}", e);
            minimal_pdf(text)
        })),
        TargetFormat::Docx => render_docx(text).or_else(|e| {
            tracing::warn!("deflated DOCX packaging failed, trying stored: {}", e);
            render_docx_with(text, CompressionMethod::Stored)
        }),
    }
}

/// Builds a PDF with lopdf: one Helvetica text column per page, wrapped at
/// 80 characters.
pub fn render_pdf(text: &str) -> Result<Vec<u8>, ConversionError> {
    let lines = wrap_lines(text);

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_lines in lines.chunks(LINES_PER_PAGE) {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![LINE_HEIGHT.into()]),
            Operation::new("Td", vec![MARGIN_X.into(), TOP_Y.into()]),
        ];
        for line in page_lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i32;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Hand-built single-page PDF with a correct xref table. Last-resort path,
/// structurally valid for any input text.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 12 Tf\n20 TL\n50 750 Td\n");
    for line in wrap_lines(text).into_iter().take(LINES_PER_PAGE) {
        content.push_str(&format!("({}) Tj\nT*\n", escape_pdf_literal(&line)));
    }
    content.push_str("ET");

    let objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut buf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(buf.len());
        buf.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, body));
    }

    let xref_offset = buf.len();
    buf.push_str(&format!("xref\n0 {}\n", offsets.len() + 1));
    buf.push_str("0000000000 65535 f \n");
    for offset in &offsets {
        buf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    buf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
        offsets.len() + 1,
        xref_offset
    ));
    buf.into_bytes()
}

/// Minimal OOXML word package: content types, package rels, and a
/// document body with one `w:p` per paragraph.
pub fn render_docx(text: &str) -> Result<Vec<u8>, ConversionError> {
    render_docx_with(text, CompressionMethod::Deflated)
}

fn render_docx_with(text: &str, method: CompressionMethod) -> Result<Vec<u8>, ConversionError> {
    let options = FileOptions::default().compression_method(method);
    let cursor = std::io::Cursor::new(Vec::new());
    let mut archive = ZipWriter::new(cursor);

    archive.start_file("[Content_Types].xml", options)?;
    archive.write_all(CONTENT_TYPES_XML.as_bytes())?;

    archive.start_file("_rels/.rels", options)?;
    archive.write_all(PACKAGE_RELS_XML.as_bytes())?;

    archive.start_file("word/document.xml", options)?;
    archive.write_all(document_xml(text).as_bytes())?;

    Ok(archive.finish()?.into_inner())
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

fn document_xml(text: &str) -> String {
    let mut body = String::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        body.push_str(&format!(
            "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
            quick_xml::escape::escape(paragraph)
        ));
    }
    if body.is_empty() {
        body.push_str("<w:p/>");
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    )
}

fn wrap_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            lines.push(String::new());
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        for chunk in chars.chunks(MAX_LINE_CHARS) {
            lines.push(chunk.iter().collect());
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn escape_pdf_literal(line: &str) -> String {
    line.chars()
        .flat_map(|c| match c {
            '(' => vec!['\\', '('],
            ')' => vec!['\\', ')'],
            '\\' => vec!['\\', '\\'],
            other => vec![other],
        })
        .collect()
}
