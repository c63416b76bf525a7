use std::path::Path;
use thiserror::Error;

/// Maximum upload size: 10 MiB
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// The only document types the service accepts
pub const ALLOWED_DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("File size cannot exceed {max} bytes (got {size})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file type. Only PDF and Word documents are allowed.")]
    InvalidFileType,

    #[error("File appears to be empty")]
    EmptyFile,

    #[error("Filename cannot be empty")]
    EmptyFilename,
}

/// Result of a successful upload validation
#[derive(Debug, Clone)]
pub struct ValidUpload {
    pub filename: String,
    /// Sniffed type when the sniffer recognized one, declared type otherwise
    pub content_type: String,
}

pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::FileTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Strips any path components and replaces reserved characters, capped at
/// 255 bytes on a char boundary.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    Ok(sanitized)
}

/// Determines the effective content type: byte sniffing wins, the declared
/// type is the fallback. Container formats are ambiguous at the byte level
/// (docx is a zip, doc is an OLE store), so a container match defers to the
/// declared type when that names an allowed document format.
pub fn resolve_content_type(
    bytes: &[u8],
    declared: Option<&str>,
) -> Result<String, ValidationError> {
    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_default();
    let declared_allowed = ALLOWED_DOCUMENT_TYPES.contains(&declared.as_str());

    match infer::get(bytes) {
        Some(kind) => {
            let detected = kind.mime_type();
            if ALLOWED_DOCUMENT_TYPES.contains(&detected) {
                return Ok(detected.to_string());
            }
            let container = matches!(detected, "application/zip" | "application/x-ole-storage");
            if container && declared_allowed {
                return Ok(declared);
            }
            Err(ValidationError::InvalidFileType)
        }
        None if declared_allowed => Ok(declared),
        None => Err(ValidationError::InvalidFileType),
    }
}

/// Full validation pipeline for uploaded documents
pub fn validate_upload(
    filename: &str,
    declared_content_type: Option<&str>,
    bytes: &[u8],
    max_size: usize,
) -> Result<ValidUpload, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    validate_file_size(bytes.len(), max_size)?;
    let filename = sanitize_filename(filename)?;
    let content_type = resolve_content_type(bytes, declared_content_type)?;

    Ok(ValidUpload {
        filename,
        content_type,
    })
}
