//! Document text extraction.
//!
//! Uploaded bytes are turned into plain text before a session is created.
//! The session store never looks inside the text; this module is the only
//! place that knows about file formats.
//!
//! # Formats
//!
//! - `.pdf`: text of every readable page, via `lopdf`
//! - `.docx`: paragraphs of `word/document.xml`, via `zip` and `quick-xml`
//! - `.txt`, `.md`: UTF-8 text

mod extract;

use std::path::Path;

/// Default upload limit (10MB).
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Extensions accepted by [`DocumentParser`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".txt", ".md"];

/// Errors that can occur during text extraction.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The file extension is not one we can read.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file size {size} exceeds maximum limit of {max_bytes} bytes")]
    TooLarge { size: usize, max_bytes: usize },

    #[error("file is empty")]
    Empty,

    /// The container or encoding could not be decoded.
    #[error("{0}")]
    Malformed(String),

    /// Decoding worked but produced only whitespace.
    #[error("no text content found in document")]
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Extracts plain text from uploaded documents.
#[derive(Debug, Clone)]
pub struct DocumentParser {
    max_bytes: usize,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl DocumentParser {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[must_use]
    pub fn supported_types(&self) -> &'static [&'static str] {
        SUPPORTED_EXTENSIONS
    }

    #[must_use]
    pub fn is_supported(&self, filename: &str) -> bool {
        DocumentKind::from_filename(filename).is_some()
    }

    /// Guessed MIME type for logging.
    #[must_use]
    pub fn mime_type(&self, filename: &str) -> String {
        mime_guess::from_path(filename)
            .first_or_octet_stream()
            .to_string()
    }

    /// Extract the text of `content`, choosing the format by `filename`.
    pub fn parse(&self, filename: &str, content: &[u8]) -> Result<String, DocumentError> {
        if content.len() > self.max_bytes {
            return Err(DocumentError::TooLarge {
                size: content.len(),
                max_bytes: self.max_bytes,
            });
        }
        let kind = DocumentKind::from_filename(filename)
            .ok_or_else(|| DocumentError::UnsupportedType(filename.to_string()))?;
        if content.is_empty() {
            return Err(DocumentError::Empty);
        }

        let text = match kind {
            DocumentKind::Pdf => extract::pdf_text(content)?,
            DocumentKind::Docx => extract::docx_text(content)?,
            DocumentKind::Text => extract::plain_text(content)?,
        };

        if text.trim().is_empty() {
            return Err(DocumentError::NoText);
        }

        tracing::debug!(
            name: "document.parsed",
            mime_type = %self.mime_type(filename),
            bytes = content.len(),
            chars = text.chars().count(),
            "Document parsed"
        );
        Ok(text)
    }
}
