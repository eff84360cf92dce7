//! Per-format text extraction.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

use super::DocumentError;

const DOCX_BODY: &str = "word/document.xml";

/// Text of every page that yields any; unreadable pages are skipped.
pub(super) fn pdf_text(content: &[u8]) -> Result<String, DocumentError> {
    let doc = lopdf::Document::load_mem(content)
        .map_err(|e| DocumentError::Malformed(format!("failed to read PDF: {e}")))?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page) => {
                text.push_str(&page);
                text.push('\n');
            }
            Err(e) => {
                tracing::warn!(page = page_num, error = %e, "Skipping unreadable PDF page");
            }
        }
    }
    Ok(text)
}

/// Paragraph text of the main document part, one line per paragraph.
pub(super) fn docx_text(content: &[u8]) -> Result<String, DocumentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| DocumentError::Malformed(format!("failed to read DOCX: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| DocumentError::Malformed(format!("failed to read DOCX: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| DocumentError::Malformed(format!("failed to read DOCX: {e}")))?;

    wordml_text(&xml)
}

fn wordml_text(xml: &str) -> Result<String, DocumentError> {
    let malformed = |e: quick_xml::Error| DocumentError::Malformed(format!("invalid DOCX XML: {e}"));

    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape().map_err(malformed)?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

pub(super) fn plain_text(content: &[u8]) -> Result<String, DocumentError> {
    String::from_utf8(content.to_vec())
        .map_err(|_| DocumentError::Malformed("file is not valid UTF-8 text".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_wordml_paragraphs() {
        let xml = r#"<w:document xmlns:w="x"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Fish &amp; chips</w:t><w:tab/><w:t>£4</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(wordml_text(xml).unwrap(), "Hello world\nFish & chips\t£4\n");
    }

    #[test]
    fn test_docx_roundtrip_through_zip() {
        let bytes = docx_bytes(r#"<w:document><w:body><w:p><w:r><w:t>Quarterly report</w:t></w:r></w:p></w:body></w:document>"#);
        assert_eq!(docx_text(&bytes).unwrap(), "Quarterly report\n");
    }

    #[test]
    fn test_docx_rejects_non_zip() {
        assert!(matches!(
            docx_text(b"definitely not a zip"),
            Err(DocumentError::Malformed(_))
        ));
    }

    #[test]
    fn test_pdf_rejects_garbage() {
        assert!(matches!(
            pdf_text(b"%PDF-garbage"),
            Err(DocumentError::Malformed(_))
        ));
    }

    #[test]
    fn test_plain_text_rejects_invalid_utf8() {
        assert!(matches!(
            plain_text(&[0xff, 0xfe, 0x00]),
            Err(DocumentError::Malformed(_))
        ));
    }
}
