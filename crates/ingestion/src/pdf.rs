//! PDF page extraction
//!
//! Pulls per-page text and embedded image assets out of a field-manual
//! PDF with lopdf. Text comes from a scan of the page content stream
//! (BT/ET text blocks, Tj/TJ/quote operators); images are the page's
//! XObject streams with an Image subtype, kept as raw bytes with an
//! extension derived from the stream filter.

use crate::errors::IngestionError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;
use tracing::{debug, warn};

/// An embedded image asset found on a page
pub struct PageImage {
    pub data: Vec<u8>,
    pub ext: &'static str,
}

/// One source page, the unit of extraction work
pub struct PageUnit {
    /// Physical page number (1-based)
    pub number: u32,
    pub text: String,
    pub images: Vec<PageImage>,
}

/// Load a PDF document from disk
pub fn load_document(path: &Path) -> Result<Document, IngestionError> {
    Document::load(path).map_err(|e| IngestionError::PdfParseError {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })
}

/// Extract one page's text and image assets
pub fn extract_page(doc: &Document, number: u32, page_id: ObjectId) -> PageUnit {
    let text = match doc.get_page_content(page_id) {
        Ok(content) => collapse_whitespace(&scan_content_text(&content)),
        Err(e) => {
            warn!(page = number, error = %e, "Failed to read page content stream");
            String::new()
        }
    };

    let images = collect_page_images(doc, page_id);
    debug!(
        page = number,
        chars = text.len(),
        images = images.len(),
        "Page extracted"
    );

    PageUnit {
        number,
        text,
        images,
    }
}

/// Follow a reference to its target object, if any
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object.as_reference() {
        Ok(id) => doc.get_object(id).unwrap_or(object),
        Err(_) => object,
    }
}

/// Collect the page's image XObjects in resource-dictionary order
fn collect_page_images(doc: &Document, page_id: ObjectId) -> Vec<PageImage> {
    let mut images = Vec::new();

    let Ok(page_dict) = doc.get_dictionary(page_id) else {
        return images;
    };
    let Ok(resources) = page_dict.get(b"Resources") else {
        return images;
    };
    let Ok(resources) = resolve(doc, resources).as_dict() else {
        return images;
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return images;
    };
    let Ok(xobjects) = resolve(doc, xobjects).as_dict() else {
        return images;
    };

    for (_name, entry) in xobjects.iter() {
        let Object::Stream(stream) = resolve(doc, entry) else {
            continue;
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(|subtype| subtype.as_name())
            .map(|name| name == b"Image".as_slice())
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        images.push(PageImage {
            data: stream.content.clone(),
            ext: image_extension(&stream.dict),
        });
    }

    images
}

/// Derive a file extension from the image stream's filter
fn image_extension(dict: &Dictionary) -> &'static str {
    let filter = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name.clone(),
        Ok(Object::Array(filters)) => filters
            .first()
            .and_then(|f| f.as_name().ok())
            .map(|name| name.to_vec())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    match filter.as_slice() {
        b"DCTDecode" => "jpg",
        b"JPXDecode" => "jp2",
        _ => "bin",
    }
}

/// Scan a content stream for text inside BT/ET blocks
fn scan_content_text(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let trimmed = line.trim();

        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                text.push(' ');
            }
            _ if in_text_block => {
                if let Some(shown) = text_from_operator(trimmed) {
                    text.push_str(&shown);
                }
            }
            _ => {}
        }
    }

    text
}

/// Extract shown text from a Tj/TJ/quote operator line, if it is one
fn text_from_operator(line: &str) -> Option<String> {
    let is_show_op = line.ends_with("Tj")
        || line.ends_with("TJ")
        || line.ends_with('\'')
        || line.ends_with('"');
    if !is_show_op {
        return None;
    }

    // Concatenate every parenthesized string on the line; for TJ arrays
    // this skips the interleaved kerning numbers.
    let mut result = String::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in line.chars() {
        if in_string {
            if escaped {
                current.push('\\');
                current.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == ')' {
                in_string = false;
                result.push_str(&decode_pdf_string(&current));
                current.clear();
            } else {
                current.push(ch);
            }
        } else if ch == '(' {
            in_string = true;
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Decode PDF string escapes, including octal character codes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(digit @ '0'..='7') => {
                let mut code = digit.to_digit(8).unwrap_or(0);
                while let Some(next) = chars.peek().and_then(|c| c.to_digit(8)) {
                    code = code * 8 + next;
                    chars.next();
                }
                if let Some(decoded) = char::from_u32(code) {
                    result.push(decoded);
                }
            }
            Some(other) => result.push(other),
            None => {}
        }
    }

    result
}

/// Collapse runs of whitespace and strip BOM artifacts
fn collapse_whitespace(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pdf_string_escapes() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
        assert_eq!(decode_pdf_string("\\101\\102"), "AB");
    }

    #[test]
    fn test_text_from_tj_operator() {
        assert_eq!(text_from_operator("(SEIZE) Tj"), Some("SEIZE".to_string()));
        assert_eq!(
            text_from_operator("[(SEI) -20 (ZE)] TJ"),
            Some("SEIZE".to_string())
        );
        assert_eq!(text_from_operator("1 0 0 1 72 720 Tm"), None);
    }

    #[test]
    fn test_scan_content_text_respects_text_blocks() {
        let content = b"BT\n(Tactical) Tj\n(tasks) Tj\nET\n(outside) Tj\n";
        let text = collapse_whitespace(&scan_content_text(content));
        assert_eq!(text, "Tacticaltasks");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("Hello   World\n\nTest"), "Hello World Test");
    }

    #[test]
    fn test_image_extension_from_filter() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        assert_eq!(image_extension(&dict), "jpg");

        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            Object::Array(vec![Object::Name(b"JPXDecode".to_vec())]),
        );
        assert_eq!(image_extension(&dict), "jp2");

        assert_eq!(image_extension(&Dictionary::new()), "bin");
    }
}
