// PDF helpers used by the read_pdf tool.
// Callers check `looks_like_pdf` first; extraction itself does not sniff content.
// Download size is bounded by the client (`CanvasConfig::max_download_bytes`) before bytes get here.

use serde::Serialize;

use crate::utils::canvas_client::CanvasError;

/// Plain text pulled out of a document, bounded to a character budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub truncated: bool,
}

/// Extracts the text of every page (joined by newlines, trimmed), bounded to `max_chars`
/// characters. `max_chars == 0` disables the bound.
pub fn extract_text(bytes: &[u8], max_chars: usize) -> Result<ExtractedText, CanvasError> {
    let pages = extract_pages(bytes)?;
    Ok(bound_text(&pages.join("\n"), max_chars))
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, CanvasError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(CanvasError::ContentFormat(e.to_string())),
        Err(_) => Err(CanvasError::ContentFormat(
            "PDF parser aborted on malformed input".to_string(),
        )),
    }
}

/// Trims `text` and cuts it to at most `max_chars` characters.
pub fn bound_text(text: &str, max_chars: usize) -> ExtractedText {
    let text = text.trim();
    if max_chars > 0 && text.chars().count() > max_chars {
        ExtractedText {
            text: text.chars().take(max_chars).collect(),
            truncated: true,
        }
    } else {
        ExtractedText {
            text: text.to_string(),
            truncated: false,
        }
    }
}

/// True if the declared MIME type mentions PDF or the file name has a .pdf extension.
pub fn looks_like_pdf(mime_type: &str, file_name: &str) -> bool {
    mime_type.to_ascii_lowercase().contains("pdf")
        || file_name.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an uncompressed PDF with one Helvetica text line per page.
    pub(crate) fn build_pdf(pages: &[&str]) -> Vec<u8> {
        // 1: catalog, 2: page tree, 3: font, then a (page, content) pair per page
        let kids: Vec<String> = (0..pages.len())
            .map(|i| format!("{} 0 R", 4 + 2 * i))
            .collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                pages.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>"
                .to_string(),
        ];
        for (i, text) in pages.iter().enumerate() {
            let stream = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                5 + 2 * i
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(
            format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        );
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn pages_come_out_in_document_order_and_trimmed() {
        let pdf = build_pdf(&["Alpha page", "Beta page", "Gamma page"]);
        let out = extract_text(&pdf, 0).unwrap();

        assert!(!out.truncated);
        assert_eq!(out.text, out.text.trim());
        assert!(out.text.starts_with("Alpha page"));
        assert!(out.text.ends_with("Gamma page"));
        let alpha = out.text.find("Alpha page").unwrap();
        let beta = out.text.find("Beta page").unwrap();
        let gamma = out.text.find("Gamma page").unwrap();
        assert!(alpha < beta && beta < gamma);
        assert!(out.text[alpha..beta].contains('\n'));
        assert!(out.text[beta..gamma].contains('\n'));
    }

    #[test]
    fn parsed_text_is_cut_to_the_budget() {
        let pdf = build_pdf(&["Alpha page", "Beta page"]);
        let out = extract_text(&pdf, 5).unwrap();
        assert_eq!(out.text, "Alpha");
        assert!(out.truncated);
    }

    #[test]
    fn truncates_to_exact_char_budget() {
        let text = "a".repeat(500);
        let out = bound_text(&text, 100);
        assert_eq!(out.text.chars().count(), 100);
        assert!(out.truncated);
    }

    #[test]
    fn zero_budget_means_unbounded() {
        let text = "b".repeat(500);
        let out = bound_text(&text, 0);
        assert_eq!(out.text.len(), 500);
        assert!(!out.truncated);
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let out = bound_text("hello", 5);
        assert_eq!(out.text, "hello");
        assert!(!out.truncated);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let out = bound_text("héllo wörld", 5);
        assert_eq!(out.text, "héllo");
        assert!(out.truncated);
    }

    #[test]
    fn trims_before_measuring() {
        let out = bound_text("\n\n  page one\npage two \n", 0);
        assert_eq!(out.text, "page one\npage two");
    }

    #[test]
    fn garbage_bytes_are_a_content_format_error() {
        let err = extract_text(b"this is not a pdf document", 100).unwrap_err();
        assert!(matches!(err, CanvasError::ContentFormat(_)));
        assert!(err.to_string().starts_with("Failed to parse PDF"));
    }

    #[test]
    fn pdf_hint_from_mime_or_name() {
        assert!(looks_like_pdf("application/pdf", "syllabus"));
        assert!(looks_like_pdf("", "Syllabus.PDF"));
        assert!(!looks_like_pdf("application/msword", "notes.docx"));
        assert!(!looks_like_pdf("", ""));
    }
}
