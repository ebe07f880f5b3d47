use lopdf::Document;
use tracing::{debug, warn};

pub const NO_PDF_TEXT: &str = "No text extracted from PDF.";

/// Page texts joined by newlines, blank pages left out. Parsing runs on the
/// blocking pool; any failure degrades to [`NO_PDF_TEXT`].
pub async fn extract_pdf_text(bytes: Vec<u8>) -> String {
    match tokio::task::spawn_blocking(move || extract_pages(&bytes)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        Ok(Ok(_)) => {
            warn!("pdf parsed but contained no extractable text");
            NO_PDF_TEXT.to_string()
        }
        Ok(Err(err)) => {
            warn!("pdf text extraction failed: {err}");
            NO_PDF_TEXT.to_string()
        }
        Err(err) => {
            warn!("pdf extraction task failed: {err}");
            NO_PDF_TEXT.to_string()
        }
    }
}

fn extract_pages(bytes: &[u8]) -> Result<String, lopdf::Error> {
    let document = Document::load_mem(bytes)?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => {
                let text = text.trim_end();
                if text.trim().is_empty() {
                    debug!(page_number, "pdf page has no text");
                } else {
                    pages.push(text.to_string());
                }
            }
            Err(err) => debug!(page_number, "skipping unreadable pdf page: {err}"),
        }
    }

    Ok(pages.join("\n"))
}
