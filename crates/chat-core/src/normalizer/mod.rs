use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::context::FileNote;
use crate::language::ChatLanguage;
use crate::llm::{ChatGateway, ModelSettings};
use crate::transcription::{AudioClip, Transcriber};

mod pdf;
mod vision;

pub use pdf::{NO_PDF_TEXT, extract_pdf_text};
pub use vision::{VISION_INSTRUCTION, read_image, vision_request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    PlainText,
    Pdf,
    Image(&'static str),
    Unsupported,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
}

/// Extension wins over the declared content type, which browsers often
/// report as `application/octet-stream`.
pub fn classify_upload(filename: &str, content_type: Option<&str>) -> UploadKind {
    let extension = Path::new(filename)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("txt" | "md" | "csv") => return UploadKind::PlainText,
        Some("pdf") => return UploadKind::Pdf,
        Some("png") => return UploadKind::Image("image/png"),
        Some("jpg" | "jpeg") => return UploadKind::Image("image/jpeg"),
        Some("webp") => return UploadKind::Image("image/webp"),
        Some("gif") => return UploadKind::Image("image/gif"),
        _ => {}
    }

    let content_type = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());
    match content_type.as_deref() {
        Some("application/pdf") => UploadKind::Pdf,
        Some("image/png") => UploadKind::Image("image/png"),
        Some("image/jpeg" | "image/jpg") => UploadKind::Image("image/jpeg"),
        Some("image/webp") => UploadKind::Image("image/webp"),
        Some("image/gif") => UploadKind::Image("image/gif"),
        Some(value) if value.starts_with("text/") => UploadKind::PlainText,
        _ => UploadKind::Unsupported,
    }
}

pub fn default_message_for(filename: &str) -> String {
    format!(
        "I have uploaded a file named '{filename}'. Please summarize its contents and suggest 3 follow-up questions I could ask."
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    /// `None` when the caller supplied nothing usable.
    pub message: Option<String>,
    pub file_note: Option<FileNote>,
    pub audio_failed: bool,
}

/// Turns text, file and audio inputs into one text message plus an optional
/// note about the uploaded file.
#[derive(Clone)]
pub struct InputNormalizer {
    gateway: Arc<dyn ChatGateway>,
    vision_settings: ModelSettings,
    transcriber: Arc<dyn Transcriber>,
    max_upload_bytes: usize,
}

impl InputNormalizer {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        vision_settings: ModelSettings,
        transcriber: Arc<dyn Transcriber>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            gateway,
            vision_settings,
            transcriber,
            max_upload_bytes,
        }
    }

    pub async fn extract_file(&self, file: &UploadedFile) -> Result<String, ExtractionError> {
        if file.bytes.len() > self.max_upload_bytes {
            return Err(ExtractionError::TooLarge {
                limit: self.max_upload_bytes,
            });
        }

        match classify_upload(&file.filename, file.content_type.as_deref()) {
            UploadKind::PlainText => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
            UploadKind::Pdf => Ok(extract_pdf_text(file.bytes.clone()).await),
            UploadKind::Image(mime) => Ok(read_image(
                self.gateway.as_ref(),
                &self.vision_settings,
                mime,
                &file.bytes,
            )
            .await),
            UploadKind::Unsupported => Err(ExtractionError::UnsupportedType(file.filename.clone())),
        }
    }

    /// `None` on any failure, including an empty transcript.
    pub async fn transcribe_audio(&self, clip: &AudioClip, language_code: &str) -> Option<String> {
        if clip.bytes.len() > self.max_upload_bytes {
            warn!(
                limit = self.max_upload_bytes,
                size = clip.bytes.len(),
                "audio upload exceeds limit"
            );
            return None;
        }

        match self.transcriber.transcribe(clip, language_code).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(language_code, "transcription returned empty text");
                None
            }
            Err(err) => {
                warn!(language_code, "audio transcription failed: {err}");
                None
            }
        }
    }

    pub async fn normalize(
        &self,
        message: Option<&str>,
        file: Option<&UploadedFile>,
        audio: Option<&AudioClip>,
        language: ChatLanguage,
    ) -> NormalizedInput {
        let mut message = message
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        let mut audio_failed = false;
        if let Some(clip) = audio {
            if message.is_none() {
                message = self
                    .transcribe_audio(clip, language.provider_language_code())
                    .await;
                audio_failed = message.is_none();
            }
        }

        let file_note = match file {
            Some(file) => {
                let note = match self.extract_file(file).await {
                    Ok(text) => {
                        info!(
                            filename = %file.filename,
                            extracted_chars = text.chars().count(),
                            "extracted uploaded file"
                        );
                        FileNote::Extracted {
                            filename: file.filename.clone(),
                            text,
                        }
                    }
                    Err(err) => {
                        warn!(filename = %file.filename, "file extraction failed: {err}");
                        FileNote::Unreadable {
                            filename: file.filename.clone(),
                            reason: err.to_string(),
                        }
                    }
                };
                if message.is_none() {
                    message = Some(default_message_for(&file.filename));
                }
                Some(note)
            }
            None => None,
        };

        NormalizedInput {
            message,
            file_note,
            audio_failed,
        }
    }
}
