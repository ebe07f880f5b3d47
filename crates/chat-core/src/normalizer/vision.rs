use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::llm::{
    ChatGateway, ChatRole, ContentPart, ImageUrl, MessageContent, ModelMessage, ModelRequest,
    ModelSettings,
};

pub const VISION_INSTRUCTION: &str =
    "Read all visible text in this image verbatim. If there is no text, briefly describe the image.";

pub fn vision_request(settings: &ModelSettings, mime: &str, bytes: &[u8]) -> ModelRequest {
    let data_url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));

    ModelRequest {
        model: settings.model.clone(),
        messages: vec![ModelMessage {
            role: ChatRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: VISION_INSTRUCTION.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }],
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

/// Never fails: provider errors come back as an inline note.
pub async fn read_image(
    gateway: &dyn ChatGateway,
    settings: &ModelSettings,
    mime: &str,
    bytes: &[u8],
) -> String {
    match gateway.send(vision_request(settings, mime, bytes)).await {
        Ok(completion) => completion.content,
        Err(err) => {
            warn!(model = %settings.model, "image analysis failed: {err}");
            format!("[Image analysis failed: {err}]")
        }
    }
}
