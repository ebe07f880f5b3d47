use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::commerce::{CommerceDirectory, DirectoryError};
use crate::context::{Caller, build_conversation_context};
use crate::conversation::{ConversationStore, MessageId, MessageRole, OwnerKey};
use crate::language::ChatLanguage;
use crate::llm::{ChatPrompt, FallbackPolicy, FallbackTermination, extract_follow_up_questions, system_prompt};
use crate::normalizer::{InputNormalizer, UploadedFile};
use crate::repos::StoreError;
use crate::transcription::AudioClip;

pub const MESSAGE_REQUIRED: &str = "Message is required";
pub const AUDIO_NOT_UNDERSTOOD: &str = "Could not transcribe the audio message";

#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub caller: Caller,
    pub owner: OwnerKey,
    pub message: Option<String>,
    pub language: ChatLanguage,
    pub file: Option<UploadedFile>,
    pub audio: Option<AudioClip>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub follow_ups: Vec<String>,
    pub termination: FallbackTermination,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Runs one chat turn end to end. Both the user turn and the assistant reply
/// are persisted before `handle` returns.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn CommerceDirectory>,
    normalizer: InputNormalizer,
    policy: FallbackPolicy,
    history_window: usize,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn CommerceDirectory>,
        normalizer: InputNormalizer,
        policy: FallbackPolicy,
        history_window: usize,
    ) -> Self {
        Self {
            store,
            directory,
            normalizer,
            policy,
            history_window,
        }
    }

    pub fn normalizer(&self) -> &InputNormalizer {
        &self.normalizer
    }

    pub async fn handle(&self, request: ChatTurnRequest) -> Result<ChatReply, ChatError> {
        let started = Instant::now();
        let has_text = request
            .message
            .as_deref()
            .is_some_and(|message| !message.trim().is_empty());
        if !has_text && request.file.is_none() && request.audio.is_none() {
            return Err(ChatError::Validation(MESSAGE_REQUIRED.to_string()));
        }

        let normalized = self
            .normalizer
            .normalize(
                request.message.as_deref(),
                request.file.as_ref(),
                request.audio.as_ref(),
                request.language,
            )
            .await;
        let Some(message) = normalized.message else {
            let reason = if normalized.audio_failed {
                AUDIO_NOT_UNDERSTOOD
            } else {
                MESSAGE_REQUIRED
            };
            return Err(ChatError::Validation(reason.to_string()));
        };

        let context = build_conversation_context(&request.caller, self.directory.as_ref())
            .await?
            .with_file_note(normalized.file_note);

        let owner = &request.owner;
        let user_message_id = self.store.append(owner, MessageRole::User, &message).await?;
        let history = self
            .store
            .recent_history(owner, self.history_window, Some(user_message_id))
            .await?;

        let prompt = ChatPrompt {
            system_prompt: system_prompt(&context.render(), request.language),
            history,
            current_turn: message,
            language: request.language,
        };
        let outcome = self.policy.respond(&prompt).await;
        if outcome.termination != FallbackTermination::Answered {
            warn!(
                owner = %owner.fingerprint(),
                state = outcome.final_state.as_str(),
                attempted_models = ?outcome.attempted_models,
                "chat turn ended without a model answer"
            );
        }

        let assistant_message_id = self
            .store
            .append(owner, MessageRole::Assistant, &outcome.text)
            .await?;

        info!(
            owner = %owner.fingerprint(),
            language = request.language.as_str(),
            history_turns = prompt.history.len(),
            has_file = request.file.is_some(),
            has_audio = request.audio.is_some(),
            latency_ms = started.elapsed().as_millis() as u64,
            "chat turn completed"
        );

        let follow_ups = match outcome.termination {
            FallbackTermination::Answered => extract_follow_up_questions(&outcome.text),
            _ => Vec::new(),
        };

        Ok(ChatReply {
            response: outcome.text,
            follow_ups,
            termination: outcome.termination,
            user_message_id,
            assistant_message_id,
        })
    }
}
