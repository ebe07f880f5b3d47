use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::repos::StoreError;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Scopes a conversation: a storefront user or an anonymous session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    User(i64),
    Session(String),
}

impl OwnerKey {
    pub fn new_session() -> Self {
        Self::Session(Uuid::new_v4().to_string())
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Session(token) => Some(token.as_str()),
            Self::User(_) => None,
        }
    }

    /// Short stable digest used in logs in place of the raw key.
    pub fn fingerprint(&self) -> String {
        let raw = match self {
            Self::User(user_id) => format!("user:{user_id}"),
            Self::Session(token) => format!("session:{token}"),
        };
        Sha256::digest(raw.as_bytes())
            .iter()
            .take(6)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub(crate) fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(StoreError::InvalidData(format!(
                "unknown chat message role persisted: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: MessageRole,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: MessageId,
    pub owner: OwnerKey,
    pub role: MessageRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only conversation log.
///
/// `recent_history` returns the newest `limit` messages for `owner`, oldest
/// first, leaving out the record named by `exclude`.
pub trait ConversationStore: Send + Sync {
    fn append<'a>(
        &'a self,
        owner: &'a OwnerKey,
        role: MessageRole,
        body: &'a str,
    ) -> StoreFuture<'a, MessageId>;

    fn recent_history<'a>(
        &'a self,
        owner: &'a OwnerKey,
        limit: usize,
        exclude: Option<MessageId>,
    ) -> StoreFuture<'a, Vec<HistoryTurn>>;

    fn ping<'a>(&'a self) -> StoreFuture<'a, ()>;
}

#[derive(Default)]
struct InMemoryLog {
    messages: Vec<ChatMessage>,
    next_id: i64,
    last_created_at: Option<DateTime<Utc>>,
}

impl InMemoryLog {
    fn monotonic_now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

/// Process-local store for tests and single-node development runs.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    log: Arc<Mutex<InMemoryLog>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, owner: &OwnerKey) -> Vec<ChatMessage> {
        self.lock_log()
            .messages
            .iter()
            .filter(|message| &message.owner == owner)
            .cloned()
            .collect()
    }

    fn lock_log(&self) -> MutexGuard<'_, InMemoryLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn append<'a>(
        &'a self,
        owner: &'a OwnerKey,
        role: MessageRole,
        body: &'a str,
    ) -> StoreFuture<'a, MessageId> {
        Box::pin(async move {
            let mut log = self.lock_log();
            log.next_id += 1;
            let id = MessageId(log.next_id);
            let created_at = log.monotonic_now();
            log.messages.push(ChatMessage {
                id,
                owner: owner.clone(),
                role,
                body: body.to_string(),
                created_at,
            });
            Ok(id)
        })
    }

    fn recent_history<'a>(
        &'a self,
        owner: &'a OwnerKey,
        limit: usize,
        exclude: Option<MessageId>,
    ) -> StoreFuture<'a, Vec<HistoryTurn>> {
        Box::pin(async move {
            let log = self.lock_log();
            let mut window = log
                .messages
                .iter()
                .rev()
                .filter(|message| &message.owner == owner && Some(message.id) != exclude)
                .take(limit)
                .map(|message| HistoryTurn {
                    role: message.role,
                    body: message.body.clone(),
                })
                .collect::<Vec<_>>();
            window.reverse();
            Ok(window)
        })
    }

    fn ping<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
