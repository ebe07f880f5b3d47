use sqlx::Row;

use super::{Store, StoreError};
use crate::conversation::{
    ConversationStore, HistoryTurn, MessageId, MessageRole, OwnerKey, StoreFuture,
};

const RECENT_USER_HISTORY_SQL: &str = "SELECT role, body FROM (
        SELECT id, role, body, created_at
        FROM chat_messages
        WHERE user_id = $1
          AND ($2::BIGINT IS NULL OR id <> $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3
    ) recent
    ORDER BY created_at ASC, id ASC";

const RECENT_SESSION_HISTORY_SQL: &str = "SELECT role, body FROM (
        SELECT id, role, body, created_at
        FROM chat_messages
        WHERE session_id = $1
          AND ($2::BIGINT IS NULL OR id <> $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3
    ) recent
    ORDER BY created_at ASC, id ASC";

impl Store {
    pub async fn append_chat_message(
        &self,
        owner: &OwnerKey,
        role: MessageRole,
        body: &str,
    ) -> Result<MessageId, StoreError> {
        let (user_id, session_id) = match owner {
            OwnerKey::User(user_id) => (Some(*user_id), None),
            OwnerKey::Session(token) => (None, Some(token.as_str())),
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO chat_messages (user_id, session_id, body, role)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(body)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(MessageId(id))
    }

    pub async fn recent_chat_history(
        &self,
        owner: &OwnerKey,
        limit: usize,
        exclude: Option<MessageId>,
    ) -> Result<Vec<HistoryTurn>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit)
            .map_err(|_| StoreError::InvalidData("history limit exceeds i64".to_string()))?;
        let exclude = exclude.map(|id| id.0);

        let query = match owner {
            OwnerKey::User(user_id) => sqlx::query(RECENT_USER_HISTORY_SQL).bind(*user_id),
            OwnerKey::Session(token) => sqlx::query(RECENT_SESSION_HISTORY_SQL).bind(token.as_str()),
        };
        let rows = query.bind(exclude).bind(limit).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| -> Result<HistoryTurn, StoreError> {
                let role: String = row.try_get("role")?;
                Ok(HistoryTurn {
                    role: MessageRole::from_db(&role)?,
                    body: row.try_get("body")?,
                })
            })
            .collect()
    }
}

impl ConversationStore for Store {
    fn append<'a>(
        &'a self,
        owner: &'a OwnerKey,
        role: MessageRole,
        body: &'a str,
    ) -> StoreFuture<'a, MessageId> {
        Box::pin(self.append_chat_message(owner, role, body))
    }

    fn recent_history<'a>(
        &'a self,
        owner: &'a OwnerKey,
        limit: usize,
        exclude: Option<MessageId>,
    ) -> StoreFuture<'a, Vec<HistoryTurn>> {
        Box::pin(self.recent_chat_history(owner, limit, exclude))
    }

    fn ping<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(Store::ping(self))
    }
}
