use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use chat_core::context::Caller;
use chat_core::conversation::OwnerKey;
use tracing::warn;

use super::AppState;
use super::errors::{directory_error_response, unauthorized_response};

pub const CHAT_SESSION_HEADER: &str = "x-chat-session";
const MAX_SESSION_TOKEN_LEN: usize = 128;

/// Who is chatting and which conversation log the turn belongs to.
#[derive(Clone, Debug)]
pub(super) struct ChatIdentity {
    pub(super) caller: Caller,
    pub(super) owner: OwnerKey,
}

/// Resolves a storefront bearer token when present; anonymous callers are
/// keyed by the `x-chat-session` header, minted on first contact and echoed
/// back on every response.
pub(super) async fn chat_identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("Token ")))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    let identity = match bearer {
        Some(token) => match state.directory.resolve_bearer_token(&token).await {
            Ok(Some(identity)) => ChatIdentity {
                owner: OwnerKey::User(identity.user_id),
                caller: Caller::Authenticated(identity),
            },
            Ok(None) => {
                warn!("chat request carried an unknown bearer token");
                return unauthorized_response();
            }
            Err(err) => return directory_error_response(err),
        },
        None => {
            let owner = req
                .headers()
                .get(CHAT_SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(normalize_session_token)
                .map(OwnerKey::Session)
                .unwrap_or_else(OwnerKey::new_session);
            ChatIdentity {
                caller: Caller::Anonymous,
                owner,
            }
        }
    };

    let session_token = identity.owner.session_token().map(str::to_string);
    req.extensions_mut().insert(identity);
    let mut response = next.run(req).await;

    if let Some(Ok(value)) = session_token.as_deref().map(HeaderValue::from_str) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CHAT_SESSION_HEADER), value);
    }

    response
}

fn normalize_session_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SESSION_TOKEN_LEN {
        return None;
    }

    trimmed
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
        .then(|| trimmed.to_string())
}
