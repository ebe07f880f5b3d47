use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Per-request correlation id and matched route template, readable by
/// handlers through `Extension`.
#[derive(Clone, Debug)]
pub(super) struct RequestContext {
    pub(super) request_id: String,
    pub(super) route: String,
}

/// Shape of an inbound body, logged so upload-heavy turns stand out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyKind {
    Empty,
    Json,
    Multipart,
    Other,
}

impl BodyKind {
    fn from_headers(headers: &HeaderMap) -> Self {
        let Some(content_type) = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        else {
            return Self::Empty;
        };

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Self::Json,
            "multipart/form-data" => Self::Multipart,
            _ => Self::Other,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Json => "json",
            Self::Multipart => "multipart",
            Self::Other => "other",
        }
    }
}

struct RequestLine {
    request_id: String,
    method: Method,
    route: String,
    body_kind: BodyKind,
    declared_bytes: Option<u64>,
    started_at: Instant,
}

impl RequestLine {
    fn capture(req: &Request, request_id: String) -> Self {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let declared_bytes = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        Self {
            request_id,
            method: req.method().clone(),
            route,
            body_kind: BodyKind::from_headers(req.headers()),
            declared_bytes,
            started_at: Instant::now(),
        }
    }

    fn finish(&self, status: u16) {
        let latency_ms = self.started_at.elapsed().as_millis() as u64;
        let body = self.body_kind.as_str();
        if status >= 500 {
            warn!(
                request_id = %self.request_id,
                method = %self.method,
                route = %self.route,
                body,
                declared_bytes = ?self.declared_bytes,
                status,
                latency_ms,
                "chat api request failed"
            );
        } else if matches!(self.route.as_str(), "/healthz" | "/readyz") {
            debug!(route = %self.route, status, latency_ms, "probe served");
        } else {
            info!(
                request_id = %self.request_id,
                method = %self.method,
                route = %self.route,
                body,
                declared_bytes = ?self.declared_bytes,
                status,
                latency_ms,
                "chat api request served"
            );
        }
    }
}

pub(super) async fn request_observability_middleware(mut req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(req.headers());
    let line = RequestLine::capture(&req, request_id.clone());
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
        route: line.route.clone(),
    });

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    line.finish(response.status().as_u16());
    response
}

fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn normalize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LEN {
        return None;
    }

    trimmed
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'))
        .then(|| trimmed.to_string())
}
