use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use jitbroker_core::AppError;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ApiResult;
use crate::state::AppState;

/// Caller shared-secret header.
pub const API_KEY_HEADER: &str = "X-JIT-API-Key";

/// Telegram webhook shared-secret header.
pub const WEBHOOK_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if !secret_matches(request.headers().get(API_KEY_HEADER), &state.api_key) {
        warn!(path = %request.uri().path(), "request rejected, invalid api key");
        return Err(AppError::Unauthorized("invalid or missing API key".to_owned()).into());
    }

    Ok(next.run(request).await)
}

/// Constant-time comparison of a presented header against a configured secret.
pub fn secret_matches(presented: Option<&HeaderValue>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };

    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
