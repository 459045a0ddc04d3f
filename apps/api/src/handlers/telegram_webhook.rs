use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use jitbroker_application::ApprovalDecision;
use jitbroker_core::AppError;
use jitbroker_domain::RequestId;
use jitbroker_infrastructure::CALLBACK_PREFIX;
use tracing::{info, warn};

use crate::dto::TelegramUpdate;
use crate::error::ApiResult;
use crate::middleware::{WEBHOOK_SECRET_HEADER, secret_matches};
use crate::state::AppState;

/// Receives approve/deny button presses.
///
/// Answers 200 for every authenticated update, including ignored ones, so the
/// Bot API does not redeliver them.
pub async fn telegram_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    if !secret_matches(headers.get(WEBHOOK_SECRET_HEADER), &state.webhook_secret) {
        warn!("webhook rejected, invalid secret token");
        return Err(AppError::Unauthorized("unauthorized".to_owned()).into());
    }

    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(parse_error) => {
            warn!(
                error = %parse_error,
                body_bytes = body.len(),
                "webhook update ignored, invalid payload"
            );
            return Ok(StatusCode::OK);
        }
    };

    let Some(callback) = update.callback_query else {
        return Ok(StatusCode::OK);
    };

    if callback.from.id != state.approver_chat_id {
        warn!(
            update_id = update.update_id,
            user_id = callback.from.id,
            "callback ignored, sender is not the approver"
        );
        return Ok(StatusCode::OK);
    }

    let Some((decision, request_id)) = parse_callback_data(&callback.data) else {
        warn!(data = %callback.data, "callback ignored, unrecognized data");
        return Ok(StatusCode::OK);
    };

    let outcome = state
        .approval_service
        .handle_callback(decision, &request_id)
        .await;
    info!(request_id = %request_id, decision = %decision, outcome = ?outcome, "callback processed");

    Ok(StatusCode::OK)
}

/// Parses `jit:<approve|deny>:<request_id>`.
fn parse_callback_data(data: &str) -> Option<(ApprovalDecision, RequestId)> {
    let mut parts = data.splitn(3, ':');
    if parts.next()? != CALLBACK_PREFIX {
        return None;
    }

    let decision = parts.next()?.parse::<ApprovalDecision>().ok()?;
    let request_id = RequestId::new(parts.next()?).ok()?;
    Some((decision, request_id))
}
