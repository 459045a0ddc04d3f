use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use jitbroker_domain::{NewAccessRequest, RequestId, RequestStatus};

use crate::dto::{AccessRequestResponse, CreateAccessRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_request_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccessRequest>,
) -> ApiResult<(StatusCode, Json<AccessRequestResponse>)> {
    let input = NewAccessRequest::new(
        payload.requester,
        payload.resource,
        payload.tier,
        payload.reason,
    )?
    .with_scopes(payload.scopes)
    .with_vault_paths(payload.vault_paths);

    let request = state.approval_service.submit(input).await?;

    // Auto-approved credentials are delivered, and claimed, by this response.
    let response = if request.status() == RequestStatus::Approved {
        AccessRequestResponse::from(state.approval_service.poll_status(request.id()).await?)
    } else {
        AccessRequestResponse::from(&request)
    };

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn request_status_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request_id = RequestId::new(request_id)?;
    let view = state.approval_service.poll_status(&request_id).await?;
    Ok(Json(AccessRequestResponse::from(view)))
}
