use std::sync::Arc;
use std::time::Instant;

use jitbroker_application::ApprovalService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub approval_service: ApprovalService,
    pub api_key: Arc<str>,
    pub webhook_secret: Arc<str>,
    pub approver_chat_id: i64,
    pub started_at: Instant,
}
