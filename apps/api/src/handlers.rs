pub mod access_requests;
pub mod health;
pub mod telegram_webhook;
