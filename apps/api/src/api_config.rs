use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jitbroker_application::{DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_REQUEST_STORE_CAPACITY};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::DEFAULT_VAULT_PATH_PREFIX;
use jitbroker_infrastructure::DEFAULT_GITLAB_PROJECT_ID;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_RATE_LIMIT_WINDOW_MINUTES: u64 = 15;
const DEFAULT_ALLOWED_REQUESTERS: &str = "prometheus";

/// Store cleanup cadence.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Age after which resolved requests are purged.
pub const CLEANUP_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Runtime configuration read from the environment.
#[derive(Clone)]
pub struct ApiConfig {
    pub vault_addr: Url,
    pub vault_role_id: String,
    pub vault_secret_id: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,
    pub telegram_webhook_secret: String,
    pub telegram_webhook_url: Option<String>,
    pub api_key: String,
    pub listen_addr: SocketAddr,
    pub request_timeout: Duration,
    pub allowed_requesters: Vec<String>,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub max_requests: usize,
    pub vault_path_prefix: String,
    pub home_assistant_url: Option<Url>,
    pub grafana_url: Option<Url>,
    pub gitlab_url: Option<Url>,
    pub gitlab_admin_token: Option<String>,
    pub gitlab_project_id: String,
}

impl ApiConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let telegram_chat_id = env.required("TELEGRAM_CHAT_ID")?;
        let telegram_chat_id = telegram_chat_id.trim().parse::<i64>().map_err(|_| {
            AppError::Validation(format!(
                "TELEGRAM_CHAT_ID must be an integer, got '{telegram_chat_id}'"
            ))
        })?;

        let listen_addr = env
            .optional("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = SocketAddr::from_str(listen_addr.trim()).map_err(|error| {
            AppError::Validation(format!("invalid LISTEN_ADDR '{listen_addr}': {error}"))
        })?;

        let allowed_requesters: Vec<String> = env
            .optional("ALLOWED_REQUESTERS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_REQUESTERS.to_owned())
            .split(',')
            .map(str::trim)
            .filter(|requester| !requester.is_empty())
            .map(str::to_owned)
            .collect();
        if allowed_requesters.is_empty() {
            return Err(AppError::Validation(
                "ALLOWED_REQUESTERS must name at least one requester".to_owned(),
            ));
        }

        let request_timeout = env.positive("REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let rate_limit_window =
            env.positive("JIT_RATE_LIMIT_WINDOW_MIN", DEFAULT_RATE_LIMIT_WINDOW_MINUTES)?;

        Ok(Self {
            vault_addr: env.required_url("VAULT_ADDR")?,
            vault_role_id: env.required("VAULT_ROLE_ID")?,
            vault_secret_id: env.required("VAULT_SECRET_ID")?,
            telegram_bot_token: env.required("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id,
            telegram_webhook_secret: env.required("TELEGRAM_WEBHOOK_SECRET")?,
            telegram_webhook_url: env.optional("TELEGRAM_WEBHOOK_URL"),
            api_key: env.required("JIT_API_KEY")?,
            listen_addr,
            request_timeout: Duration::from_secs(request_timeout),
            allowed_requesters,
            rate_limit_max: env.positive("JIT_RATE_LIMIT_MAX", DEFAULT_RATE_LIMIT_MAX_REQUESTS)?,
            rate_limit_window: Duration::from_secs(rate_limit_window.saturating_mul(60)),
            max_requests: env.positive("JIT_MAX_REQUESTS", DEFAULT_REQUEST_STORE_CAPACITY)?,
            vault_path_prefix: env
                .optional("VAULT_PATH_PREFIX")
                .unwrap_or_else(|| DEFAULT_VAULT_PATH_PREFIX.to_owned()),
            home_assistant_url: env.optional_url("HA_URL")?,
            grafana_url: env.optional_url("GRAFANA_URL")?,
            gitlab_url: env.optional_url("GITLAB_URL")?,
            gitlab_admin_token: env.optional("GITLAB_ADMIN_TOKEN"),
            gitlab_project_id: env
                .optional("GITLAB_PROJECT_ID")
                .unwrap_or_else(|| DEFAULT_GITLAB_PROJECT_ID.to_owned()),
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn required_url(&self, name: &str) -> AppResult<Url> {
        parse_url(name, &self.required(name)?)
    }

    fn optional_url(&self, name: &str) -> AppResult<Option<Url>> {
        self.optional(name)
            .map(|value| parse_url(name, &value))
            .transpose()
    }

    fn positive<T>(&self, name: &str, default: T) -> AppResult<T>
    where
        T: FromStr + Default + PartialEq,
    {
        let Some(raw) = self.optional(name) else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(value) if value != T::default() => Ok(value),
            _ => Err(AppError::Validation(format!(
                "{name} must be a positive integer, got '{raw}'"
            ))),
        }
    }
}

fn parse_url(name: &str, value: &str) -> AppResult<Url> {
    Url::parse(value.trim())
        .map_err(|error| AppError::Validation(format!("invalid {name} '{value}': {error}")))
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
