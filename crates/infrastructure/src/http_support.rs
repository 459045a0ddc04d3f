use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use jitbroker_core::{AppError, AppResult};

/// Returns the response when its status is 2xx, otherwise an upstream error carrying the body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    context: &str,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    Err(AppError::Upstream(format!(
        "{context} returned {status}: {body}"
    )))
}

/// Decodes a successful JSON response body.
pub(crate) async fn read_json<T>(response: reqwest::Response, context: &str) -> AppResult<T>
where
    T: DeserializeOwned,
{
    ensure_success(response, context)
        .await?
        .json::<T>()
        .await
        .map_err(|error| AppError::Upstream(format!("{context} returned invalid JSON: {error}")))
}

/// Maps a transport failure to an upstream error.
pub(crate) fn transport_error(context: &str, error: &reqwest::Error) -> AppError {
    AppError::Upstream(format!("{context} request failed: {error}"))
}

/// Strips trailing slashes so endpoint paths can be appended verbatim.
pub(crate) fn trimmed_base(base_url: &url::Url) -> String {
    base_url.as_str().trim_end_matches('/').to_owned()
}

/// Takes a required non-empty field out of a secret read from the secret store.
pub(crate) fn required_secret(
    secret: &mut BTreeMap<String, String>,
    field: &str,
    path: &str,
) -> AppResult<String> {
    secret
        .remove(field)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Upstream(format!("missing {field} in vault path {path}")))
}
