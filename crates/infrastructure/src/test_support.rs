use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use jitbroker_application::SecretStoreReader;
use jitbroker_core::{AppError, AppResult};

/// In-memory secret reader keyed by path.
#[derive(Default)]
pub(crate) struct FakeSecretReader {
    secrets: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl FakeSecretReader {
    pub(crate) fn with_secret(path: &str, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        Self {
            secrets: Mutex::new(BTreeMap::from([(path.to_owned(), fields)])),
        }
    }
}

#[async_trait]
impl SecretStoreReader for FakeSecretReader {
    async fn read_secret(&self, path: &str) -> AppResult<BTreeMap<String, String>> {
        self.secrets
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::Upstream(format!("no KV v2 data at path {path}")))
    }
}
