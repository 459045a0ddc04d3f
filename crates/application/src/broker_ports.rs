mod backend;
mod notifier;
mod secret_store;

pub use backend::{CredentialBackend, MintOptions};
pub use notifier::{ApprovalNotice, Notifier};
pub use secret_store::{
    MintedToken, SecretStoreHealth, SecretStorePolicyManager, SecretStoreReader,
    SecretStoreTokenMinter,
};
