use crate::error::EngineError;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Decrypted exchange credentials for one user.
///
/// Only the API key travels with requests; the secret stays with the
/// authenticated transport that signs them.
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
}

/// Per-user credential lookup.
///
/// Implementations own decryption of whatever ciphertext the linking flow
/// stored; the engine only sees decrypted credentials or a credential
/// error, which excludes the user for the current tick.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credentials_for(&self, user_id: Uuid) -> Result<ExchangeCredentials>;
}

/// Single-operator store: every user resolves to the credentials from the
/// process environment.
pub struct EnvCredentialStore {
    api_key: String,
}

impl EnvCredentialStore {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| EngineError::Credential("BINANCE_API_KEY not set".to_string()))?;
        Ok(Self { api_key })
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn credentials_for(&self, _user_id: Uuid) -> Result<ExchangeCredentials> {
        Ok(ExchangeCredentials {
            api_key: self.api_key.clone(),
        })
    }
}

/// Fixed user-to-credentials map, used by tests and local setups
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: HashMap<Uuid, ExchangeCredentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: Uuid, api_key: &str) {
        self.entries.insert(
            user_id,
            ExchangeCredentials {
                api_key: api_key.to_string(),
            },
        );
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credentials_for(&self, user_id: Uuid) -> Result<ExchangeCredentials> {
        self.entries
            .get(&user_id)
            .cloned()
            .ok_or_else(|| EngineError::Credential(format!("no exchange link for {user_id}")))
    }
}
