//! Credential decryption.
//!
//! Publishing credentials are stored AES-GCM encrypted; the key never leaves
//! the hosted backend, so decryption is a call to its decrypt function.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::error_body;

/// Ciphertext plus the parameters needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub encrypted: String,
    pub iv: String,
    pub tag: String,
}

/// Decrypted credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([redacted])")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecryptError {
    #[error("decryption service is not configured: {0}")]
    NotConfigured(String),
    #[error("network error calling decryption service: {0}")]
    Network(String),
    #[error("decryption service returned {0}: {1}")]
    Api(u16, String),
    #[error("malformed decryption response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait CredentialDecryptor: Send + Sync {
    /// Fail fast if decryption cannot work at all (missing endpoint or key).
    fn ensure_ready(&self) -> Result<(), DecryptError>;

    async fn decrypt(&self, secret: &EncryptedSecret) -> Result<SecretString, DecryptError>;
}

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    decrypted: String,
}

/// Calls the hosted backend's decrypt function with a service-role key.
#[derive(Clone)]
pub struct FunctionDecryptor {
    client: reqwest::Client,
    endpoint: Option<String>,
    service_key: Option<SecretString>,
}

impl fmt::Debug for FunctionDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecryptor")
            .field("endpoint", &self.endpoint)
            .field("service_key", &self.service_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl FunctionDecryptor {
    pub fn new(client: reqwest::Client, endpoint: Option<String>, service_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.filter(|s| !s.trim().is_empty()),
            service_key: service_key
                .filter(|s| !s.trim().is_empty())
                .map(SecretString::new),
        }
    }

    fn configured(&self) -> Result<(&str, &SecretString), DecryptError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| DecryptError::NotConfigured("DECRYPT_FUNCTION_URL is not set".into()))?;
        let key = self
            .service_key
            .as_ref()
            .ok_or_else(|| DecryptError::NotConfigured("DECRYPT_SERVICE_KEY is not set".into()))?;
        Ok((endpoint, key))
    }
}

#[async_trait]
impl CredentialDecryptor for FunctionDecryptor {
    fn ensure_ready(&self) -> Result<(), DecryptError> {
        self.configured().map(|_| ())
    }

    #[instrument(skip(self, secret), err)]
    async fn decrypt(&self, secret: &EncryptedSecret) -> Result<SecretString, DecryptError> {
        let (endpoint, key) = self.configured()?;

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(key.expose())
            .json(secret)
            .send()
            .await
            .map_err(|e| DecryptError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(DecryptError::Api(status, error_body(resp).await));
        }

        let body: DecryptResponse = resp
            .json()
            .await
            .map_err(|e| DecryptError::InvalidResponse(e.to_string()))?;
        Ok(SecretString::new(body.decrypted))
    }
}
