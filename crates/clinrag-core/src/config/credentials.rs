//! Credential identifiers and their secrets

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Credential as written in configuration: an identifier plus the
/// environment variable that holds the secret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    pub id: String,
    pub api_key_env: String,
}

impl CredentialConfig {
    pub fn resolve(&self) -> Credential {
        Credential {
            id: self.id.clone(),
            api_key: std::env::var(&self.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Resolved credential handed to the generation transport
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub api_key: Option<String>,
}

impl Credential {
    pub fn new(id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            api_key,
        }
    }

    /// Short SHA-256 fingerprint of the secret, safe to log
    pub fn fingerprint(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            let digest = Sha256::digest(key.as_bytes());
            digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
