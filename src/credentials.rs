//! Access token sources for the realtime handshake.

use anyhow::Result;

/// Supplies the bearer token used on every connection attempt.
///
/// Returning `Ok(None)` means no credentials are stored; the client treats that
/// as fatal and stops trying to connect.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Fixed token, mostly for tests and one-off tools
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider with nothing stored
    pub fn absent() -> Self {
        Self(None)
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every attempt, so a token
/// rotated in the environment is picked up on the next reconnect.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for EnvToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}
