//! Credential providers.
//!
//! The manager asks its provider for a token on every `connect`. A
//! missing token refuses the connection before any transport call.

/// Default environment variable read by [`EnvCredential`].
pub const DEFAULT_TOKEN_ENV: &str = "ROOMLINK_TOKEN";

/// Supplies the opaque bearer token used to authenticate a channel.
pub trait CredentialProvider: Send + Sync {
    /// The current token, or `None` when the user is not authenticated.
    fn token(&self) -> Option<String>;
}

/// A fixed token (or the fixed absence of one).
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that never has a token.
    pub fn none() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredential {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Reads the token from an environment variable at connect time.
///
/// Blank values count as absent.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_ENV)
    }
}

impl CredentialProvider for EnvCredential {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}
