//! Bearer credentials for the remote store.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::fmt;

/// A bearer credential. The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token, for building request headers.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"<redacted>").finish()
    }
}

/// Supplies the credential for a sync cycle.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns `Ok(None)` when the user is not signed in.
    async fn access_token(&self) -> StorageResult<Option<AccessToken>>;
}

/// A provider that always hands out the same token (or none).
#[derive(Clone, Debug, Default)]
pub struct StaticTokenProvider {
    token: Option<AccessToken>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(AccessToken::new(token)),
        }
    }

    /// A provider for a signed-out user.
    pub fn signed_out() -> Self {
        Self { token: None }
    }

    pub fn from_option(token: Option<String>) -> Self {
        Self {
            token: token.map(AccessToken::new),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> StorageResult<Option<AccessToken>> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let token = AccessToken::new("ya29.secret");
        assert!(!format!("{token:?}").contains("ya29"));
        assert_eq!(token.secret(), "ya29.secret");
    }

    #[tokio::test]
    async fn static_provider_returns_configured_token() {
        let provider = StaticTokenProvider::new("t");
        assert_eq!(
            provider.access_token().await.unwrap(),
            Some(AccessToken::new("t"))
        );
        assert_eq!(StaticTokenProvider::signed_out().access_token().await.unwrap(), None);
    }
}
