//! Process-wide authentication context.
//!
//! Built once at startup and handed to every component that talks to the
//! backend. Token acquisition itself belongs to the identity provider; this
//! module only asks a [`TokenProvider`] for the current bearer token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Source of the caller's identity token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current identity token, or `None` when nobody is signed in.
    async fn id_token(&self) -> Result<Option<String>>;
}

/// Fixed token, e.g. from a CLI flag or environment variable.
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn id_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Shared handle to the signed-in identity.
#[derive(Clone)]
pub struct AuthContext {
    provider: Arc<dyn TokenProvider>,
    signed_out: Arc<AtomicBool>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            signed_out: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context with a fixed token.
    pub fn with_token(token: Option<String>) -> Self {
        Self::new(Arc::new(StaticToken::new(token)))
    }

    /// Bearer token for the next request.
    pub async fn bearer(&self) -> Result<String> {
        if self.signed_out.load(Ordering::Acquire) {
            return Err(Error::NotAuthenticated);
        }
        self.provider
            .id_token()
            .await?
            .ok_or(Error::NotAuthenticated)
    }

    pub async fn is_signed_in(&self) -> bool {
        self.bearer().await.is_ok()
    }

    /// Explicit teardown. Every clone of this context reports
    /// `NotAuthenticated` afterwards.
    pub fn sign_out(&self) {
        self.signed_out.store(true, Ordering::Release);
        tracing::info!("Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bearer_requires_token() {
        let auth = AuthContext::with_token(None);
        assert!(matches!(auth.bearer().await, Err(Error::NotAuthenticated)));

        let auth = AuthContext::with_token(Some("   ".to_string()));
        assert!(!auth.is_signed_in().await);

        let auth = AuthContext::with_token(Some("tok-123".to_string()));
        assert_eq!(auth.bearer().await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn test_sign_out_applies_to_all_clones() {
        let auth = AuthContext::with_token(Some("tok-123".to_string()));
        let injected = auth.clone();

        auth.sign_out();

        assert!(matches!(
            injected.bearer().await,
            Err(Error::NotAuthenticated)
        ));
    }
}
