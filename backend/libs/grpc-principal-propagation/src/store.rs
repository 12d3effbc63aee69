//! In-memory token store
//!
//! A [`CredentialValidator`] backed by a concurrent map of token -> principal.
//! Suitable for development, single-node deployments and tests.

use crate::error::CredentialError;
use crate::validator::{AccessToken, CredentialValidator};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use tracing::debug;

/// Concurrent token store resolving tokens to cloned principals
///
/// Revoking a token removes it; later resolutions report it as invalid.
pub struct InMemoryTokenStore<P> {
    tokens: DashMap<String, P>,
}

impl<P> fmt::Debug for InMemoryTokenStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTokenStore")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl<P> Default for InMemoryTokenStore<P> {
    fn default() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }
}

impl<P> InMemoryTokenStore<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token, replacing any principal previously stored under it
    pub fn insert(&self, token: impl Into<String>, principal: P) -> Option<P> {
        self.tokens.insert(token.into(), principal)
    }

    /// Revoke a token, returning the principal it mapped to
    pub fn revoke(&self, token: &str) -> Option<P> {
        self.tokens.remove(token).map(|(_, principal)| principal)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<P> FromIterator<(String, P)> for InMemoryTokenStore<P> {
    fn from_iter<I: IntoIterator<Item = (String, P)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<P> CredentialValidator for InMemoryTokenStore<P>
where
    P: Clone + Send + Sync + 'static,
{
    type Principal = P;

    async fn resolve(&self, token: &AccessToken) -> Result<P, CredentialError> {
        match self.tokens.get(token.value()) {
            Some(entry) => Ok(entry.value().clone()),
            None => {
                debug!("Token not found in store");
                Err(CredentialError::invalid("unknown or revoked token"))
            }
        }
    }
}
