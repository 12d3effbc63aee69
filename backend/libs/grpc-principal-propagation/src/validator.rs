//! Credential-validation contract
//!
//! The interceptor does not know how bearer tokens are minted or stored. It
//! hands each token to a [`CredentialValidator`] injected at construction and
//! forwards whatever principal comes back.

use crate::error::CredentialError;
use async_trait::async_trait;
use std::fmt;

/// Token type reported for every credential read from call metadata
pub const BEARER_TOKEN_TYPE: &str = "bearer";

/// Transient access-token representation built once per call
///
/// Holds the raw token string taken from the credential header. The value is
/// redacted from `Debug` output so it never reaches the logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Raw token string
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> &'static str {
        BEARER_TOKEN_TYPE
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &BEARER_TOKEN_TYPE)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Resolves bearer tokens into authenticated principals
///
/// One instance is shared by every in-flight call, so implementations must
/// tolerate concurrent invocation. Resolution may suspend on network or
/// storage I/O; only the call being established waits for it.
///
/// ## Errors
///
/// - `CredentialError::Invalid` for malformed, expired, revoked or unknown tokens
/// - `CredentialError::Unavailable` when the backing service cannot be reached
/// - `CredentialError::Internal` for anything unexpected
#[async_trait]
pub trait CredentialValidator: Send + Sync + 'static {
    /// Opaque identity produced on success
    type Principal: Send + Sync + 'static;

    async fn resolve(&self, token: &AccessToken) -> Result<Self::Principal, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_redacts_value() {
        let token = AccessToken::new("tok-secret-123");
        let rendered = format!("{:?}", token);

        assert!(!rendered.contains("tok-secret-123"));
        assert!(rendered.contains("[REDACTED]"));
        assert_eq!(token.value(), "tok-secret-123");
        assert_eq!(token.token_type(), "bearer");
    }
}
