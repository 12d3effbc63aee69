//! Error types for credential resolution and interceptor configuration

use thiserror::Error;

/// Errors a [`CredentialValidator`](crate::CredentialValidator) may return
///
/// The interceptor never surfaces these to the caller directly. `Invalid`
/// always degrades the call to anonymous; the other variants are subject to
/// the configured [`FailurePolicy`](crate::FailurePolicy).
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Token is malformed, expired, revoked or unknown
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// Validation backend could not be reached or timed out
    #[error("credential service unavailable: {0}")]
    Unavailable(String),

    /// Unexpected validator failure
    #[error("credential service internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Create an invalid-credential error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a service-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure lies with the credential rather than the service
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Errors raised while loading [`InterceptorConfig`](crate::InterceptorConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid credential header name '{0}': must be a lowercase ASCII metadata key")]
    InvalidHeader(String),

    #[error("principal attribute name must not be empty")]
    EmptyAttribute,

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credential_classification() {
        assert!(CredentialError::invalid("expired").is_invalid_credential());
        assert!(!CredentialError::unavailable("timeout").is_invalid_credential());
        assert!(!CredentialError::internal("boom").is_invalid_credential());
    }

    #[test]
    fn test_error_messages() {
        let err = CredentialError::invalid("token expired");
        assert_eq!(err.to_string(), "invalid credential: token expired");

        let err = ConfigError::InvalidValue {
            var: "PRINCIPAL_RESOLVE_TIMEOUT_MS",
            value: "soon".to_string(),
        };
        assert!(err.to_string().contains("PRINCIPAL_RESOLVE_TIMEOUT_MS"));
    }
}
