//! Interceptor configuration
//!
//! Defaults match the wire contract clients already use: the bearer token
//! travels in the `oauth_token` metadata key and handlers read the resolved
//! identity from the `principal` attribute.

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;
use tonic::metadata::AsciiMetadataKey;
use tracing::info;

/// Metadata key carrying the bearer credential
pub const OAUTH_TOKEN_HEADER: &str = "oauth_token";

/// Call-scope attribute under which the resolved principal is exposed
pub const PRINCIPAL_ATTRIBUTE: &str = "principal";

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when the credential service itself fails
///
/// Invalid credentials always degrade to anonymous. This policy only governs
/// `Unavailable`/`Internal` validator errors and resolution timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Forward the call anonymously
    #[default]
    FailOpen,
    /// Reject the call with `Status::unavailable`
    FailClosed,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            _ => Err(ConfigError::InvalidValue {
                var: "PRINCIPAL_FAILURE_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration shared by [`PrincipalInterceptor`](crate::PrincipalInterceptor)
/// and [`PrincipalLayer`](crate::PrincipalLayer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    /// Metadata key holding the bearer token (lowercase ASCII)
    pub credential_header: String,
    /// Name of the call-scope attribute the principal is bound to
    pub principal_attribute: String,
    /// Upper bound on a single credential resolution
    pub resolve_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            credential_header: OAUTH_TOKEN_HEADER.to_string(),
            principal_attribute: PRINCIPAL_ATTRIBUTE.to_string(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl InterceptorConfig {
    /// Load configuration from environment variables
    ///
    /// **Environment Variables**:
    /// - `PRINCIPAL_CREDENTIAL_HEADER`: metadata key (default `oauth_token`)
    /// - `PRINCIPAL_ATTRIBUTE_NAME`: call-scope attribute (default `principal`)
    /// - `PRINCIPAL_RESOLVE_TIMEOUT_MS`: resolution timeout (default 5000)
    /// - `PRINCIPAL_FAILURE_POLICY`: `fail_open` (default) or `fail_closed`
    ///
    /// ## Errors
    ///
    /// Returns `ConfigError` if any variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(header) = std::env::var("PRINCIPAL_CREDENTIAL_HEADER") {
            config = config.with_credential_header(header)?;
        }

        if let Ok(attribute) = std::env::var("PRINCIPAL_ATTRIBUTE_NAME") {
            config = config.with_principal_attribute(attribute)?;
        }

        if let Ok(raw) = std::env::var("PRINCIPAL_RESOLVE_TIMEOUT_MS") {
            let millis = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: "PRINCIPAL_RESOLVE_TIMEOUT_MS",
                    value: raw.clone(),
                })?;
            config.resolve_timeout = Duration::from_millis(millis);
        }

        if let Ok(raw) = std::env::var("PRINCIPAL_FAILURE_POLICY") {
            config.failure_policy = raw.parse()?;
        }

        info!(
            credential_header = %config.credential_header,
            principal_attribute = %config.principal_attribute,
            resolve_timeout_ms = config.resolve_timeout.as_millis() as u64,
            failure_policy = ?config.failure_policy,
            "Principal interceptor configuration loaded"
        );

        Ok(config)
    }

    /// Set the credential header, validating it as an ASCII metadata key
    ///
    /// ## Errors
    ///
    /// Returns `ConfigError::InvalidHeader` for binary (`-bin`) keys or names
    /// that are not legal metadata keys.
    pub fn with_credential_header(mut self, header: impl Into<String>) -> Result<Self, ConfigError> {
        let header = header.into().trim().to_ascii_lowercase();

        if header.is_empty() || AsciiMetadataKey::from_bytes(header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidHeader(header));
        }

        self.credential_header = header;
        Ok(self)
    }

    /// Set the principal attribute name
    ///
    /// ## Errors
    ///
    /// Returns `ConfigError::EmptyAttribute` for a blank name.
    pub fn with_principal_attribute(
        mut self,
        attribute: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let attribute = attribute.into();
        if attribute.trim().is_empty() {
            return Err(ConfigError::EmptyAttribute);
        }

        self.principal_attribute = attribute;
        Ok(self)
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}
