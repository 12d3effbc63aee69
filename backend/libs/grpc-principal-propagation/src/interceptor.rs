//! Credential extraction and resolution
//!
//! Runs once at call start: reads the bearer token from call metadata,
//! resolves it through the injected [`CredentialValidator`], starts the next
//! handler and wraps its listener in a [`PrincipalListener`].

use crate::call::{CallHandler, CallListener, CallScope, ServerCall};
use crate::config::{FailurePolicy, InterceptorConfig};
use crate::error::CredentialError;
use crate::listener::PrincipalListener;
use crate::validator::{AccessToken, CredentialValidator};
use std::sync::Arc;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::Status;
use tracing::{debug, info, warn};

/// Placeholder logged in place of the credential value
const REDACTED: &str = "[REDACTED]";

/// Server-side interceptor that authenticates calls without ever rejecting
/// them for missing or bad credentials
///
/// ## Behavior
///
/// - **Anonymous by default**: absent, empty or invalid tokens forward the
///   call with no principal bound
/// - **One principal per call**: the principal lives in the call's own
///   [`CallScope`] and nowhere else
/// - **Explicit failure policy**: credential-service outages follow
///   [`FailurePolicy`] (fail-open unless configured otherwise)
/// - **Redacted logging**: one `info` line per call with the incoming
///   metadata, credential masked, principal never printed
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_principal_propagation::{InMemoryTokenStore, PrincipalInterceptor};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryTokenStore::<String>::new());
/// store.insert("tok-123", "alice".to_string());
///
/// let interceptor = PrincipalInterceptor::new(store);
/// // let listener = interceptor.intercept_call(&call, &metadata, &next).await?;
/// ```
pub struct PrincipalInterceptor<V> {
    validator: Arc<V>,
    config: Arc<InterceptorConfig>,
}

impl<V> Clone for PrincipalInterceptor<V> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            config: Arc::clone(&self.config),
        }
    }
}

impl<V> PrincipalInterceptor<V>
where
    V: CredentialValidator,
{
    /// Create an interceptor with the default configuration
    pub fn new(validator: Arc<V>) -> Self {
        Self::with_config(validator, InterceptorConfig::default())
    }

    pub fn with_config(validator: Arc<V>, config: InterceptorConfig) -> Self {
        Self {
            validator,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<V> {
        &self.validator
    }

    /// Read the bearer token from `metadata`
    ///
    /// Returns `None` when the header is absent, empty, or not printable
    /// ASCII. When the key repeats, the last value is used.
    pub fn extract_token(&self, metadata: &MetadataMap) -> Option<AccessToken> {
        let value = metadata
            .get_all(self.config.credential_header.as_str())
            .iter()
            .last()?;

        match value.to_str() {
            Ok("") => None,
            Ok(token) => Some(AccessToken::new(token)),
            Err(e) => {
                warn!(
                    header = %self.config.credential_header,
                    error = %e,
                    "Malformed credential header, treating call as anonymous"
                );
                None
            }
        }
    }

    /// Resolve the caller's principal from `metadata`
    ///
    /// `Ok(None)` means anonymous. Resolution is bounded by the configured
    /// timeout; a timeout counts as the credential service being unavailable.
    ///
    /// ## Errors
    ///
    /// Returns `Status::unavailable` only under [`FailurePolicy::FailClosed`]
    /// when the credential service fails or times out. Invalid credentials
    /// never produce an error.
    pub async fn authenticate(
        &self,
        metadata: &MetadataMap,
    ) -> Result<Option<Arc<V::Principal>>, Status> {
        let Some(token) = self.extract_token(metadata) else {
            debug!("No credential presented, call is anonymous");
            return Ok(None);
        };

        let timeout = self.config.resolve_timeout;
        let resolved = match tokio::time::timeout(timeout, self.validator.resolve(&token)).await {
            Ok(result) => result,
            Err(_) => Err(CredentialError::unavailable(format!(
                "credential resolution timed out after {:?}",
                timeout
            ))),
        };

        match resolved {
            Ok(principal) => {
                debug!(authenticated = true, "Credential resolved");
                Ok(Some(Arc::new(principal)))
            }
            Err(e) if e.is_invalid_credential() => {
                warn!(error = %e, "Credential rejected, treating call as anonymous");
                Ok(None)
            }
            Err(e) => match self.config.failure_policy {
                FailurePolicy::FailOpen => {
                    warn!(error = %e, "Credential service failed, treating call as anonymous");
                    Ok(None)
                }
                FailurePolicy::FailClosed => {
                    warn!(error = %e, "Credential service failed, rejecting call");
                    Err(Status::unavailable("credential service unavailable"))
                }
            },
        }
    }

    /// Authenticate the call and hand it to `next`
    ///
    /// The next handler is started after resolution finishes and its listener
    /// is wrapped so the principal (if any) is bound under the configured
    /// attribute. If the call is cancelled while resolution is pending, the
    /// pending result is discarded, the next handler is still started and
    /// immediately receives the cancellation; the returned listener is
    /// already terminated.
    ///
    /// ## Errors
    ///
    /// - `Status::unavailable` under [`FailurePolicy::FailClosed`] (see
    ///   [`authenticate`](Self::authenticate)); the call is not forwarded
    /// - Errors the downstream listener returns from its cancellation event
    pub async fn intercept_call<Req, C, H>(
        &self,
        call: &C,
        metadata: &MetadataMap,
        next: &H,
    ) -> Result<PrincipalListener<H::Listener>, Status>
    where
        C: ServerCall,
        H: CallHandler<Req>,
    {
        self.log_incoming(call.method(), metadata);

        let outcome = tokio::select! {
            biased;
            _ = call.cancellation().cancelled() => None,
            outcome = self.authenticate(metadata) => Some(outcome),
        };

        let attribute = self.config.principal_attribute.clone();

        let Some(outcome) = outcome else {
            debug!(
                method = call.method(),
                "Call cancelled during credential resolution, discarding result"
            );
            let inner = next.start_call(call, metadata);
            let mut listener = PrincipalListener::new::<V::Principal>(inner, attribute, None);
            CallListener::<Req>::on_cancel(&mut listener, &CallScope::empty())?;
            return Ok(listener);
        };

        let principal = outcome?;
        debug!(
            method = call.method(),
            attribute = %attribute,
            authenticated = principal.is_some(),
            "Forwarding call to next handler"
        );

        let inner = next.start_call(call, metadata);
        Ok(PrincipalListener::new(inner, attribute, principal))
    }

    /// Emit the per-call diagnostic line
    pub(crate) fn log_incoming(&self, method: &str, metadata: &MetadataMap) {
        let metadata = redacted_metadata(metadata, &self.config.credential_header);
        info!(method, metadata = ?metadata, "Header received from client");
    }
}

/// Copy of `metadata` with every value of `credential_header` masked
pub(crate) fn redacted_metadata(metadata: &MetadataMap, credential_header: &str) -> MetadataMap {
    let mut redacted = metadata.clone();

    if redacted.contains_key(credential_header) {
        if let Ok(key) = AsciiMetadataKey::from_bytes(credential_header.as_bytes()) {
            redacted.insert(key, AsciiMetadataValue::from_static(REDACTED));
        }
    }

    redacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tonic::metadata::MetadataValue;

    fn store() -> Arc<InMemoryTokenStore<String>> {
        let store = Arc::new(InMemoryTokenStore::new());
        store.insert("tok-123", "alice".to_string());
        store
    }

    fn metadata_with(token: &'static str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert("oauth_token", MetadataValue::from_static(token));
        metadata
    }

    struct DownValidator;

    #[async_trait]
    impl CredentialValidator for DownValidator {
        type Principal = String;

        async fn resolve(&self, _token: &AccessToken) -> Result<String, CredentialError> {
            Err(CredentialError::unavailable("connection refused"))
        }
    }

    struct BrokenValidator;

    #[async_trait]
    impl CredentialValidator for BrokenValidator {
        type Principal = String;

        async fn resolve(&self, _token: &AccessToken) -> Result<String, CredentialError> {
            Err(CredentialError::internal("decoder panicked"))
        }
    }

    struct SlowValidator;

    #[async_trait]
    impl CredentialValidator for SlowValidator {
        type Principal = String;

        async fn resolve(&self, _token: &AccessToken) -> Result<String, CredentialError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }
    }

    #[test]
    fn test_extract_missing_header() {
        let interceptor = PrincipalInterceptor::new(store());
        assert!(interceptor.extract_token(&MetadataMap::new()).is_none());
    }

    #[test]
    fn test_extract_empty_header() {
        let interceptor = PrincipalInterceptor::new(store());
        assert!(interceptor.extract_token(&metadata_with("")).is_none());
    }

    #[test]
    fn test_extract_last_value_wins() {
        let interceptor = PrincipalInterceptor::new(store());
        let mut metadata = metadata_with("first");
        metadata.append("oauth_token", MetadataValue::from_static("second"));

        let token = interceptor.extract_token(&metadata).unwrap();
        assert_eq!(token.value(), "second");
    }

    #[test]
    fn test_extract_non_ascii_header_is_anonymous() {
        let interceptor = PrincipalInterceptor::new(store());
        let mut metadata = MetadataMap::new();
        metadata.insert(
            "oauth_token",
            MetadataValue::try_from(&b"tok\xff123"[..]).unwrap(),
        );

        assert!(interceptor.extract_token(&metadata).is_none());
    }

    #[test]
    fn test_extract_custom_header() {
        let config = InterceptorConfig::default()
            .with_credential_header("x-api-token")
            .unwrap();
        let interceptor = PrincipalInterceptor::with_config(store(), config);

        let mut metadata = metadata_with("ignored");
        metadata.insert("x-api-token", MetadataValue::from_static("tok-123"));

        assert_eq!(interceptor.extract_token(&metadata).unwrap().value(), "tok-123");
    }

    #[tokio::test]
    async fn test_authenticate_valid_token() {
        let interceptor = PrincipalInterceptor::new(store());

        let principal = interceptor.authenticate(&metadata_with("tok-123")).await.unwrap();
        assert_eq!(principal.as_deref().map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_authenticate_invalid_token_is_anonymous() {
        let interceptor = PrincipalInterceptor::new(store());

        let principal = interceptor.authenticate(&metadata_with("expired-tok")).await.unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_invalid_token_anonymous_even_when_fail_closed() {
        let config = InterceptorConfig::default().with_failure_policy(FailurePolicy::FailClosed);
        let interceptor = PrincipalInterceptor::with_config(store(), config);

        let principal = interceptor.authenticate(&metadata_with("expired-tok")).await.unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_service_down_fail_open() {
        let interceptor = PrincipalInterceptor::new(Arc::new(DownValidator));

        let principal = interceptor.authenticate(&metadata_with("tok-123")).await.unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_service_down_fail_closed() {
        let config = InterceptorConfig::default().with_failure_policy(FailurePolicy::FailClosed);
        let interceptor = PrincipalInterceptor::with_config(Arc::new(DownValidator), config);

        let status = interceptor
            .authenticate(&metadata_with("tok-123"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn test_internal_error_fail_open() {
        let interceptor = PrincipalInterceptor::new(Arc::new(BrokenValidator));

        let principal = interceptor.authenticate(&metadata_with("tok-123")).await.unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_internal_error_fail_closed() {
        let config = InterceptorConfig::default().with_failure_policy(FailurePolicy::FailClosed);
        let interceptor = PrincipalInterceptor::with_config(Arc::new(BrokenValidator), config);

        let status = interceptor
            .authenticate(&metadata_with("tok-123"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_timeout_fail_open() {
        let config = InterceptorConfig::default().with_resolve_timeout(Duration::from_millis(100));
        let interceptor = PrincipalInterceptor::with_config(Arc::new(SlowValidator), config);

        let principal = interceptor.authenticate(&metadata_with("tok-123")).await.unwrap();
        assert!(principal.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_timeout_fail_closed() {
        let config = InterceptorConfig::default()
            .with_resolve_timeout(Duration::from_millis(100))
            .with_failure_policy(FailurePolicy::FailClosed);
        let interceptor = PrincipalInterceptor::with_config(Arc::new(SlowValidator), config);

        let status = interceptor
            .authenticate(&metadata_with("tok-123"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_redacted_metadata_masks_credential() {
        let mut metadata = metadata_with("tok-secret");
        metadata.insert("x-request-id", MetadataValue::from_static("req-1"));

        let redacted = redacted_metadata(&metadata, "oauth_token");
        let rendered = format!("{:?}", redacted);

        assert!(!rendered.contains("tok-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("req-1"));
        // source metadata is untouched
        assert_eq!(metadata.get("oauth_token").unwrap().to_str().unwrap(), "tok-secret");
    }

    #[test]
    fn test_redacted_metadata_without_credential() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-request-id", MetadataValue::from_static("req-1"));

        let redacted = redacted_metadata(&metadata, "oauth_token");
        assert!(!redacted.contains_key("oauth_token"));
        assert_eq!(redacted.len(), 1);
    }
}
