//! Tower layer running the principal interceptor in front of tonic services
use crate::extensions::AuthenticatedPrincipal;
use crate::interceptor::PrincipalInterceptor;
use crate::validator::CredentialValidator;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::codegen::http;
use tonic::metadata::MetadataMap;
use tower::{Layer, Service};

/// Principal Layer for Tower services
///
/// Resolves the caller's principal before the request reaches the wrapped
/// service and stores it as [`AuthenticatedPrincipal`] in the request
/// extensions. Anonymous requests pass through with no extension set.
/// When the client goes away the response future is dropped, and any
/// in-flight resolution with it.
///
/// ```rust,no_run
/// use grpc_principal_propagation::{InMemoryTokenStore, PrincipalInterceptor, PrincipalLayer};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryTokenStore::<String>::new());
/// let layer = PrincipalLayer::new(PrincipalInterceptor::new(store));
/// // Server::builder().layer(layer).add_service(...)
/// ```
pub struct PrincipalLayer<V> {
    interceptor: PrincipalInterceptor<V>,
}

impl<V> PrincipalLayer<V> {
    pub fn new(interceptor: PrincipalInterceptor<V>) -> Self {
        Self { interceptor }
    }
}

impl<V> Clone for PrincipalLayer<V> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<S, V> Layer<S> for PrincipalLayer<V> {
    type Service = PrincipalService<S, V>;

    fn layer(&self, service: S) -> Self::Service {
        PrincipalService {
            inner: service,
            interceptor: self.interceptor.clone(),
        }
    }
}

pub struct PrincipalService<S, V> {
    inner: S,
    interceptor: PrincipalInterceptor<V>,
}

impl<S: Clone, V> Clone for PrincipalService<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<S, V, B> Service<http::Request<B>> for PrincipalService<S, V>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send,
    V: CredentialValidator,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // Take the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            // Only this call's principal may ever be attached
            req.extensions_mut()
                .remove::<AuthenticatedPrincipal<V::Principal>>();

            let metadata = MetadataMap::from_headers(req.headers().clone());
            interceptor.log_incoming(req.uri().path(), &metadata);

            match interceptor.authenticate(&metadata).await {
                Ok(Some(principal)) => {
                    req.extensions_mut()
                        .insert(AuthenticatedPrincipal::new(principal));
                }
                Ok(None) => {}
                Err(status) => return Ok(status.into_http()),
            }

            inner.call(req).await
        })
    }
}
