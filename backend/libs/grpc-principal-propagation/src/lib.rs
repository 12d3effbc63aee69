//! Principal Propagation for gRPC Servers
//!
//! This library authenticates incoming gRPC calls from a bearer credential in
//! call metadata and propagates the resolved principal into the call's
//! lifecycle, without ever rejecting a call for missing or bad credentials.
//!
//! ## Core Components
//!
//! - **PrincipalInterceptor**: Extracts the `oauth_token` credential and resolves it
//!   through an injected `CredentialValidator`
//! - **PrincipalListener**: Wraps the next handler's listener and binds the principal
//!   into a per-call `CallScope` passed with every lifecycle event
//! - **PrincipalLayer**: Tower middleware applying the same pipeline to tonic services
//! - **PrincipalExt**: Request extension trait for reading the principal in handlers
//! - **InMemoryTokenStore**: Concurrent token -> principal validator for development and tests
//!
//! ## Design
//!
//! - **Authentication only**: deciding what a principal may do is left to handlers
//! - **Anonymous on failure**: absent, empty or invalid tokens forward the call unauthenticated
//! - **Explicit context**: the principal travels in a `CallScope` argument, never in
//!   thread-local state, so concurrent calls cannot observe each other's identity
//! - **Configurable outage policy**: credential-service failures fail open by default
//!
//! ## Usage Example
//!
//! ### Listener chain
//!
//! ```rust,no_run
//! use grpc_principal_propagation::{
//!     CallHandler, CallListener, CallScope, IncomingCall, InMemoryTokenStore,
//!     PrincipalInterceptor, ServerCall,
//! };
//! use std::sync::Arc;
//! use tonic::metadata::MetadataMap;
//! use tonic::Status;
//!
//! struct Greeter;
//!
//! impl CallListener<String> for Greeter {
//!     fn on_message(&mut self, scope: &CallScope, name: String) -> Result<(), Status> {
//!         let caller = scope.attribute::<String>("principal");
//!         println!("{name} from {caller:?}");
//!         Ok(())
//!     }
//!     fn on_half_close(&mut self, _: &CallScope) -> Result<(), Status> { Ok(()) }
//!     fn on_complete(&mut self, _: &CallScope) -> Result<(), Status> { Ok(()) }
//!     fn on_cancel(&mut self, _: &CallScope) -> Result<(), Status> { Ok(()) }
//! }
//!
//! struct GreeterHandler;
//!
//! impl CallHandler<String> for GreeterHandler {
//!     type Listener = Greeter;
//!     fn start_call(&self, _: &dyn ServerCall, _: &MetadataMap) -> Greeter {
//!         Greeter
//!     }
//! }
//!
//! # async fn example() -> Result<(), Status> {
//! let store = Arc::new(InMemoryTokenStore::new());
//! store.insert("tok-123", "alice".to_string());
//! let interceptor = PrincipalInterceptor::new(store);
//!
//! let mut metadata = MetadataMap::new();
//! metadata.insert("oauth_token", "tok-123".parse().unwrap());
//!
//! let call = IncomingCall::new("/demo.Greeter/SayHello");
//! let mut listener = interceptor
//!     .intercept_call(&call, &metadata, &GreeterHandler)
//!     .await?;
//! listener.on_message(&CallScope::empty(), "hello".to_string())?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Tonic server
//!
//! ```rust,no_run
//! use grpc_principal_propagation::{
//!     InMemoryTokenStore, InterceptorConfig, PrincipalExt, PrincipalInterceptor, PrincipalLayer,
//! };
//! use std::sync::Arc;
//! use tonic::{Request, Response, Status};
//!
//! # fn wiring() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InterceptorConfig::from_env()?;
//! let store = Arc::new(InMemoryTokenStore::<String>::new());
//! let layer = PrincipalLayer::new(PrincipalInterceptor::with_config(store, config));
//! // Server::builder().layer(layer).add_service(GreeterServer::new(svc))
//! # Ok(())
//! # }
//!
//! async fn say_hello(request: Request<()>) -> Result<Response<String>, Status> {
//!     let who = request.principal::<String>().cloned().unwrap_or_default();
//!     Ok(Response::new(format!("hello {who}")))
//! }
//! ```

mod call;
mod config;
mod error;
mod extensions;
mod interceptor;
mod layer;
mod listener;
mod store;
mod validator;

pub use call::{CallHandler, CallListener, CallScope, IncomingCall, ServerCall};
pub use config::{FailurePolicy, InterceptorConfig, OAUTH_TOKEN_HEADER, PRINCIPAL_ATTRIBUTE};
pub use error::{ConfigError, CredentialError};
pub use extensions::{AuthenticatedPrincipal, PrincipalExt};
pub use interceptor::PrincipalInterceptor;
pub use layer::{PrincipalLayer, PrincipalService};
pub use listener::{ListenerState, PrincipalListener};
pub use store::InMemoryTokenStore;
pub use validator::{AccessToken, CredentialValidator, BEARER_TOKEN_TYPE};

// Re-export tonic Status for convenience
pub use tonic::Status;
