//! Request extension access for tonic handlers
//!
//! [`PrincipalLayer`](crate::PrincipalLayer) stores the resolved principal in
//! the request extensions; handlers read it back through [`PrincipalExt`].

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tonic::{Request, Status};

/// Principal attached to a single request by the principal layer
pub struct AuthenticatedPrincipal<P>(Arc<P>);

impl<P> AuthenticatedPrincipal<P> {
    pub fn new(principal: Arc<P>) -> Self {
        Self(principal)
    }

    pub fn principal(&self) -> &P {
        &self.0
    }

    pub fn shared(&self) -> Arc<P> {
        Arc::clone(&self.0)
    }
}

impl<P> Clone for AuthenticatedPrincipal<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> Deref for AuthenticatedPrincipal<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}

impl<P> fmt::Debug for AuthenticatedPrincipal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthenticatedPrincipal([REDACTED])")
    }
}

/// Extension trait for reading the principal from gRPC requests
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_principal_propagation::PrincipalExt;
/// use tonic::{Request, Response, Status};
///
/// async fn whoami(request: Request<()>) -> Result<Response<String>, Status> {
///     let name = request
///         .principal::<String>()
///         .cloned()
///         .unwrap_or_else(|| "anonymous".to_string());
///     Ok(Response::new(name))
/// }
/// ```
pub trait PrincipalExt {
    /// Principal resolved for this call, `None` when anonymous
    fn principal<P: Send + Sync + 'static>(&self) -> Option<&P>;

    /// Principal resolved for this call
    ///
    /// ## Errors
    ///
    /// Returns `Status::unauthenticated` when the call is anonymous.
    fn require_principal<P: Send + Sync + 'static>(&self) -> Result<&P, Status>;
}

impl<T> PrincipalExt for Request<T> {
    fn principal<P: Send + Sync + 'static>(&self) -> Option<&P> {
        self.extensions()
            .get::<AuthenticatedPrincipal<P>>()
            .map(AuthenticatedPrincipal::principal)
    }

    fn require_principal<P: Send + Sync + 'static>(&self) -> Result<&P, Status> {
        self.principal::<P>()
            .ok_or_else(|| Status::unauthenticated("No authenticated principal for this call"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct User {
        id: String,
    }

    #[test]
    fn test_principal_missing() {
        let request = Request::new(());

        assert!(request.principal::<User>().is_none());
        let status = request.require_principal::<User>().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_principal_present() {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(AuthenticatedPrincipal::new(Arc::new(User {
                id: "alice".to_string(),
            })));

        let user = request.require_principal::<User>().unwrap();
        assert_eq!(user.id, "alice");
    }

    #[test]
    fn test_principal_wrong_type() {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(AuthenticatedPrincipal::new(Arc::new("alice".to_string())));

        assert!(request.principal::<User>().is_none());
        assert_eq!(request.principal::<String>().map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let principal = AuthenticatedPrincipal::new(Arc::new(User {
            id: "alice".to_string(),
        }));

        assert!(!format!("{:?}", principal).contains("alice"));
        assert_eq!(principal.id, "alice");
        assert_eq!(principal.shared().id, "alice");
    }
}
