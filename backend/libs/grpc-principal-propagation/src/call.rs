//! Server-call lifecycle abstractions
//!
//! The transport drives one [`CallListener`] per call. Instead of ambient
//! thread-local context, every lifecycle event carries an immutable
//! [`CallScope`] holding the attributes bound for that call only.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::Status;

/// Immutable per-call attribute set
///
/// Cloning is cheap (shared map). Adding an attribute produces a new scope and
/// leaves the original untouched, so a scope handed to one call can never be
/// altered by another.
#[derive(Clone, Default)]
pub struct CallScope {
    attributes: Arc<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl CallScope {
    /// Scope with no attributes bound
    pub fn empty() -> Self {
        Self::default()
    }

    /// Return a new scope with `name` bound to `value`
    pub fn with_attribute<T>(&self, name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let mut attributes = (*self.attributes).clone();
        attributes.insert(name.into(), value);
        Self {
            attributes: Arc::new(attributes),
        }
    }

    /// Borrow the attribute bound under `name`, if it has type `T`
    pub fn attribute<T: 'static>(&self, name: &str) -> Option<&T> {
        self.attributes
            .get(name)
            .and_then(|value| (**value).downcast_ref::<T>())
    }

    /// Shared handle to the attribute bound under `name`, if it has type `T`
    pub fn attribute_arc<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.attributes
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Layer `overlay` on top of this scope; overlay bindings win
    pub(crate) fn merged(&self, overlay: &CallScope) -> CallScope {
        if self.is_empty() {
            return overlay.clone();
        }
        if overlay.is_empty() {
            return self.clone();
        }

        let mut attributes = (*self.attributes).clone();
        for (name, value) in overlay.attributes.iter() {
            attributes.insert(name.clone(), Arc::clone(value));
        }
        CallScope {
            attributes: Arc::new(attributes),
        }
    }
}

// Attribute values may be principals; only names are printed.
impl fmt::Debug for CallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CallScope").field("attributes", &names).finish()
    }
}

/// Receives the server-side lifecycle events of a single call
///
/// Errors returned here are the handler's own and propagate to the transport
/// unchanged.
///
/// The [`CallScope`] passed to an event is valid for that call only.
/// Implementations must not keep a clone of it past `on_complete` or
/// `on_cancel`; after either event the principal is no longer bound.
pub trait CallListener<Req>: Send {
    /// A request message arrived
    fn on_message(&mut self, scope: &CallScope, message: Req) -> Result<(), Status>;

    /// The client finished sending
    fn on_half_close(&mut self, scope: &CallScope) -> Result<(), Status>;

    /// The call completed normally
    fn on_complete(&mut self, scope: &CallScope) -> Result<(), Status>;

    /// The call was cancelled
    fn on_cancel(&mut self, scope: &CallScope) -> Result<(), Status>;
}

impl<Req, L> CallListener<Req> for Box<L>
where
    L: CallListener<Req> + ?Sized,
{
    fn on_message(&mut self, scope: &CallScope, message: Req) -> Result<(), Status> {
        (**self).on_message(scope, message)
    }

    fn on_half_close(&mut self, scope: &CallScope) -> Result<(), Status> {
        (**self).on_half_close(scope)
    }

    fn on_complete(&mut self, scope: &CallScope) -> Result<(), Status> {
        (**self).on_complete(scope)
    }

    fn on_cancel(&mut self, scope: &CallScope) -> Result<(), Status> {
        (**self).on_cancel(scope)
    }
}

/// Transport view of an in-flight call
pub trait ServerCall: Send + Sync {
    /// Full method path, e.g. `/pkg.Service/Method`
    fn method(&self) -> &str;

    /// Fired by the transport when the call is cancelled
    fn cancellation(&self) -> &CancellationToken;
}

/// Next link in the handler chain
pub trait CallHandler<Req>: Send + Sync {
    type Listener: CallListener<Req>;

    /// Start the call and return the listener the transport should drive
    fn start_call(&self, call: &dyn ServerCall, metadata: &MetadataMap) -> Self::Listener;
}

/// Minimal [`ServerCall`] for transports that only track the method and a
/// cancellation token
#[derive(Debug, Clone)]
pub struct IncomingCall {
    method: String,
    cancellation: CancellationToken,
}

impl IncomingCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self::with_cancellation(method, CancellationToken::new())
    }

    pub fn with_cancellation(method: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            method: method.into(),
            cancellation,
        }
    }

    /// Signal cancellation to everything observing this call
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl ServerCall for IncomingCall {
    fn method(&self) -> &str {
        &self.method
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
