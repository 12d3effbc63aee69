//! Principal-propagating listener
//!
//! Decorates the listener returned by the next handler. It binds the resolved
//! principal into a [`CallScope`] once, at construction, and hands that scope
//! to every lifecycle event it forwards. Events themselves pass through
//! untouched.

use crate::call::{CallListener, CallScope};
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

/// Lifecycle of a [`PrincipalListener`]
///
/// Construction binds the principal immediately, so a new listener starts
/// out `Scoped`. It moves to `Terminated` on the first completion or
/// cancellation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Attribute bound, events are forwarded
    Scoped,
    /// Completed or cancelled, attribute unbound, events are dropped
    Terminated,
}

/// Pass-through listener exposing a principal to the downstream handler
pub struct PrincipalListener<L> {
    inner: L,
    attribute: String,
    scope: CallScope,
    state: ListenerState,
}

impl<L> PrincipalListener<L> {
    /// Wrap `inner`, binding `principal` (if any) under `attribute`
    pub fn new<P>(inner: L, attribute: impl Into<String>, principal: Option<Arc<P>>) -> Self
    where
        P: Send + Sync + 'static,
    {
        let attribute = attribute.into();
        let scope = match principal {
            Some(principal) => CallScope::empty().with_attribute(attribute.clone(), principal),
            None => CallScope::empty(),
        };

        Self {
            inner,
            attribute,
            scope,
            state: ListenerState::Scoped,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute
    }

    /// Whether a principal is currently bound
    pub fn is_authenticated(&self) -> bool {
        self.scope.contains(&self.attribute)
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }

    /// Scope to hand downstream: the caller's scope with our binding on top
    fn scope_for(&self, incoming: &CallScope) -> CallScope {
        incoming.merged(&self.scope)
    }

    fn terminate<F>(&mut self, incoming: &CallScope, event: &'static str, deliver: F) -> Result<(), Status>
    where
        F: FnOnce(&mut L, &CallScope) -> Result<(), Status>,
    {
        if self.state == ListenerState::Terminated {
            debug!(event, "Dropping lifecycle event after call termination");
            return Ok(());
        }

        let scope = self.scope_for(incoming);
        let result = deliver(&mut self.inner, &scope);

        self.scope = CallScope::empty();
        self.state = ListenerState::Terminated;

        result
    }
}

impl<Req, L> CallListener<Req> for PrincipalListener<L>
where
    L: CallListener<Req>,
{
    fn on_message(&mut self, scope: &CallScope, message: Req) -> Result<(), Status> {
        if self.state == ListenerState::Terminated {
            debug!(event = "message", "Dropping lifecycle event after call termination");
            return Ok(());
        }
        let scope = self.scope_for(scope);
        self.inner.on_message(&scope, message)
    }

    fn on_half_close(&mut self, scope: &CallScope) -> Result<(), Status> {
        if self.state == ListenerState::Terminated {
            debug!(event = "half_close", "Dropping lifecycle event after call termination");
            return Ok(());
        }
        let scope = self.scope_for(scope);
        self.inner.on_half_close(&scope)
    }

    fn on_complete(&mut self, scope: &CallScope) -> Result<(), Status> {
        self.terminate(scope, "complete", |inner, scope| inner.on_complete(scope))
    }

    fn on_cancel(&mut self, scope: &CallScope) -> Result<(), Status> {
        self.terminate(scope, "cancel", |inner, scope| inner.on_cancel(scope))
    }
}
