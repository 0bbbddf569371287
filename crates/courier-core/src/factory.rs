//! Context factories.
//!
//! The invoker needs a factory to create child contexts when a pre-handler
//! replaces a message, and the factory needs the invoker to bind each
//! context's [`NestableApi`](crate::NestableApi). [`MessageBus`](crate::MessageBus)
//! breaks the cycle with a forward reference:
//!
//! 1. create a [`LateBoundContextFactory`] placeholder
//! 2. build the [`MessageInvoker`] around the placeholder
//! 3. build the [`DefaultContextFactory`] from that invoker
//! 4. [`bind`](LateBoundContextFactory::bind) the placeholder to it, once,
//!    before anything is dispatched

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::context::{ContextParts, RequestContext, RequestData};
use crate::error::{DispatchError, DispatchResult};
use crate::id::IdGenerator;
use crate::invoker::MessageInvoker;
use crate::log::LoggerFactory;
use crate::message::Message;

/// Creates request contexts.
pub trait ContextFactory: Send + Sync {
    /// Creates a context for `message`, nested under `parent` when given.
    fn new_context(
        &self,
        message: Arc<Message>,
        parent: Option<&Arc<RequestContext>>,
    ) -> DispatchResult<Arc<RequestContext>>;
}

// =============================================================================
// DefaultContextFactory
// =============================================================================

/// The standard factory.
///
/// - `request_id`: the parent's, or freshly generated at the root
/// - `context_id`: always freshly generated
/// - `nested_depth`: parent + 1, or `0` at the root
/// - `data`: the parent's bag (same handle), or a new empty one
/// - extensions are copied from the parent before the fields above are set
/// - the logger is scoped to `handler:<messageName>.<requestId>`
pub struct DefaultContextFactory {
    invoker: Weak<MessageInvoker>,
    ids: Arc<dyn IdGenerator>,
    loggers: LoggerFactory,
}

impl DefaultContextFactory {
    /// The factory holds the invoker weakly; the invoker owns the factory
    /// through its placeholder.
    pub fn new(
        invoker: &Arc<MessageInvoker>,
        ids: Arc<dyn IdGenerator>,
        loggers: LoggerFactory,
    ) -> Self {
        Self {
            invoker: Arc::downgrade(invoker),
            ids,
            loggers,
        }
    }
}

impl ContextFactory for DefaultContextFactory {
    fn new_context(
        &self,
        message: Arc<Message>,
        parent: Option<&Arc<RequestContext>>,
    ) -> DispatchResult<Arc<RequestContext>> {
        let invoker = self.invoker.upgrade().ok_or(DispatchError::UnboundFactory)?;

        let (request_id, nested_depth, data, extensions) = match parent {
            Some(parent) => (
                parent.request_id().to_string(),
                parent.nested_depth() + 1,
                parent.data().clone(),
                parent.extensions(),
            ),
            None => (
                self.ids.next_id(),
                0,
                RequestData::new(),
                Default::default(),
            ),
        };
        let context_id = self.ids.next_id();
        let log = self
            .loggers
            .get_logger(&format!("handler:{}.{}", message.name(), request_id));

        Ok(RequestContext::from_parts(ContextParts {
            message,
            log,
            data,
            extensions,
            parent: parent.map(Arc::downgrade),
            nested_depth,
            context_id,
            request_id,
            invoker,
        }))
    }
}

impl fmt::Debug for DefaultContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultContextFactory")
            .field("invoker_alive", &(self.invoker.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// LateBoundContextFactory
// =============================================================================

/// A placeholder factory that delegates to a target bound after construction.
#[derive(Default)]
pub struct LateBoundContextFactory {
    target: OnceLock<Arc<dyn ContextFactory>>,
}

impl LateBoundContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the delegate. Returns the rejected factory if already bound.
    pub fn bind(&self, target: Arc<dyn ContextFactory>) -> Result<(), Arc<dyn ContextFactory>> {
        self.target.set(target)
    }

    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }
}

impl ContextFactory for LateBoundContextFactory {
    fn new_context(
        &self,
        message: Arc<Message>,
        parent: Option<&Arc<RequestContext>>,
    ) -> DispatchResult<Arc<RequestContext>> {
        self.target
            .get()
            .ok_or(DispatchError::UnboundFactory)?
            .new_context(message, parent)
    }
}

impl fmt::Debug for LateBoundContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LateBoundContextFactory")
            .field("bound", &self.is_bound())
            .finish()
    }
}
