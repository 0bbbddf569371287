//! Handler registry.
//!
//! Maps message names to handlers and holds the pipeline interceptors: an
//! ordered list of pre-handlers, an optional post-handler, and the default
//! handler used when no name matches.
//!
//! All methods take `&self` so the registry can be shared behind an `Arc`
//! by the invoker while composition code keeps configuring it. Only
//! [`MessageBus`](crate::MessageBus) hands the registry out; the dispatch
//! facades never do.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::handler::{BoxedHandler, BoxedPostHandler, PreHandler};
use crate::message::Message;

type HandlerMap = Arc<RwLock<BTreeMap<String, BoxedHandler>>>;

pub struct HandlerRegistry {
    handlers: HandlerMap,
    pre_handlers: RwLock<Vec<Arc<dyn PreHandler>>>,
    post_handler: RwLock<Option<BoxedPostHandler>>,
    default_handler: RwLock<BoxedHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry whose default handler fails with
    /// `NO_SUCH_HANDLER`.
    pub fn new() -> Self {
        let handlers: HandlerMap = Arc::default();
        let default_handler = no_such_handler(Arc::clone(&handlers));
        Self {
            handlers,
            pre_handlers: RwLock::new(Vec::new()),
            post_handler: RwLock::new(None),
            default_handler: RwLock::new(default_handler),
        }
    }

    /// Registers `handler` for `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, handler: BoxedHandler) -> &Self {
        let name = name.into();
        debug!(message_name = %name, "Registering handler");
        self.handlers.write().insert(name, handler);
        self
    }

    /// Registers every entry in iteration order; later duplicates win.
    pub fn register_many<I, N>(&self, handlers: I) -> &Self
    where
        I: IntoIterator<Item = (N, BoxedHandler)>,
        N: Into<String>,
    {
        for (name, handler) in handlers {
            self.register(name, handler);
        }
        self
    }

    /// Removes the handler for `name`, returning it if one was registered.
    pub fn unregister(&self, name: &str) -> Option<BoxedHandler> {
        self.handlers.write().remove(name)
    }

    pub fn get_handler(&self, name: &str) -> Option<BoxedHandler> {
        self.handlers.read().get(name).cloned()
    }

    /// Returns the handler for `name`, or the default handler.
    pub fn get_handler_or_default(&self, name: &str) -> BoxedHandler {
        self.get_handler(name)
            .unwrap_or_else(|| self.default_handler.read().clone())
    }

    /// Names with a registered handler, in sorted order.
    pub fn registered_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Replaces the handler used for unmatched message names.
    pub fn set_default_handler(&self, handler: BoxedHandler) -> &Self {
        *self.default_handler.write() = handler;
        self
    }

    pub fn default_handler(&self) -> BoxedHandler {
        self.default_handler.read().clone()
    }

    /// Appends a pre-handler. Pre-handlers run in registration order.
    pub fn register_pre_handler<P>(&self, pre_handler: P) -> &Self
    where
        P: PreHandler + 'static,
    {
        debug!(pre_handler = pre_handler.name(), "Registering pre-handler");
        self.pre_handlers.write().push(Arc::new(pre_handler));
        self
    }

    /// A snapshot of the pre-handlers in registration order.
    pub fn pre_handlers(&self) -> Vec<Arc<dyn PreHandler>> {
        self.pre_handlers.read().clone()
    }

    /// Sets the post-handler, replacing any previous one.
    pub fn set_post_handler(&self, post_handler: BoxedPostHandler) -> &Self {
        *self.post_handler.write() = Some(post_handler);
        self
    }

    pub fn clear_post_handler(&self) -> &Self {
        *self.post_handler.write() = None;
        self
    }

    pub fn post_handler(&self) -> Option<BoxedPostHandler> {
        self.post_handler.read().clone()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered_names", &self.registered_names())
            .field("pre_handler_count", &self.pre_handlers.read().len())
            .field("has_post_handler", &self.post_handler.read().is_some())
            .finish()
    }
}

/// The baseline default handler. Lists the names registered at call time.
fn no_such_handler(handlers: HandlerMap) -> BoxedHandler {
    Arc::new(move |message: Arc<Message>, _ctx: Arc<RequestContext>| {
        let err = DispatchError::NoSuchHandler {
            message_name: message.name().to_string(),
            registered_names: handlers.read().keys().cloned().collect(),
        };
        async move { Err::<Value, _>(err) }.boxed()
    })
}
