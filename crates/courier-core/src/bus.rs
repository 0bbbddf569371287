//! Composition root.
//!
//! [`MessageBus::builder`] wires the registry, the invoker and the context
//! factory together, resolving their circular dependency before the bus is
//! handed out.
//!
//! ```rust,ignore
//! let bus = MessageBus::builder()
//!     .id_generator(SequentialIdGenerator::new("req"))
//!     .depth_warning(16)
//!     .build();
//!
//! bus.registry().register("Ping", handler_fn(|_msg, _ctx| async move {
//!     Ok(json!({ "pong": true }))
//! }));
//!
//! let pong = bus.invoke(Message::new("Ping")).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::api::{DelegatingApi, Dispatch};
use crate::error::DispatchResult;
use crate::factory::{ContextFactory, DefaultContextFactory, LateBoundContextFactory};
use crate::id::{IdGenerator, UuidIdGenerator};
use crate::invoker::{InvokerOptions, MessageInvoker};
use crate::log::LoggerFactory;
use crate::message::Message;
use crate::registry::HandlerRegistry;

/// The top-level dispatcher and the owner of the registry.
///
/// Cloning is cheap; clones share the registry and the pipeline.
#[derive(Clone)]
pub struct MessageBus {
    registry: Arc<HandlerRegistry>,
    invoker: Arc<MessageInvoker>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Creates a bus with an empty registry and default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MessageBusBuilder {
        MessageBusBuilder::new()
    }

    /// The registry, for composition-time configuration.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn invoker(&self) -> &Arc<MessageInvoker> {
        &self.invoker
    }

    pub fn context_factory(&self) -> &Arc<dyn ContextFactory> {
        self.invoker.context_factory()
    }

    /// A dispatch-only handle for code that must not reconfigure the bus.
    pub fn delegate(&self) -> DelegatingApi {
        DelegatingApi::new(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Dispatch for MessageBus {
    async fn invoke(&self, message: Message) -> DispatchResult<Option<Value>> {
        self.invoker.invoke(message, None).await
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MessageBus`].
pub struct MessageBusBuilder {
    registry: Option<Arc<HandlerRegistry>>,
    ids: Arc<dyn IdGenerator>,
    loggers: LoggerFactory,
    options: InvokerOptions,
}

impl Default for MessageBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBusBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            ids: Arc::new(UuidIdGenerator),
            loggers: LoggerFactory::new(),
            options: InvokerOptions::default(),
        }
    }

    /// Uses an existing registry instead of a new one.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn logger_factory(mut self, loggers: LoggerFactory) -> Self {
        self.loggers = loggers;
        self
    }

    /// Warns when a context reaches `depth`.
    pub fn depth_warning(mut self, depth: u32) -> Self {
        self.options.depth_warning = Some(depth);
        self
    }

    pub fn log_payloads(mut self, enabled: bool) -> Self {
        self.options.log_payloads = enabled;
        self
    }

    pub fn options(mut self, options: InvokerOptions) -> Self {
        self.options = options;
        self
    }

    /// Wires the pipeline.
    ///
    /// The invoker is built around a placeholder factory, the real factory
    /// is built from the invoker, and the placeholder is bound to it. All of
    /// it happens here, before the bus can dispatch anything.
    pub fn build(self) -> MessageBus {
        let registry = self.registry.unwrap_or_default();
        let placeholder = Arc::new(LateBoundContextFactory::new());
        let invoker = Arc::new(MessageInvoker::with_options(
            Arc::clone(&registry),
            placeholder.clone(),
            self.options,
        ));

        let factory = DefaultContextFactory::new(&invoker, self.ids, self.loggers);
        // A fresh placeholder accepts its first binding.
        let bound = placeholder.bind(Arc::new(factory));
        debug_assert!(bound.is_ok(), "context factory bound twice");

        debug!(options = ?self.options, "Message bus ready");
        MessageBus { registry, invoker }
    }
}
