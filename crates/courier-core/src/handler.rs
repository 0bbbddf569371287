//! Handler, pre-handler and post-handler types.
//!
//! Handlers are stored type-erased, the same way for every message name:
//!
//! ```rust,ignore
//! registry.register("Ping", handler_fn(|_msg, _ctx| async move {
//!     Ok(json!({ "pong": true }))
//! }));
//! ```
//!
//! Pre-handlers run before the matched handler and decide, through a
//! [`PreHandlerOutcome`], whether the pipeline continues.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
pub use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::DispatchResult;
use crate::message::Message;

// ============================================================================
// Handlers
// ============================================================================

/// A type-erased handler for one message name.
pub type BoxedHandler = Arc<
    dyn Fn(Arc<Message>, Arc<RequestContext>) -> BoxFuture<'static, DispatchResult<Value>>
        + Send
        + Sync,
>;

/// Converts an async closure into a [`BoxedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Arc<Message>, Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
{
    Arc::new(move |message: Arc<Message>, ctx: Arc<RequestContext>| {
        f(message, ctx).boxed()
    })
}

// ============================================================================
// Post-handler
// ============================================================================

/// Transforms the matched handler's response before it is returned.
pub type BoxedPostHandler = Arc<
    dyn Fn(Arc<Message>, Arc<RequestContext>, Value) -> BoxFuture<'static, DispatchResult<Value>>
        + Send
        + Sync,
>;

/// Converts an async closure into a [`BoxedPostHandler`].
pub fn post_handler_fn<F, Fut>(f: F) -> BoxedPostHandler
where
    F: Fn(Arc<Message>, Arc<RequestContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
{
    Arc::new(
        move |message: Arc<Message>, ctx: Arc<RequestContext>, response: Value| {
            f(message, ctx, response).boxed()
        },
    )
}

// ============================================================================
// Pre-handlers
// ============================================================================

/// What a pre-handler decided.
pub enum PreHandlerOutcome {
    /// The request was fully handled out-of-band; the pipeline ends with no value.
    Halt,
    /// The pipeline ends with the result of this future, bypassing the
    /// handler and the post-handler.
    Pending(BoxFuture<'static, DispatchResult<Value>>),
    /// The pipeline ends with this value as the final response.
    Reply(Value),
    /// Continue with this message. Returning the current message (the same
    /// `Arc`) is a no-op; any other message replaces it.
    Forward(Arc<Message>),
}

impl PreHandlerOutcome {
    /// Continues with the message unchanged.
    pub fn proceed(message: &Arc<Message>) -> Self {
        Self::Forward(Arc::clone(message))
    }

    /// Continues with a replacement message.
    pub fn replace(message: Message) -> Self {
        Self::Forward(Arc::new(message))
    }

    /// Ends the pipeline with the result of `future`.
    pub fn pending<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
    {
        Self::Pending(future.boxed())
    }
}

impl fmt::Debug for PreHandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt => f.write_str("Halt"),
            Self::Pending(_) => f.write_str("Pending(..)"),
            Self::Reply(value) => f.debug_tuple("Reply").field(value).finish(),
            Self::Forward(message) => f.debug_tuple("Forward").field(&message.name()).finish(),
        }
    }
}

/// An interceptor that runs before the matched handler.
#[async_trait]
pub trait PreHandler: Send + Sync {
    /// Identity used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Optional human-readable description, used only in error logs.
    fn description(&self) -> Option<&str> {
        None
    }

    async fn handle(
        &self,
        message: Arc<Message>,
        ctx: Arc<RequestContext>,
    ) -> DispatchResult<PreHandlerOutcome>;
}

type PreHandlerCall = dyn Fn(
        Arc<Message>,
        Arc<RequestContext>,
    ) -> BoxFuture<'static, DispatchResult<PreHandlerOutcome>>
    + Send
    + Sync;

/// A [`PreHandler`] backed by a closure.
pub struct FnPreHandler {
    name: String,
    description: Option<String>,
    call: Box<PreHandlerCall>,
}

impl FnPreHandler {
    /// Attaches a description shown when this pre-handler fails.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for FnPreHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPreHandler")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PreHandler for FnPreHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn handle(
        &self,
        message: Arc<Message>,
        ctx: Arc<RequestContext>,
    ) -> DispatchResult<PreHandlerOutcome> {
        (self.call)(message, ctx).await
    }
}

/// Converts a named async closure into a pre-handler.
pub fn pre_handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnPreHandler
where
    F: Fn(Arc<Message>, Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<PreHandlerOutcome>> + Send + 'static,
{
    FnPreHandler {
        name: name.into(),
        description: None,
        call: Box::new(move |message: Arc<Message>, ctx: Arc<RequestContext>| {
            f(message, ctx).boxed()
        }),
    }
}

/// Best-effort description of a pre-handler for diagnostics.
pub fn describe_pre_handler(pre_handler: &dyn PreHandler) -> String {
    match pre_handler.description() {
        Some(doc) if !doc.trim().is_empty() => format!("{} ({})", pre_handler.name(), doc.trim()),
        _ => pre_handler.name().to_string(),
    }
}
