//! # Courier Core
//!
//! The in-process message dispatch engine behind Courier's CQRS API.
//!
//! ## Pieces
//!
//! - **Messages** ([`message`]): commands, get-queries, find-queries and
//!   their responses, carried through the pipeline as an immutable
//!   [`Message`] envelope
//! - **Registry** ([`HandlerRegistry`]): message name → handler, plus the
//!   ordered pre-handlers, the post-handler and the default handler
//! - **Context** ([`RequestContext`]): identity, nesting depth, a scoped
//!   logger and the request-scoped data bag of one dispatch
//! - **Factory** ([`ContextFactory`]): creates root and child contexts
//! - **Invoker** ([`MessageInvoker`]): runs pre-handlers, handler and
//!   post-handler
//! - **Facades** ([`Dispatch`]): [`MessageBus`] for top-level calls,
//!   [`NestableApi`] for calls from inside handlers, [`DelegatingApi`] for
//!   dispatch-only access
//!
//! ## Flow
//!
//! ```text
//! caller ──▶ MessageBus ──▶ ContextFactory (root) ──▶ MessageInvoker
//!                                                        │
//!                 pre-handlers ─▶ handler ─▶ post-handler
//!                                    │
//!                  ctx.api().invoke(..) ──▶ ContextFactory (child) ──▶ MessageInvoker ...
//! ```
//!
//! Dispatch is cooperative and sequential within one call tree; there is no
//! persistence, retry or timeout. Callers that need a timeout wrap the
//! top-level call.

pub mod api;
pub mod bus;
pub mod context;
pub mod error;
pub mod factory;
pub mod handler;
pub mod id;
pub mod invoker;
pub mod log;
pub mod message;
pub mod registry;

pub use api::{DelegatingApi, Dispatch, DispatchExt, NestableApi};
pub use bus::{MessageBus, MessageBusBuilder};
pub use context::{ContextParts, Extensions, RequestContext, RequestData};
pub use error::{DispatchError, DispatchResult, keys};
pub use factory::{ContextFactory, DefaultContextFactory, LateBoundContextFactory};
pub use handler::{
    BoxFuture, BoxedHandler, BoxedPostHandler, FnPreHandler, PreHandler, PreHandlerOutcome,
    describe_pre_handler, handler_fn, post_handler_fn, pre_handler_fn,
};
pub use id::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use invoker::{InvokerOptions, MessageInvoker};
pub use log::{LoggerFactory, ScopedLogger};
pub use message::{
    Command, CommandResponse, FindQuery, FindQueryResponse, GetQuery, GetQueryResponse,
    IntoMessage, Message, MessageHeader, MessageKind, respond,
};
pub use registry::HandlerRegistry;

/// Prelude for handler authors.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use super::{
        Command, CommandResponse, Dispatch, DispatchError, DispatchExt, DispatchResult, FindQuery,
        FindQueryResponse, GetQuery, GetQueryResponse, Message, MessageBus, PreHandlerOutcome,
        RequestContext, handler_fn, post_handler_fn, pre_handler_fn, respond,
    };
}
