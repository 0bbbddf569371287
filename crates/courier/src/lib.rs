//! # Courier
//!
//! An in-process CQRS message dispatch toolkit.
//!
//! ## Overview
//!
//! Commands and queries are dispatched by name to async handlers. Handlers
//! can dispatch further messages from inside their execution; those calls
//! run as children of the caller's request context, sharing its request id
//! and request-scoped data.
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────────────────────────────┐
//! │  MessageBus  │────▶│  Invoker   │────▶│ pre-handlers ─▶ handler ─▶ post-hdlr │
//! │ (root ctx)   │     │            │     └──────────────────────────────────────┘
//! └──────────────┘     └────────────┘                    │
//!                            ▲                ctx.api().invoke(..)
//!                            └────────────── (child ctx, depth + 1) ◀┘
//! ```
//!
//! - **Runtime**: loads configuration, installs logging, builds the bus
//! - **Registry**: message name → handler, plus pre-, post- and default handlers
//! - **Context**: ids, nesting depth, scoped logger and shared data of one dispatch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::new();
//!
//!     runtime.registry().register("Ping", handler_fn(|_msg, _ctx| async move {
//!         Ok(json!({ "pong": true }))
//!     }));
//!
//!     let pong = runtime.api().invoke(Message::new("Ping")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: read `courier.toml` (default)
//! - `yaml-config`: read `courier.yaml`
//! - `json-log`: JSON log format

pub use courier_core as core;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierRuntime, RuntimeError, RuntimeResult};

    // Messages and responses
    pub use courier_core::{
        Command, CommandResponse, FindQuery, FindQueryResponse, GetQuery, GetQueryResponse,
        IntoMessage, Message, MessageKind, respond,
    };

    // Dispatch
    pub use courier_core::{
        DelegatingApi, Dispatch, DispatchExt, MessageBus, NestableApi, RequestContext,
    };

    // Handlers
    pub use courier_core::{
        HandlerRegistry, PreHandler, PreHandlerOutcome, handler_fn, post_handler_fn,
        pre_handler_fn,
    };

    // Errors
    pub use courier_core::{DispatchError, DispatchResult, keys};

    pub use courier_core::prelude::async_trait;
    pub use courier_runtime::prelude::*;
}
