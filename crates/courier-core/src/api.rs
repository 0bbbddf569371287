//! Dispatch facades.
//!
//! [`Dispatch`] is the consumer-side surface: one generic `invoke`, plus the
//! typed `get`, `find` and `command` from [`DispatchExt`]. Three types
//! implement it:
//!
//! - [`MessageBus`](crate::MessageBus): top-level calls, each starting a new
//!   call tree
//! - [`NestableApi`]: calls made from inside a handler, recorded as children
//!   of the handler's context
//! - [`DelegatingApi`]: a pass-through that hides everything but dispatch
//!
//! None of them expose registry administration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::DispatchResult;
use crate::invoker::MessageInvoker;
use crate::message::{
    Command, CommandResponse, FindQuery, FindQueryResponse, GetQuery, GetQueryResponse,
    IntoMessage, Message,
};

/// Dispatches messages through the pipeline.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Dispatches `message` and returns the raw response.
    ///
    /// `None` means a pre-handler halted the pipeline.
    async fn invoke(&self, message: Message) -> DispatchResult<Option<Value>>;
}

/// Typed dispatch helpers, available on every [`Dispatch`].
#[async_trait]
pub trait DispatchExt: Dispatch {
    /// Converts and dispatches any [`IntoMessage`].
    async fn send<M>(&self, message: M) -> DispatchResult<Option<Value>>
    where
        M: IntoMessage + Send,
    {
        self.invoke(message.into_message()?).await
    }

    async fn get<C, R>(&self, query: GetQuery<C, R>) -> DispatchResult<Option<GetQueryResponse<R>>>
    where
        C: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        decode(self.send(query).await?)
    }

    async fn find<C, R>(
        &self,
        query: FindQuery<C, R>,
    ) -> DispatchResult<Option<FindQueryResponse<R>>>
    where
        C: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        decode(self.send(query).await?)
    }

    /// Dispatches a command. A `null` response reads as an empty
    /// [`CommandResponse`].
    async fn command<P>(&self, command: Command<P>) -> DispatchResult<Option<CommandResponse>>
    where
        P: Serialize + Send,
    {
        match self.send(command).await? {
            Some(Value::Null) => Ok(Some(CommandResponse::default())),
            other => decode(other),
        }
    }
}

impl<T: Dispatch + ?Sized> DispatchExt for T {}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> DispatchResult<Option<T>> {
    Ok(value.map(serde_json::from_value).transpose()?)
}

// ============================================================================
// NestableApi
// ============================================================================

/// The facade handed to handler code through [`RequestContext::api`].
///
/// Every call creates a child of the bound context: depth + 1, same request
/// id, same data bag.
#[derive(Clone)]
pub struct NestableApi {
    context: Arc<RequestContext>,
    invoker: Arc<MessageInvoker>,
}

impl NestableApi {
    pub(crate) fn new(context: Arc<RequestContext>, invoker: Arc<MessageInvoker>) -> Self {
        Self { context, invoker }
    }

    /// The context new calls are nested under.
    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }
}

#[async_trait]
impl Dispatch for NestableApi {
    async fn invoke(&self, message: Message) -> DispatchResult<Option<Value>> {
        let ctx = self
            .invoker
            .context_factory()
            .new_context(Arc::new(message), Some(&self.context))?;
        self.invoker.invoke_handler_for(ctx).await
    }
}

impl fmt::Debug for NestableApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestableApi")
            .field("context_id", &self.context.context_id())
            .field("nested_depth", &self.context.nested_depth())
            .finish()
    }
}

// ============================================================================
// DelegatingApi
// ============================================================================

/// A dispatch-only capability over another dispatcher.
#[derive(Clone)]
pub struct DelegatingApi {
    inner: Arc<dyn Dispatch>,
}

impl DelegatingApi {
    pub fn new(inner: Arc<dyn Dispatch>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Dispatch for DelegatingApi {
    async fn invoke(&self, message: Message) -> DispatchResult<Option<Value>> {
        self.inner.invoke(message).await
    }
}

impl fmt::Debug for DelegatingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingApi").finish_non_exhaustive()
    }
}
