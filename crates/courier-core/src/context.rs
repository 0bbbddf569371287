//! Per-dispatch request context.
//!
//! A [`RequestContext`] is created by a [`ContextFactory`](crate::ContextFactory)
//! for every dispatch, root or nested, and lives as long as that dispatch's
//! pipeline. It carries:
//!
//! - identity: a fresh `context_id`, and a `request_id` shared by the whole
//!   call tree
//! - `nested_depth`, `0` at the root and parent + 1 below it
//! - a logger scoped to `handler:<messageName>.<requestId>`
//! - the [`RequestData`] bag, shared by reference across the call tree
//! - typed extensions, copied into every child context
//! - the [`NestableApi`] through [`api`](RequestContext::api), for issuing
//!   nested dispatches
//!
//! ```rust,ignore
//! handler_fn(|_msg, ctx| async move {
//!     ctx.data().insert("seen", json!(true));
//!     let inner = ctx.api().invoke(Message::new("Inner")).await?;
//!     Ok(inner.unwrap_or_default())
//! })
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::api::NestableApi;
use crate::invoker::MessageInvoker;
use crate::log::ScopedLogger;
use crate::message::Message;

/// Typed values attached to a context and copied into its children.
pub type Extensions = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

// =============================================================================
// RequestData
// =============================================================================

/// The request-scoped data bag.
///
/// Cloning a `RequestData` clones the handle, not the map: every context in a
/// call tree sees the same entries. The lock only keeps access memory-safe; it
/// does not order writes between interleaved requests. One logical call tree
/// is expected to write at a time.
#[derive(Clone, Default)]
pub struct RequestData {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl RequestData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.lock().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Runs `f` with exclusive access to the map.
    ///
    /// Do not dispatch from inside `f`.
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// A copy of the current entries.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().clone()
    }

    /// Returns `true` if both handles point at the same bag.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RequestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.lock().iter()).finish()
    }
}

// =============================================================================
// RequestContext
// =============================================================================

/// Everything needed to build a [`RequestContext`].
///
/// Context factories compute these fields; see
/// [`DefaultContextFactory`](crate::DefaultContextFactory) for the rules.
pub struct ContextParts {
    pub message: Arc<Message>,
    pub log: ScopedLogger,
    pub data: RequestData,
    pub extensions: Extensions,
    pub parent: Option<Weak<RequestContext>>,
    pub nested_depth: u32,
    pub context_id: String,
    pub request_id: String,
    pub invoker: Arc<MessageInvoker>,
}

/// The context handed to pre-handlers, handlers and the post-handler.
pub struct RequestContext {
    message: Arc<Message>,
    log: ScopedLogger,
    data: RequestData,
    extensions: RwLock<Extensions>,
    parent: Option<Weak<RequestContext>>,
    nested_depth: u32,
    context_id: String,
    request_id: String,
    invoker: Arc<MessageInvoker>,
}

impl RequestContext {
    pub fn from_parts(parts: ContextParts) -> Arc<Self> {
        Arc::new(Self {
            message: parts.message,
            log: parts.log,
            data: parts.data,
            extensions: RwLock::new(parts.extensions),
            parent: parts.parent,
            nested_depth: parts.nested_depth,
            context_id: parts.context_id,
            request_id: parts.request_id,
            invoker: parts.invoker,
        })
    }

    /// The message this context was created for.
    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    pub fn log(&self) -> &ScopedLogger {
        &self.log
    }

    pub fn data(&self) -> &RequestData {
        &self.data
    }

    /// The parent context, if this is a nested dispatch still in flight.
    pub fn parent(&self) -> Option<Arc<RequestContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The message that started this call tree.
    pub fn root_message(&self) -> Arc<Message> {
        let mut message = Arc::clone(&self.message);
        let mut current = self.parent();
        while let Some(ctx) = current {
            message = Arc::clone(ctx.message());
            current = ctx.parent();
        }
        message
    }

    pub fn nested_depth(&self) -> u32 {
        self.nested_depth
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The message's correlation id, falling back to the request id.
    pub fn correlation_id(&self) -> &str {
        self.message
            .correlation_id()
            .unwrap_or(self.request_id.as_str())
    }

    /// Returns the dispatch facade bound to this context.
    ///
    /// Calls made through it run as children of this context.
    pub fn api(self: &Arc<Self>) -> NestableApi {
        NestableApi::new(Arc::clone(self), Arc::clone(&self.invoker))
    }

    /// Attaches a typed value. Only one value per type is kept.
    pub fn set_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .write()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// A shallow copy of the extensions, as inherited by child contexts.
    pub fn extensions(&self) -> Extensions {
        self.extensions.read().clone()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("message_name", &self.message.name())
            .field("context_id", &self.context_id)
            .field("request_id", &self.request_id)
            .field("nested_depth", &self.nested_depth)
            .field("logger", &self.log.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cloned_data_handles_share_entries() {
        let data = RequestData::new();
        let other = data.clone();

        other.insert("user", json!("ada"));

        assert_eq!(data.get("user"), Some(json!("ada")));
        assert!(data.ptr_eq(&other));
        assert!(!data.ptr_eq(&RequestData::new()));
    }

    #[test]
    fn update_has_exclusive_access() {
        let data = RequestData::new();
        data.insert("count", json!(1));

        let next = data.update(|map| {
            let n = map.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
            map.insert("count".into(), json!(n));
            n
        });

        assert_eq!(next, 2);
        assert_eq!(data.snapshot()["count"], 2);
        assert_eq!(data.remove("count"), Some(json!(2)));
        assert!(data.is_empty());
    }
}
