//! The dispatch pipeline.
//!
//! For every context the [`MessageInvoker`] runs:
//!
//! 1. the registry's pre-handlers, one at a time, in registration order
//! 2. the handler registered for the current message name (or the default
//!    handler)
//! 3. the post-handler, if one is set
//!
//! A pre-handler's [`PreHandlerOutcome`] decides how the loop continues:
//!
//! | Outcome                          | Effect                                         |
//! |----------------------------------|------------------------------------------------|
//! | `Halt` / `Reply(falsy)`          | pipeline ends, caller gets `None`              |
//! | `Pending(future)`                | pipeline ends with the future's result         |
//! | `Reply(value)`                   | pipeline ends, caller gets `Some(value)`       |
//! | `Forward(m)`, `m` is the current | nothing changes                                |
//! | `Forward(m)`, `m` is another     | child context for `m`, loop continues with it  |
//!
//! A reply is falsy when it is `null`, `false`, `""` or a zero number.
//!
//! Contexts left behind by a replacement stay alive until the pipeline
//! returns, so the replacement's `parent()` chain still reaches them.
//!
//! Failures are logged once, classified as `PRE_HANDLER_FAILURE` or
//! `HANDLER_FAILURE`, and returned to the caller unchanged.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, debug, error, trace, warn};

use crate::context::RequestContext;
use crate::error::{DispatchResult, keys};
use crate::factory::ContextFactory;
use crate::handler::{BoxFuture, PreHandlerOutcome, describe_pre_handler};
use crate::message::Message;
use crate::registry::HandlerRegistry;

/// Tunables for the pipeline. None of them change control flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokerOptions {
    /// Log a warning when a context reaches this nesting depth.
    pub depth_warning: Option<u32>,
    /// Include message bodies and responses in trace-level logs.
    pub log_payloads: bool,
}

/// A pre-handler outcome, classified against the current message.
enum Step {
    Halt,
    Pending(BoxFuture<'static, DispatchResult<Value>>),
    Reply(Value),
    Replace(Arc<Message>),
    Unchanged,
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn classify(outcome: PreHandlerOutcome, current: &Arc<Message>) -> Step {
    match outcome {
        PreHandlerOutcome::Halt => Step::Halt,
        PreHandlerOutcome::Reply(value) if is_falsy(&value) => Step::Halt,
        PreHandlerOutcome::Pending(future) => Step::Pending(future),
        PreHandlerOutcome::Reply(value) => Step::Reply(value),
        PreHandlerOutcome::Forward(message) if Arc::ptr_eq(&message, current) => Step::Unchanged,
        PreHandlerOutcome::Forward(message) => Step::Replace(message),
    }
}

/// Executes the pipeline for a context.
pub struct MessageInvoker {
    registry: Arc<HandlerRegistry>,
    factory: Arc<dyn ContextFactory>,
    options: InvokerOptions,
}

impl MessageInvoker {
    pub fn new(registry: Arc<HandlerRegistry>, factory: Arc<dyn ContextFactory>) -> Self {
        Self::with_options(registry, factory, InvokerOptions::default())
    }

    pub fn with_options(
        registry: Arc<HandlerRegistry>,
        factory: Arc<dyn ContextFactory>,
        options: InvokerOptions,
    ) -> Self {
        Self {
            registry,
            factory,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn context_factory(&self) -> &Arc<dyn ContextFactory> {
        &self.factory
    }

    pub fn options(&self) -> InvokerOptions {
        self.options
    }

    /// Creates a context for `message` under `parent` and runs the pipeline.
    pub async fn invoke(
        &self,
        message: Message,
        parent: Option<Arc<RequestContext>>,
    ) -> DispatchResult<Option<Value>> {
        let ctx = self.factory.new_context(Arc::new(message), parent.as_ref())?;
        self.invoke_handler_for(ctx).await
    }

    /// Runs the pipeline for an existing context.
    ///
    /// Returns `None` when a pre-handler halted the pipeline.
    pub async fn invoke_handler_for(
        &self,
        ctx: Arc<RequestContext>,
    ) -> DispatchResult<Option<Value>> {
        let span = ctx.log().span().clone();
        self.run_pipeline(ctx).instrument(span).await
    }

    async fn run_pipeline(&self, mut ctx: Arc<RequestContext>) -> DispatchResult<Option<Value>> {
        self.check_depth(&ctx);
        let mut message = Arc::clone(ctx.message());
        let mut replaced: Vec<Arc<RequestContext>> = Vec::new();

        if self.options.log_payloads {
            trace!(message_name = message.name(), body = %message.body(), "Dispatching");
        } else {
            trace!(message_name = message.name(), "Dispatching");
        }

        for pre_handler in self.registry.pre_handlers() {
            let outcome = match pre_handler
                .handle(Arc::clone(&message), Arc::clone(&ctx))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        failure = keys::PRE_HANDLER_FAILURE,
                        pre_handler = %describe_pre_handler(pre_handler.as_ref()),
                        message_name = message.name(),
                        context_id = ctx.context_id(),
                        error = %err,
                        "Pre-handler failed"
                    );
                    return Err(err);
                }
            };

            match classify(outcome, &message) {
                Step::Halt => {
                    debug!(
                        pre_handler = pre_handler.name(),
                        message_name = message.name(),
                        "Pre-handler halted the pipeline"
                    );
                    return Ok(None);
                }
                Step::Pending(future) => {
                    debug!(
                        pre_handler = pre_handler.name(),
                        message_name = message.name(),
                        "Pre-handler took over the response"
                    );
                    return future.await.map(Some);
                }
                Step::Reply(value) => {
                    debug!(
                        pre_handler = pre_handler.name(),
                        message_name = message.name(),
                        "Pre-handler replied"
                    );
                    return Ok(Some(value));
                }
                Step::Replace(replacement) => {
                    debug!(
                        pre_handler = pre_handler.name(),
                        from = message.name(),
                        to = replacement.name(),
                        "Pre-handler replaced the message"
                    );
                    let child = self
                        .factory
                        .new_context(Arc::clone(&replacement), Some(&ctx))?;
                    replaced.push(std::mem::replace(&mut ctx, child));
                    self.check_depth(&ctx);
                    message = replacement;
                }
                Step::Unchanged => {}
            }
        }

        let span = ctx.log().span().clone();
        match self.dispatch(&message, &ctx).instrument(span).await {
            Ok(response) => {
                if self.options.log_payloads {
                    trace!(message_name = message.name(), response = %response, "Dispatched");
                }
                Ok(Some(response))
            }
            Err(err) => {
                error!(
                    failure = keys::HANDLER_FAILURE,
                    message_name = message.name(),
                    context_id = ctx.context_id(),
                    request_id = ctx.request_id(),
                    key = err.key(),
                    error = %err,
                    "Handler failed"
                );
                Err(err)
            }
        }
    }

    /// Runs the matched handler, then the post-handler.
    async fn dispatch(
        &self,
        message: &Arc<Message>,
        ctx: &Arc<RequestContext>,
    ) -> DispatchResult<Value> {
        let handler = self.registry.get_handler_or_default(message.name());
        let response = handler(Arc::clone(message), Arc::clone(ctx)).await?;

        match self.registry.post_handler() {
            Some(post_handler) => {
                post_handler(Arc::clone(message), Arc::clone(ctx), response).await
            }
            None => Ok(response),
        }
    }

    fn check_depth(&self, ctx: &RequestContext) {
        if let Some(limit) = self.options.depth_warning
            && ctx.nested_depth() >= limit
        {
            warn!(
                message_name = ctx.message().name(),
                nested_depth = ctx.nested_depth(),
                request_id = ctx.request_id(),
                "Nested dispatch depth reached the warning threshold"
            );
        }
    }
}

impl fmt::Debug for MessageInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageInvoker")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn current() -> Arc<Message> {
        Arc::new(Message::new("A"))
    }

    #[test]
    fn falsy_replies_count_as_halt() {
        let msg = current();
        assert!(matches!(classify(PreHandlerOutcome::Halt, &msg), Step::Halt));
        for value in [Value::Null, json!(false), json!(""), json!(0), json!(0.0)] {
            assert!(
                matches!(classify(PreHandlerOutcome::Reply(value.clone()), &msg), Step::Halt),
                "{value} should halt"
            );
        }
    }

    #[test]
    fn truthy_scalars_are_replies() {
        let msg = current();
        for value in [json!(true), json!("x"), json!(1), json!([]), json!({})] {
            assert!(
                matches!(classify(PreHandlerOutcome::Reply(value.clone()), &msg), Step::Reply(_)),
                "{value} should reply"
            );
        }
    }

    #[test]
    fn same_arc_is_unchanged() {
        let msg = current();
        assert!(matches!(
            classify(PreHandlerOutcome::proceed(&msg), &msg),
            Step::Unchanged
        ));
    }

    #[test]
    fn equal_but_distinct_message_is_a_replacement() {
        let msg = current();
        let twin = PreHandlerOutcome::replace(Message::new("A"));
        assert!(matches!(classify(twin, &msg), Step::Replace(_)));
    }

    #[test]
    fn values_are_replies() {
        let msg = current();
        assert!(matches!(
            classify(PreHandlerOutcome::Reply(json!({"cached": true})), &msg),
            Step::Reply(_)
        ));
        assert!(matches!(
            classify(PreHandlerOutcome::pending(async { Ok(json!(1)) }), &msg),
            Step::Pending(_)
        ));
    }
}
