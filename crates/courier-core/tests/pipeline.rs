//! End-to-end behaviour of the dispatch pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier_core::prelude::*;
use courier_core::{BoxedHandler, SequentialIdGenerator, keys};
use serde_json::{Value, json};

fn bus() -> MessageBus {
    MessageBus::builder()
        .id_generator(SequentialIdGenerator::new("t"))
        .build()
}

fn constant(value: Value) -> BoxedHandler {
    handler_fn(move |_msg, _ctx| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// A handler that counts its calls and answers `value`.
fn counting(value: Value) -> (BoxedHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler = handler_fn(move |_msg, _ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { Ok(value) }
    });
    (handler, calls)
}

#[tokio::test]
async fn ping_returns_pong() {
    let bus = bus();
    bus.registry().register("Ping", constant(json!({"pong": true})));

    let out = bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(out, Some(json!({"pong": true})));
}

#[tokio::test]
async fn unknown_message_is_rejected_with_registered_names() {
    let bus = bus();
    bus.registry()
        .register("Ping", constant(Value::Null))
        .register("CreateUser", constant(Value::Null));

    let err = bus.invoke(Message::new("Unknown")).await.unwrap_err();

    assert_eq!(err.key(), keys::NO_SUCH_HANDLER);
    assert_eq!(err.data()["messageName"], "Unknown");
    assert_eq!(err.data()["registeredNames"], json!(["CreateUser", "Ping"]));
}

#[tokio::test]
async fn custom_default_handler_catches_unmatched_names() {
    let bus = bus();
    bus.registry().set_default_handler(handler_fn(|msg, _ctx| async move {
        Ok(json!({ "unhandled": msg.name() }))
    }));

    let out = bus.invoke(Message::new("Nope")).await.unwrap();

    assert_eq!(out, Some(json!({"unhandled": "Nope"})));
}

#[tokio::test]
async fn pre_handlers_run_in_registration_order() {
    let bus = bus();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        bus.registry()
            .register_pre_handler(pre_handler_fn(name, move |msg, _ctx| {
                order.lock().unwrap().push(name);
                async move { Ok(PreHandlerOutcome::proceed(&msg)) }
            }));
    }
    bus.registry().register("Ping", constant(json!(1)));

    bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn halting_pre_handler_skips_the_handler() {
    let bus = bus();
    let (handler, calls) = counting(json!("handled"));
    let later = Arc::new(AtomicUsize::new(0));
    let later_calls = Arc::clone(&later);

    bus.registry()
        .register("Ping", handler)
        .register_pre_handler(pre_handler_fn("gate", |_msg, _ctx| async {
            Ok(PreHandlerOutcome::Halt)
        }))
        .register_pre_handler(pre_handler_fn("never", move |msg, _ctx| {
            later_calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(PreHandlerOutcome::proceed(&msg)) }
        }));

    let out = bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(out, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pending_pre_handler_bypasses_handler_and_post_handler() {
    let bus = bus();
    let (handler, calls) = counting(json!("handled"));
    let post_calls = Arc::new(AtomicUsize::new(0));
    let post_counter = Arc::clone(&post_calls);

    bus.registry()
        .register("Ping", handler)
        .set_post_handler(post_handler_fn(move |_msg, _ctx, response| {
            post_counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(response) }
        }))
        .register_pre_handler(pre_handler_fn("cache", |_msg, _ctx| async {
            Ok(PreHandlerOutcome::pending(async {
                tokio::task::yield_now().await;
                Ok(json!("from cache"))
            }))
        }));

    let out = bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(out, Some(json!("from cache")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(post_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reply_pre_handler_returns_its_value() {
    let bus = bus();
    let (handler, calls) = counting(json!("handled"));
    bus.registry()
        .register("Ping", handler)
        .register_pre_handler(pre_handler_fn("short", |_msg, _ctx| async {
            Ok(PreHandlerOutcome::Reply(json!({"short": "circuit"})))
        }));

    let out = bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(out, Some(json!({"short": "circuit"})));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn falsy_replies_halt_the_pipeline() {
    for reply in [json!(false), json!(""), json!(0)] {
        let bus = bus();
        let (handler, calls) = counting(json!("handled"));
        let post_calls = Arc::new(AtomicUsize::new(0));
        let post_counter = Arc::clone(&post_calls);
        let reply_value = reply.clone();
        bus.registry()
            .register("Ping", handler)
            .set_post_handler(post_handler_fn(move |_msg, _ctx, response| {
                post_counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(response) }
            }))
            .register_pre_handler(pre_handler_fn("falsy", move |_msg, _ctx| {
                let reply = reply_value.clone();
                async move { Ok(PreHandlerOutcome::Reply(reply)) }
            }));

        let out = bus.invoke(Message::new("Ping")).await.unwrap();

        assert_eq!(out, None, "{reply} should halt");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(post_calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn replacement_message_reaches_its_own_handler() {
    let bus = bus();
    let (a_handler, a_calls) = counting(json!("A"));
    bus.registry()
        .register("A", a_handler)
        .register(
            "B",
            handler_fn(|msg, ctx| async move {
                Ok(json!({
                    "handledBy": "B",
                    "body": msg.body().clone(),
                    "depth": ctx.nested_depth(),
                    "ctxMessage": ctx.message().name(),
                    "parentAlive": ctx.parent().is_some(),
                    "parentMessage": ctx.parent().map(|p| p.message().name().to_string()),
                    "root": ctx.root_message().name(),
                }))
            }),
        )
        .register_pre_handler(pre_handler_fn("rewrite", |msg, _ctx| async move {
            if msg.name() == "A" {
                Ok(PreHandlerOutcome::replace(
                    Message::new("B").with_body(json!({"was": "A"})),
                ))
            } else {
                Ok(PreHandlerOutcome::proceed(&msg))
            }
        }));

    let out = bus.invoke(Message::new("A")).await.unwrap().unwrap();

    assert_eq!(out["handledBy"], "B");
    assert_eq!(out["body"], json!({"was": "A"}));
    assert_eq!(out["depth"], 1);
    assert_eq!(out["ctxMessage"], "B");
    assert_eq!(out["parentAlive"], true);
    assert_eq!(out["parentMessage"], "A");
    assert_eq!(out["root"], "A");
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn later_pre_handlers_see_the_replacement() {
    let bus = bus();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_second = Arc::clone(&seen);

    bus.registry()
        .register("B", constant(json!("b")))
        .register_pre_handler(pre_handler_fn("rewrite", |_msg, _ctx| async {
            Ok(PreHandlerOutcome::replace(Message::new("B")))
        }))
        .register_pre_handler(pre_handler_fn("observe", move |msg, ctx| {
            seen_by_second
                .lock()
                .unwrap()
                .push((msg.name().to_string(), ctx.nested_depth()));
            async move { Ok(PreHandlerOutcome::proceed(&msg)) }
        }));

    bus.invoke(Message::new("A")).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("B".to_string(), 1)]);
}

#[tokio::test]
async fn pre_handler_failure_is_returned_unchanged() {
    let bus = bus();
    let (handler, calls) = counting(json!("handled"));
    bus.registry()
        .register("Ping", handler)
        .register_pre_handler(
            pre_handler_fn("auth", |_msg, _ctx| async {
                Err(DispatchError::failed("UNAUTHORIZED", "no token")
                    .with_data(json!({"realm": "api"})))
            })
            .describe("rejects callers without a token"),
        );

    let err = bus.invoke(Message::new("Ping")).await.unwrap_err();

    assert_eq!(err.key(), "UNAUTHORIZED");
    assert_eq!(err.data()["realm"], "api");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn post_handler_replaces_the_response() {
    let bus = bus();
    bus.registry()
        .register("Ping", constant(json!({"pong": true})))
        .set_post_handler(post_handler_fn(|msg, _ctx, response| async move {
            tokio::task::yield_now().await;
            Ok(json!({ "wrapped": response, "for": msg.name() }))
        }));

    let out = bus.invoke(Message::new("Ping")).await.unwrap();

    assert_eq!(out, Some(json!({"wrapped": {"pong": true}, "for": "Ping"})));
}

#[tokio::test]
async fn handler_and_post_handler_failures_reject() {
    let bus = bus();
    bus.registry()
        .register(
            "Boom",
            handler_fn(|_msg, _ctx| async { Err(DispatchError::failed("BOOM", "exploded")) }),
        )
        .register("Ok", constant(json!(1)))
        .set_post_handler(post_handler_fn(|msg, _ctx, response| async move {
            if msg.name() == "Ok" {
                Err(DispatchError::failed("POST", "post-handler refused"))
            } else {
                Ok(response)
            }
        }));

    assert_eq!(bus.invoke(Message::new("Boom")).await.unwrap_err().key(), "BOOM");
    assert_eq!(bus.invoke(Message::new("Ok")).await.unwrap_err().key(), "POST");
}

#[tokio::test]
async fn nested_dispatch_is_a_child_of_the_caller() {
    let bus = bus();
    let inner_ctx = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&inner_ctx);

    bus.registry()
        .register(
            "Inner",
            handler_fn(move |_msg, ctx| {
                *capture.lock().unwrap() = Some((
                    ctx.nested_depth(),
                    ctx.request_id().to_string(),
                    ctx.context_id().to_string(),
                    ctx.parent().map(|p| p.context_id().to_string()),
                ));
                async { Ok(json!("inner")) }
            }),
        )
        .register(
            "Outer",
            handler_fn(|_msg, ctx| async move {
                let inner = ctx.api().invoke(Message::new("Inner")).await?;
                Ok(json!({
                    "inner": inner,
                    "requestId": ctx.request_id(),
                    "contextId": ctx.context_id(),
                    "depth": ctx.nested_depth(),
                }))
            }),
        );

    let out = bus.invoke(Message::new("Outer")).await.unwrap().unwrap();
    let (depth, request_id, context_id, parent_id) = inner_ctx.lock().unwrap().clone().unwrap();

    assert_eq!(out["inner"], "inner");
    assert_eq!(out["depth"], 0);
    assert_eq!(depth, 1);
    assert_eq!(request_id, out["requestId"]);
    assert_ne!(context_id, out["contextId"]);
    assert_eq!(parent_id.as_deref(), out["contextId"].as_str());
}

#[tokio::test]
async fn deep_chains_keep_request_id_and_unique_context_ids() {
    const DEPTH: u64 = 6;
    let bus = bus();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    bus.registry().register(
        "Recurse",
        handler_fn(move |msg, ctx| {
            record.lock().unwrap().push((
                ctx.nested_depth(),
                ctx.request_id().to_string(),
                ctx.context_id().to_string(),
            ));
            async move {
                let remaining = msg.body()["remaining"].as_u64().unwrap_or(0);
                if remaining > 0 {
                    let next =
                        Message::new("Recurse").with_body(json!({ "remaining": remaining - 1 }));
                    ctx.api().invoke(next).await?;
                }
                Ok(Value::Null)
            }
        }),
    );

    bus.invoke(Message::new("Recurse").with_body(json!({ "remaining": DEPTH })))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len() as u64, DEPTH + 1);
    let root_request = &seen[0].1;
    for (n, (depth, request_id, _)) in seen.iter().enumerate() {
        assert_eq!(*depth as usize, n);
        assert_eq!(request_id, root_request);
    }
    let ids: HashSet<&String> = seen.iter().map(|(_, _, id)| id).collect();
    assert_eq!(ids.len(), seen.len());
}

#[tokio::test]
async fn nested_failures_propagate_to_the_top() {
    let bus = bus();
    bus.registry()
        .register(
            "Inner",
            handler_fn(|_msg, _ctx| async { Err(DispatchError::failed("INNER", "inner failed")) }),
        )
        .register(
            "Outer",
            handler_fn(|_msg, ctx| async move {
                ctx.api().invoke(Message::new("Inner")).await?;
                Ok(json!("unreachable"))
            }),
        );

    let err = bus.invoke(Message::new("Outer")).await.unwrap_err();

    assert_eq!(err.key(), "INNER");
}

#[tokio::test]
async fn data_bag_is_shared_down_the_tree_only() {
    let bus = bus();
    bus.registry()
        .register(
            "Inner",
            handler_fn(|_msg, ctx| async move {
                let from_parent = ctx.data().get("outer").unwrap_or(Value::Null);
                ctx.data().insert("inner", json!(true));
                Ok(from_parent)
            }),
        )
        .register(
            "Outer",
            handler_fn(|_msg, ctx| async move {
                ctx.data().insert("outer", json!("hello"));
                let echoed = ctx.api().invoke(Message::new("Inner")).await?;
                Ok(json!({
                    "echoed": echoed,
                    "innerWrote": ctx.data().get("inner"),
                }))
            }),
        )
        .register(
            "Fresh",
            handler_fn(|_msg, ctx| async move { Ok(json!(ctx.data().len())) }),
        );

    let out = bus.invoke(Message::new("Outer")).await.unwrap().unwrap();
    assert_eq!(out["echoed"], "hello");
    assert_eq!(out["innerWrote"], true);

    // An unrelated top-level call starts with its own bag.
    assert_eq!(bus.invoke(Message::new("Fresh")).await.unwrap(), Some(json!(0)));
}

#[tokio::test]
async fn typed_queries_round_trip_through_handlers() {
    let bus = bus();
    bus.registry()
        .register(
            "GetUser",
            handler_fn(|msg, _ctx| async move {
                let id = msg.body()["id"].as_u64().unwrap_or_default();
                respond(GetQueryResponse::new(format!("user-{id}")))
            }),
        )
        .register(
            "FindUsers",
            handler_fn(|msg, _ctx| async move {
                let offset = msg.body()["offset"].as_u64().unwrap_or_default();
                respond(FindQueryResponse::new(vec!["ada".to_string()], offset, false))
            }),
        )
        .register(
            "CreateUser",
            handler_fn(|msg, _ctx| async move {
                Ok(json!({ "created": msg.body()["name"].clone() }))
            }),
        );

    let user = bus
        .get(GetQuery::<_, String>::new("GetUser", json!({"id": 7})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.result, "user-7");

    let page = bus
        .find(FindQuery::<_, String>::new("FindUsers", json!({})).page(10, 5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(page.results, vec!["ada"]);
    assert_eq!(page.offset, 10);
    assert!(!page.has_more);

    let created = bus
        .command(Command::new("CreateUser", json!({"name": "ada"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.details["created"], "ada");
}

#[tokio::test]
async fn extensions_set_by_a_pre_handler_reach_nested_calls() {
    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    let bus = bus();
    bus.registry()
        .register_pre_handler(pre_handler_fn("tenant", |msg, ctx| async move {
            if ctx.is_root() {
                ctx.set_extension(Tenant("acme"));
            }
            Ok(PreHandlerOutcome::proceed(&msg))
        }))
        .register(
            "Inner",
            handler_fn(|_msg, ctx| async move {
                Ok(json!(ctx.extension::<Tenant>().map(|t| t.0)))
            }),
        )
        .register(
            "Outer",
            handler_fn(|_msg, ctx| async move {
                Ok(ctx.api().invoke(Message::new("Inner")).await?.unwrap_or_default())
            }),
        );

    assert_eq!(bus.invoke(Message::new("Outer")).await.unwrap(), Some(json!("acme")));
}

#[tokio::test]
async fn correlation_id_falls_back_to_request_id() {
    let bus = bus();
    bus.registry().register(
        "Who",
        handler_fn(|_msg, ctx| async move {
            Ok(json!([ctx.correlation_id(), ctx.request_id()]))
        }),
    );

    let plain = bus.invoke(Message::new("Who")).await.unwrap().unwrap();
    assert_eq!(plain[0], plain[1]);

    let tagged = bus
        .invoke(Message::new("Who").with_correlation_id("corr-9"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tagged[0], "corr-9");
}

#[tokio::test]
async fn root_message_is_visible_from_nested_calls() {
    let bus = bus();
    bus.registry()
        .register(
            "Leaf",
            handler_fn(|_msg, ctx| async move { Ok(json!(ctx.root_message().name())) }),
        )
        .register(
            "Branch",
            handler_fn(|_msg, ctx| async move {
                Ok(ctx.api().invoke(Message::new("Leaf")).await?.unwrap_or_default())
            }),
        );

    let out = bus.invoke(Message::new("Branch")).await.unwrap();

    assert_eq!(out, Some(json!("Branch")));
}
