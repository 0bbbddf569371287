//! A small order desk built on Courier.
//!
//! `PlaceOrder` is a command whose handler dispatches `GetPrice` and
//! `ReserveStock` as nested calls. Run it from this directory to pick up
//! `courier.toml`, and set `RUST_LOG=courier_core=trace` to watch contexts
//! being created.

use courier::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    item: String,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceCriteria {
    item: String,
}

fn register_handlers(registry: &HandlerRegistry) {
    registry
        .register(
            "Ping",
            handler_fn(|_msg, ctx| async move {
                ctx.log().info("pong");
                Ok(json!({ "pong": true }))
            }),
        )
        .register(
            "GetPrice",
            handler_fn(|msg, _ctx| async move {
                let criteria: PriceCriteria = msg.decode_body()?;
                let cents: u64 = match criteria.item.as_str() {
                    "widget" => 250,
                    "gadget" => 1200,
                    other => {
                        return Err(DispatchError::failed("UNKNOWN_ITEM", "no such item")
                            .with_data(json!({ "item": other })));
                    }
                };
                respond(GetQueryResponse::new(cents))
            }),
        )
        .register(
            "ReserveStock",
            handler_fn(|msg, ctx| async move {
                let order: Order = msg.decode_body()?;
                ctx.data().update(|data| {
                    let reserved = data.entry("reserved").or_insert_with(|| json!(0));
                    *reserved = json!(reserved.as_u64().unwrap_or(0) + u64::from(order.quantity));
                });
                Ok(json!({ "reserved": order.quantity, "depth": ctx.nested_depth() }))
            }),
        )
        .register(
            "PlaceOrder",
            handler_fn(|msg, ctx| async move {
                let order: Order = msg.decode_body()?;
                let api = ctx.api();

                let price = api
                    .get(GetQuery::<_, u64>::new(
                        "GetPrice",
                        PriceCriteria {
                            item: order.item.clone(),
                        },
                    ))
                    .await?
                    .map(|response| response.result)
                    .unwrap_or_default();

                let reservation = api.send(Command::new("ReserveStock", &order)).await?;

                ctx.log().info(format_args!(
                    "order placed: {} x {} at {} cents",
                    order.quantity, order.item, price
                ));

                Ok(json!({
                    "requestId": ctx.request_id(),
                    "total": price * u64::from(order.quantity),
                    "reservation": reservation,
                    "reservedInRequest": ctx.data().get("reserved"),
                }))
            }),
        );

    // Old clients still send `Hello`.
    registry.register_pre_handler(
        pre_handler_fn("legacy-names", |msg, _ctx| async move {
            if msg.name() == "Hello" {
                Ok(PreHandlerOutcome::replace(Message::new("Ping")))
            } else {
                Ok(PreHandlerOutcome::proceed(&msg))
            }
        })
        .describe("rewrites retired message names"),
    );

    registry.register_pre_handler(pre_handler_fn("maintenance", |msg, _ctx| async move {
        if msg.name() == "Shutdown" {
            info!("shutdown requested; ignoring");
            Ok(PreHandlerOutcome::Halt)
        } else {
            Ok(PreHandlerOutcome::proceed(&msg))
        }
    }));

    registry.set_post_handler(post_handler_fn(|msg, ctx, response| async move {
        if ctx.is_root() {
            debug!(message_name = msg.name(), "Top-level call finished");
        }
        Ok(response)
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = CourierRuntime::builder().build()?;
    register_handlers(runtime.registry());

    let api = runtime.api();

    let pong = api.invoke(Message::new("Hello")).await?;
    info!(response = ?pong, "Hello");

    let placed = api
        .command(Command::new(
            "PlaceOrder",
            Order {
                item: "widget".into(),
                quantity: 4,
            },
        ))
        .await?;
    info!(response = ?placed, "PlaceOrder");

    let halted = api.invoke(Message::new("Shutdown")).await?;
    info!(halted = halted.is_none(), "Shutdown");

    match api
        .get(GetQuery::<_, u64>::new(
            "GetPrice",
            PriceCriteria {
                item: "sprocket".into(),
            },
        ))
        .await
    {
        Ok(price) => info!(?price, "GetPrice"),
        Err(err) => warn!(key = err.key(), data = %err.data(), "GetPrice failed"),
    }

    if let Err(err) = api.invoke(Message::new("Unregistered")).await {
        warn!(key = err.key(), data = %err.data(), "Unregistered");
    }

    Ok(())
}
