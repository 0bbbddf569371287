//! Courier Runtime - configuration and logging for the Courier toolkit.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`): defaults, `courier.toml` /
//!   `courier.yaml`, `COURIER_*` environment variables
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - `CourierRuntime`: a message bus composed from configuration
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder().profile("production").build()?;
//!     runtime.registry().register("Ping", ping_handler());
//!
//!     let pong = runtime.api().invoke(Message::new("Ping")).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, DispatchConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder, bus_from_config};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler and application code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
