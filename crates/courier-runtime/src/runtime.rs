//! Configuration-driven composition of a message bus.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! // Loads courier.toml from the current directory, if any, plus COURIER_* env
//! let runtime = CourierRuntime::new();
//!
//! runtime.registry().register("Ping", handler_fn(|_msg, _ctx| async move {
//!     Ok(json!({ "pong": true }))
//! }));
//!
//! let pong = runtime.api().invoke(Message::new("Ping")).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use courier_core::{
    DelegatingApi, HandlerRegistry, InvokerOptions, MessageBus, SequentialIdGenerator,
    UuidIdGenerator,
};
use tracing::info;

use crate::config::{ConfigLoader, CourierConfig, DispatchConfig, IdStrategy};
use crate::error::RuntimeResult;
use crate::logging;

/// A configured message bus with logging installed.
pub struct CourierRuntime {
    config: CourierConfig,
    bus: MessageBus,
}

impl CourierRuntime {
    /// Creates a runtime from the default configuration sources.
    ///
    /// Falls back to the built-in defaults when the configuration cannot be
    /// loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            CourierConfig::default()
        });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Installs logging from `config.logging` and builds the bus.
    pub fn from_config(config: &CourierConfig) -> Self {
        logging::init_from_config(&config.logging);
        Self::assemble(config)
    }

    fn assemble(config: &CourierConfig) -> Self {
        let bus = bus_from_config(&config.dispatch);

        info!(
            log_level = %config.logging.level,
            id_strategy = ?config.dispatch.id_strategy,
            depth_warning = ?config.dispatch.depth_warning,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            bus,
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// The bus itself, including administration.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Dispatch-only access for application code.
    pub fn api(&self) -> DelegatingApi {
        self.bus.delegate()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.bus.registry()
    }
}

impl Default for CourierRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`MessageBus`] for the given dispatch settings.
pub fn bus_from_config(config: &DispatchConfig) -> MessageBus {
    let builder = MessageBus::builder().options(InvokerOptions {
        depth_warning: config.depth_warning,
        log_payloads: config.log_payloads,
    });

    let builder = match config.id_strategy {
        IdStrategy::Uuid => builder.id_generator(UuidIdGenerator),
        IdStrategy::Sequential => {
            builder.id_generator(SequentialIdGenerator::new(config.id_prefix.as_str()))
        }
    };
    builder.build()
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`CourierRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = CourierRuntime::builder()
///     .config_file("config/courier.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Leaves the global subscriber alone, for hosts that install their own.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        if self.init_logging {
            Ok(CourierRuntime::from_config(&config))
        } else {
            Ok(CourierRuntime::assemble(&config))
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
