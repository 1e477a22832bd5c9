//! Structured logging for the link-state routing simulator
//!
//! Every node runtime logs inside a `node` span carrying `node_id`. This
//! crate installs the subscriber that turns those spans into output:
//!
//! - **JSON lines** to the console by default, one object per event
//! - **Pretty text** for interactive runs ([`LogConfig::development`])
//! - **File output** with daily, hourly or no rotation
//! - **Node context** for code that drives many nodes on one thread
//!
//! # Quick Start
//!
//! ```ignore
//! use linkstate_logging::{LinkStateSubscriberBuilder, LogConfig};
//!
//! // JSON lines on stderr, level from RUST_LOG or "info"
//! let _guard = LinkStateSubscriberBuilder::new().try_init()?;
//!
//! // Human-readable output
//! let _guard = LinkStateSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .try_init()?;
//! ```
//!
//! Keep the returned guard alive while logging to a file; dropping it
//! flushes and stops the background writer.
//!
//! # Node Context
//!
//! ```ignore
//! use linkstate_logging::context::{NodeContextGuard, node_span};
//!
//! let _guard = NodeContextGuard::new(&node_a, run_id);
//! node_span(&node_a, run_id).in_scope(|| tracing::info!("refresh"));
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard, node_span};
pub use layers::NodeContextLayer;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot create rolling appender: {0}")]
    Appender(#[from] InitError),

    #[error("subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync + 'static>;

/// Builder for the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured default level.
#[derive(Debug, Clone, Default)]
pub struct LinkStateSubscriberBuilder {
    config: LogConfig,
}

impl LinkStateSubscriberBuilder {
    /// Builder with [`LogConfig::default`]: JSON lines to the console
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default level directive
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Write JSON lines to a file as well
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Configuration this builder will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard when file output is configured.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)?,
        };

        let mut layers: Vec<BoxedLayer> = vec![NodeContextLayer::new().boxed()];

        if self.config.console.enabled {
            let console = if self.config.console.pretty {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(self.config.console.ansi)
                    .with_target(true)
                    .boxed()
            } else {
                layers::json_layer(std::io::stderr, &self.config.json).boxed()
            };
            layers.push(console);
        }

        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(layers::json_layer(writer, &self.config.json).boxed());
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(layers)
            .try_init()?;

        Ok(guard)
    }
}

/// Open the non-blocking writer for `config`
///
/// `Never` truncates a single `<prefix>.log`; rotating strategies append to
/// `<prefix>.<date>.log`.
pub fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install JSON console logging, reporting failure on stderr
pub fn init_default() {
    if let Err(e) = LinkStateSubscriberBuilder::new().try_init() {
        eprintln!("Warning: logging not initialized: {}", e);
    }
}

/// Install pretty debug logging, reporting failure on stderr
pub fn init_development() {
    if let Err(e) = LinkStateSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .try_init()
    {
        eprintln!("Warning: logging not initialized: {}", e);
    }
}

/// Install quiet logging for tests; repeated calls are harmless
pub fn init_testing() {
    let _ = LinkStateSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
