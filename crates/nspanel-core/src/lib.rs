//! Core types shared by the NSPanel connector crates.
//!
//! This crate carries the ambient pieces every other crate leans on:
//! - [`config`]: connector configuration (file + environment variables)
//! - [`logging`]: `tracing` subscriber bootstrap
//! - [`event`]: events emitted by the connector
//! - [`eventbus`]: broadcast bus used to hand events to consumers

pub mod config;
pub mod event;
pub mod eventbus;
pub mod logging;

pub use config::{ConfigError, ConnectorConfig, LoggingConfig};
pub use event::{ConnectorEvent, DeviceStateEntry, EventMetadata, StoreDeviceState};
pub use eventbus::{
    EventBus, EventBusReceiver, FilteredReceiver, PublishError, DEFAULT_CHANNEL_CAPACITY,
};
pub use logging::init_logging;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
