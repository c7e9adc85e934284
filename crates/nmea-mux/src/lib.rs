//! NMEA Multiplexer Engine
//!
//! This crate moves NMEA-0183 and AIS sentences from any number of input
//! channels to any number of output channels, filtering AIS traffic on the
//! way.
//!
//! # Architecture
//!
//! ```text
//! sources ──► ingest queue ──► dispatcher ──► outbound queue ──► sink
//!  (serial,     (bounded,      (classify,      (one per sink,    (serial,
//!   TCP, UDP)    drop-oldest)   cache, filter)  drop-oldest)      TCP, UDP)
//! ```
//!
//! - Every channel runs in its own task ([`transport::run_source`] /
//!   [`transport::run_sink`]), started by the [`ChannelRegistry`]
//! - The [`Dispatcher`] owns the [`IdentityCache`] and is its only writer
//! - All tasks stop cooperatively when the [`Shutdown`] signal fires
//!
//! # Example
//!
//! ```rust,no_run
//! use nmea_mux::{shutdown_channel, MuxConfig};
//!
//! # async fn example() -> Result<(), nmea_mux::MuxError> {
//! let config = MuxConfig::load("/etc/nmea-mux/config.json".as_ref())?;
//! let (trigger, shutdown) = shutdown_channel();
//!
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     trigger.trigger();
//! });
//!
//! let stats = nmea_mux::run(&config, shutdown).await?;
//! println!("forwarded {} sentences", stats.forwarded);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod transport;

use std::sync::Arc;

use tracing::info;

pub use cache::{CacheEntry, IdentityCache};
pub use config::{
    CacheConfig, ChannelConfig, ChannelKind, FilterConfig, MuxConfig, QueueConfig, Role,
    TransportConfig,
};
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
pub use error::{ConfigError, MuxError, TransportError};
pub use filter::{classify, Classification, Decision, FilterPolicy};
pub use queue::{BoundedQueue, FrameQueue, PushOutcome};
pub use registry::{ChannelRegistry, SinkHandle};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use transport::{FrameSink, FrameSource, Sink, Source};

/// Run the multiplexer described by `config` until `shutdown` fires
///
/// Fails only if the configuration is invalid or a channel cannot be
/// opened. Once running, channel failures are logged and the remaining
/// channels keep going. Returns after every task has exited.
pub async fn run(config: &MuxConfig, shutdown: Shutdown) -> Result<DispatchStats, MuxError> {
    config.validate()?;

    let ingest = Arc::new(FrameQueue::new("ingest", config.queues.ingest_capacity));
    let registry = ChannelRegistry::start(config, ingest.clone(), shutdown.clone()).await?;

    let dispatcher = Dispatcher::new(
        ingest,
        registry.sinks(),
        FilterPolicy::from(&config.filter),
        DispatcherConfig::from(config),
    );
    let stats = dispatcher.run(shutdown).await;

    info!("Waiting for channels to stop");
    registry.shutdown().await;
    Ok(stats)
}
