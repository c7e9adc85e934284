//! Channel transports
//!
//! Every channel is either a [`FrameSource`] feeding the shared ingest queue
//! or a [`FrameSink`] draining its own outbound queue. The serial, TCP and
//! UDP implementations are unified by the [`Source`] and [`Sink`] enums, and
//! each runs in its own task via [`run_source`] / [`run_sink`].

mod serial;
mod tcp;
mod udp;

pub use serial::{SerialSink, SerialSource};
pub use tcp::{TcpSink, TcpSource};
pub use udp::{UdpSink, UdpSource};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nmea_protocol::Frame;
use tracing::{debug, error, info, warn};

use crate::config::{ChannelConfig, QueueConfig, TransportConfig};
use crate::error::TransportError;
use crate::queue::FrameQueue;
use crate::shutdown::Shutdown;

/// Terminator appended by serial sinks
pub const SERIAL_TERMINATOR: &[u8] = b"\r";
/// Terminator appended by network sinks
pub const NETWORK_TERMINATOR: &[u8] = b"\r\n";

/// Inbound side of a channel
pub trait FrameSource {
    /// Wait a bounded time for the next frame
    ///
    /// `Ok(None)` means nothing arrived within the read timeout (or only
    /// connection bookkeeping happened) and the caller should poll again.
    fn receive(&mut self) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;
}

/// Outbound side of a channel
pub trait FrameSink {
    /// Write one frame to the wire, adding the transport's terminator
    fn send(&mut self, frame: &Frame) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Any inbound transport
#[derive(Debug)]
pub enum Source {
    Serial(SerialSource),
    Tcp(TcpSource),
    Udp(UdpSource),
}

impl Source {
    /// Open the transport described by `config`
    pub async fn open(config: &ChannelConfig, queues: &QueueConfig) -> Result<Self, TransportError> {
        let timeout = queues.read_timeout();
        match &config.transport {
            TransportConfig::Serial { port, baud } => {
                Ok(Source::Serial(SerialSource::open(port, *baud, timeout)?))
            }
            TransportConfig::Tcp { address } => Ok(Source::Tcp(
                TcpSource::bind(&config.name, *address, timeout).await?,
            )),
            TransportConfig::Udp { address, .. } => {
                let address = address.ok_or(TransportError::Misconfigured("bind address"))?;
                Ok(Source::Udp(UdpSource::bind(address, timeout).await?))
            }
        }
    }
}

impl FrameSource for Source {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        match self {
            Source::Serial(source) => source.receive().await,
            Source::Tcp(source) => source.receive().await,
            Source::Udp(source) => source.receive().await,
        }
    }
}

/// Any outbound transport
#[derive(Debug)]
pub enum Sink {
    Serial(SerialSink),
    Tcp(TcpSink),
    Udp(UdpSink),
}

impl Sink {
    /// Open the transport described by `config`
    pub async fn open(config: &ChannelConfig, queues: &QueueConfig) -> Result<Self, TransportError> {
        match &config.transport {
            TransportConfig::Serial { port, baud } => {
                Ok(Sink::Serial(SerialSink::open(port, *baud)?))
            }
            TransportConfig::Tcp { address } => Ok(Sink::Tcp(
                TcpSink::bind(
                    &config.name,
                    *address,
                    queues.outbound_capacity,
                    queues.poll_timeout(),
                )
                .await?,
            )),
            TransportConfig::Udp {
                address,
                send_to,
                broadcast,
            } => {
                let send_to = send_to.ok_or(TransportError::Misconfigured("send_to address"))?;
                Ok(Sink::Udp(UdpSink::bind(*address, send_to, *broadcast).await?))
            }
        }
    }
}

impl FrameSink for Sink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        match self {
            Sink::Serial(sink) => sink.send(frame).await,
            Sink::Tcp(sink) => sink.send(frame).await,
            Sink::Udp(sink) => sink.send(frame).await,
        }
    }
}

/// Source task: move frames from `source` into the ingest queue
///
/// Runs until shutdown or a fatal transport error. The transport is dropped
/// (closing its device or sockets) before returning.
pub async fn run_source<S: FrameSource>(
    name: String,
    mut source: S,
    ingest: Arc<FrameQueue>,
    mut shutdown: Shutdown,
) {
    info!("{}: source started", name);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => break,

            result = source.receive() => match result {
                Ok(Some(frame)) => {
                    debug!("{}: received {}", name, frame);
                    ingest.push(frame);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    error!("{}: {}; channel stopped", name, e);
                    break;
                }
                Err(e) => warn!("{}: {}", name, e),
            }
        }
    }

    drop(source);
    info!("{}: source stopped", name);
}

/// Sink task: drain `queue` into `sink`
///
/// Closes `queue` on exit so the dispatcher stops fanning out to it.
pub async fn run_sink<S: FrameSink>(
    name: String,
    mut sink: S,
    queue: Arc<FrameQueue>,
    mut shutdown: Shutdown,
    poll_timeout: Duration,
) {
    info!("{}: sink started", name);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => break,

            next = queue.pop_timeout(poll_timeout) => {
                let Some(frame) = next else {
                    if queue.is_closed() {
                        break;
                    }
                    continue;
                };

                // A write stalled on a device that stopped draining must not hold up shutdown
                tokio::select! {
                    biased;

                    _ = shutdown.wait() => break,

                    result = sink.send(&frame) => match result {
                        Ok(()) => debug!("{}: sent {}", name, frame),
                        Err(e) if e.is_fatal() => {
                            error!("{}: {}; channel stopped", name, e);
                            break;
                        }
                        Err(e) => warn!("{}: {}", name, e),
                    },
                }
            }
        }
    }

    queue.close();
    drop(sink);
    info!("{}: sink stopped", name);
}
