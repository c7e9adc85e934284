//! Error types for the multiplexer

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a channel's transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not bind a listening or sending socket
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Could not open a serial device
    #[error("cannot open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Accepting a new TCP client failed
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Sending a datagram failed
    #[error("send to {destination} failed: {source}")]
    Send {
        destination: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The underlying stream or device reached end of file
    #[error("connection closed")]
    Closed,

    /// The channel descriptor lacks an address this transport needs
    #[error("missing {0}")]
    Misconfigured(&'static str),

    /// I/O error on the channel's device or socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the channel must stop after this error
    ///
    /// Per-connection and per-datagram failures are not fatal; the channel
    /// keeps serving. Everything else ends the channel's execution context.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Accept(_) | Self::Send { .. })
    }
}

/// Errors found while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the configuration file
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON for the expected schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two channels share a name
    #[error("duplicate channel name: {0}")]
    DuplicateName(String),

    /// A serial device is claimed by more than one channel
    #[error("serial port {port} used by both {first} and {second}")]
    PortInUse {
        port: String,
        first: String,
        second: String,
    },

    /// A channel descriptor is missing a field or has a bad value
    #[error("channel {channel}: {reason}")]
    InvalidChannel { channel: String, reason: String },

    /// A global setting is out of range
    #[error("{0}")]
    Invalid(String),
}

/// Errors that can occur in the multiplexer
#[derive(Debug, Error)]
pub enum MuxError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A channel could not be started
    #[error("channel {name} failed to start: {source}")]
    ChannelSetup {
        name: String,
        #[source]
        source: TransportError,
    },
}
