//! Multiplexer configuration
//!
//! The configuration is a JSON document: global filter/cache/queue settings
//! plus an ordered list of channel descriptors. Each descriptor carries a
//! `type` tag (`SERIAL`, `TCP`, `UDP`), an `is_mux` flag (true for output
//! channels) and the transport address.
//!
//! ```json
//! {
//!   "filter": { "min_speed_knots": 0.5, "min_length_m": 20 },
//!   "channels": [
//!     { "type": "SERIAL", "name": "AIS from VHF", "is_mux": false,
//!       "port": "/dev/ttyS1", "baud": 38400 },
//!     { "type": "UDP", "name": "UDP to Navionics", "is_mux": true,
//!       "send_to": "192.168.1.50:10110" }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Direction of a channel
///
/// Serialized as the `is_mux` flag: `true` for sinks, `false` for sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum Role {
    /// Inbound channel feeding the ingest queue
    Source,
    /// Outbound (mux) channel retransmitting aggregated traffic
    Sink,
}

impl From<bool> for Role {
    fn from(is_mux: bool) -> Self {
        if is_mux {
            Role::Sink
        } else {
            Role::Source
        }
    }
}

impl From<Role> for bool {
    fn from(role: Role) -> Self {
        role == Role::Sink
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Source => "source",
            Role::Sink => "sink",
        })
    }
}

/// Transport family of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Serial,
    Tcp,
    Udp,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelKind::Serial => "SERIAL",
            ChannelKind::Tcp => "TCP",
            ChannelKind::Udp => "UDP",
        })
    }
}

/// Transport-specific part of a channel descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportConfig {
    /// Serial device
    #[serde(rename = "SERIAL")]
    Serial {
        /// Device path (e.g. /dev/ttyS0)
        port: String,
        /// Baud rate
        baud: u32,
    },

    /// TCP listener; sources read from every client, sinks write to every client
    #[serde(rename = "TCP")]
    Tcp {
        /// Address to listen on
        address: SocketAddr,
    },

    /// UDP socket
    #[serde(rename = "UDP")]
    Udp {
        /// Bind address (required for sources, optional for sinks)
        #[serde(default)]
        address: Option<SocketAddr>,
        /// Destination for sinks
        #[serde(default)]
        send_to: Option<SocketAddr>,
        /// Enable SO_BROADCAST for broadcast destinations
        #[serde(default)]
        broadcast: bool,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            TransportConfig::Serial { .. } => ChannelKind::Serial,
            TransportConfig::Tcp { .. } => ChannelKind::Tcp,
            TransportConfig::Udp { .. } => ChannelKind::Udp,
        }
    }
}

/// One channel descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Human-readable label used in logs
    pub name: String,
    /// Source or sink
    #[serde(rename = "is_mux")]
    pub role: Role,
    /// Transport and its address
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        self.transport.kind()
    }

    /// Serial source or sink
    pub fn serial(name: impl Into<String>, role: Role, port: impl Into<String>, baud: u32) -> Self {
        Self {
            name: name.into(),
            role,
            transport: TransportConfig::Serial {
                port: port.into(),
                baud,
            },
        }
    }

    /// TCP listener
    pub fn tcp(name: impl Into<String>, role: Role, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            role,
            transport: TransportConfig::Tcp { address },
        }
    }

    /// UDP source bound to `address`
    pub fn udp_source(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            role: Role::Source,
            transport: TransportConfig::Udp {
                address: Some(address),
                send_to: None,
                broadcast: false,
            },
        }
    }

    /// UDP sink sending every frame to `send_to`
    pub fn udp_sink(name: impl Into<String>, send_to: SocketAddr) -> Self {
        Self {
            name: name.into(),
            role: Role::Sink,
            transport: TransportConfig::Udp {
                address: None,
                send_to: Some(send_to),
                broadcast: false,
            },
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidChannel {
            channel: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("channel name must not be empty".into()));
        }

        match (&self.transport, self.role) {
            (TransportConfig::Serial { port, baud }, _) => {
                if port.trim().is_empty() {
                    return Err(self.invalid("serial port path is empty"));
                }
                if *baud == 0 {
                    return Err(self.invalid("baud rate must be positive"));
                }
            }
            (TransportConfig::Tcp { .. }, _) => {}
            (TransportConfig::Udp { address, .. }, Role::Source) => {
                if address.is_none() {
                    return Err(self.invalid("UDP source needs a bind address"));
                }
            }
            (TransportConfig::Udp { send_to, .. }, Role::Sink) => {
                if send_to.is_none() {
                    return Err(self.invalid("UDP sink needs a send_to address"));
                }
            }
        }
        Ok(())
    }
}

/// AIS filter thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Disable to forward all AIS traffic untouched
    pub enabled: bool,
    /// Sentences reporting a lower speed are dropped (knots)
    pub min_speed_knots: f64,
    /// Vessels with a known length below this are dropped (meters)
    pub min_length_m: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_speed_knots: 0.5,
            min_length_m: 20,
        }
    }
}

/// Identity cache lifetime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries not seen for this long are purged
    pub ttl_secs: u64,
    /// How often the purge runs
    pub purge_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            purge_interval_secs: 30,
        }
    }
}

/// Queue sizes and polling timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the shared ingest queue
    pub ingest_capacity: usize,
    /// Capacity of each sink's outbound queue
    pub outbound_capacity: usize,
    /// Serial and socket read timeout
    pub serial_read_timeout_ms: u64,
    /// Upper bound on how long a loop waits on an empty queue
    pub poll_timeout_ms: u64,
}

impl QueueConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_read_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 100,
            outbound_capacity: 10,
            serial_read_timeout_ms: 1000,
            poll_timeout_ms: 250,
        }
    }
}

/// Complete multiplexer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MuxConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    /// Channels in start-up order
    pub channels: Vec<ChannelConfig>,
}

impl MuxConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: MuxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the configuration for problems that would only surface at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.filter.min_speed_knots.is_finite() || self.filter.min_speed_knots < 0.0 {
            return Err(ConfigError::Invalid(
                "filter.min_speed_knots must be a non-negative number".into(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }
        if self.cache.purge_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.purge_interval_secs must be positive".into(),
            ));
        }
        if self.queues.ingest_capacity == 0 || self.queues.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be positive".into()));
        }
        if self.queues.serial_read_timeout_ms == 0 || self.queues.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("queue timeouts must be positive".into()));
        }

        let mut names = HashSet::new();
        let mut ports: HashMap<&str, &str> = HashMap::new();
        for channel in &self.channels {
            channel.validate()?;

            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateName(channel.name.clone()));
            }

            if let TransportConfig::Serial { port, .. } = &channel.transport {
                if let Some(first) = ports.insert(port.as_str(), channel.name.as_str()) {
                    return Err(ConfigError::PortInUse {
                        port: port.clone(),
                        first: first.to_string(),
                        second: channel.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn sources(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.role == Role::Source)
    }

    pub fn sinks(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.role == Role::Sink)
    }
}
