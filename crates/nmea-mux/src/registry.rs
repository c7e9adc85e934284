//! Channel registry and lifecycle
//!
//! The registry opens every configured channel, spawns its task and keeps
//! the handles needed to fan out to sinks and to wait for shutdown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ChannelConfig, MuxConfig, QueueConfig, Role};
use crate::error::{MuxError, TransportError};
use crate::queue::FrameQueue;
use crate::shutdown::Shutdown;
use crate::transport::{run_sink, run_source, FrameSink, FrameSource, Sink, Source};

/// Dispatcher's view of one sink: its name and outbound queue
#[derive(Debug, Clone)]
pub struct SinkHandle {
    pub name: String,
    pub queue: Arc<FrameQueue>,
}

impl SinkHandle {
    /// Whether the sink's task is still draining the queue
    pub fn is_active(&self) -> bool {
        !self.queue.is_closed()
    }
}

struct ChannelEntry {
    name: String,
    role: Role,
    queue: Option<Arc<FrameQueue>>,
    task: JoinHandle<()>,
}

/// Owns every running channel
pub struct ChannelRegistry {
    ingest: Arc<FrameQueue>,
    queues: QueueConfig,
    shutdown: Shutdown,
    channels: Vec<ChannelEntry>,
}

impl ChannelRegistry {
    /// Empty registry; channels are added with [`open_channel`](Self::open_channel),
    /// [`add_source`](Self::add_source) or [`add_sink`](Self::add_sink)
    pub fn new(ingest: Arc<FrameQueue>, queues: QueueConfig, shutdown: Shutdown) -> Self {
        Self {
            ingest,
            queues,
            shutdown,
            channels: Vec::new(),
        }
    }

    /// Open and start every channel in `config`
    ///
    /// If any channel fails to open, the channels already started are
    /// stopped and the failure is returned.
    pub async fn start(
        config: &MuxConfig,
        ingest: Arc<FrameQueue>,
        shutdown: Shutdown,
    ) -> Result<Self, MuxError> {
        let mut registry = Self::new(ingest, config.queues.clone(), shutdown);

        for channel in &config.channels {
            if let Err(source) = registry.open_channel(channel).await {
                registry.abort();
                return Err(MuxError::ChannelSetup {
                    name: channel.name.clone(),
                    source,
                });
            }
        }

        info!(
            "Started {} channels ({} sinks)",
            registry.len(),
            registry.sinks().len()
        );
        Ok(registry)
    }

    /// Open one channel and start its task
    pub async fn open_channel(&mut self, config: &ChannelConfig) -> Result<(), TransportError> {
        info!(
            "{}: opening {} {}",
            config.name,
            config.kind(),
            config.role
        );
        match config.role {
            Role::Source => {
                let source = Source::open(config, &self.queues).await?;
                self.add_source(&config.name, source);
            }
            Role::Sink => {
                let sink = Sink::open(config, &self.queues).await?;
                self.add_sink(&config.name, sink);
            }
        }
        Ok(())
    }

    /// Start a task feeding `source` into the ingest queue
    pub fn add_source<S>(&mut self, name: &str, source: S)
    where
        S: FrameSource + Send + 'static,
    {
        let task = tokio::spawn(run_source(
            name.to_string(),
            source,
            self.ingest.clone(),
            self.shutdown.clone(),
        ));
        self.channels.push(ChannelEntry {
            name: name.to_string(),
            role: Role::Source,
            queue: None,
            task,
        });
    }

    /// Start a task draining a new outbound queue into `sink`
    pub fn add_sink<S>(&mut self, name: &str, sink: S) -> SinkHandle
    where
        S: FrameSink + Send + 'static,
    {
        let queue = Arc::new(FrameQueue::new(name, self.queues.outbound_capacity));
        let task = tokio::spawn(run_sink(
            name.to_string(),
            sink,
            queue.clone(),
            self.shutdown.clone(),
            self.queues.poll_timeout(),
        ));
        self.channels.push(ChannelEntry {
            name: name.to_string(),
            role: Role::Sink,
            queue: Some(queue.clone()),
            task,
        });
        SinkHandle {
            name: name.to_string(),
            queue,
        }
    }

    /// Handles for every sink, in start-up order
    pub fn sinks(&self) -> Vec<SinkHandle> {
        self.channels
            .iter()
            .filter_map(|entry| {
                entry.queue.as_ref().map(|queue| SinkHandle {
                    name: entry.name.clone(),
                    queue: queue.clone(),
                })
            })
            .collect()
    }

    /// Names of sinks whose task is still running
    pub fn active_sinks(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|entry| entry.role == Role::Sink && !entry.task.is_finished())
            .filter(|entry| entry.queue.as_ref().is_some_and(|q| !q.is_closed()))
            .map(|entry| entry.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Stop every task immediately
    pub fn abort(self) {
        for entry in self.channels {
            entry.task.abort();
            if let Some(queue) = entry.queue {
                queue.close();
            }
        }
    }

    /// Wait for every channel task to exit
    ///
    /// Tasks exit once the shared shutdown signal fires (or their transport
    /// fails), so trigger shutdown before awaiting this.
    pub async fn shutdown(self) {
        for entry in self.channels {
            if let Err(e) = entry.task.await {
                warn!("{}: task ended abnormally: {}", entry.name, e);
            }
        }
        info!("All channels stopped");
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field(
                "channels",
                &self
                    .channels
                    .iter()
                    .map(|entry| (entry.name.as_str(), entry.role))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
