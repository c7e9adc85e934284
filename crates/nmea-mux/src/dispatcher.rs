//! Central dispatch loop
//!
//! Drains the ingest queue, classifies each frame, applies the filter
//! policy (which updates the identity cache) and copies forwarded frames to
//! every active sink. Cache purges run on a fixed interval whether or not
//! traffic is flowing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nmea_protocol::{AisDecoder, AivdmDecoder, Frame};
use tracing::{debug, info};

use crate::cache::IdentityCache;
use crate::config::MuxConfig;
use crate::filter::{classify, Classification, Decision, FilterPolicy};
use crate::queue::FrameQueue;
use crate::registry::SinkHandle;
use crate::shutdown::Shutdown;

/// Timing settings for the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Longest wait on an empty ingest queue
    pub poll_timeout: Duration,
    /// Time between cache purges
    pub purge_interval: Duration,
    /// Idle time after which a vessel is forgotten
    pub cache_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&MuxConfig::default())
    }
}

impl From<&MuxConfig> for DispatcherConfig {
    fn from(config: &MuxConfig) -> Self {
        Self {
            poll_timeout: config.queues.poll_timeout(),
            purge_interval: config.cache.purge_interval(),
            cache_ttl: config.cache.ttl(),
        }
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames taken from the ingest queue
    pub received: u64,
    /// Frames copied to the sinks
    pub forwarded: u64,
    /// Frames dropped by the filter
    pub filtered: u64,
    /// AIS frames forwarded without being decoded
    pub undecodable: u64,
    /// Cache entries removed by purges
    pub purged: u64,
}

pub struct Dispatcher {
    ingest: Arc<FrameQueue>,
    sinks: Vec<SinkHandle>,
    policy: FilterPolicy,
    decoder: Box<dyn AisDecoder + Send>,
    cache: IdentityCache,
    config: DispatcherConfig,
    last_purge: Instant,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        ingest: Arc<FrameQueue>,
        sinks: Vec<SinkHandle>,
        policy: FilterPolicy,
        config: DispatcherConfig,
    ) -> Self {
        Self::with_decoder(ingest, sinks, policy, config, Box::new(AivdmDecoder::new()))
    }

    /// Use a custom AIS decoder
    pub fn with_decoder(
        ingest: Arc<FrameQueue>,
        sinks: Vec<SinkHandle>,
        policy: FilterPolicy,
        config: DispatcherConfig,
        decoder: Box<dyn AisDecoder + Send>,
    ) -> Self {
        Self {
            ingest,
            sinks,
            policy,
            decoder,
            cache: IdentityCache::new(),
            config,
            last_purge: Instant::now(),
            stats: DispatchStats::default(),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Sinks still receiving frames
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Classify, filter and fan out one frame
    pub fn dispatch(&mut self, frame: Frame, now: Instant) -> Decision {
        self.stats.received += 1;

        let decision = if self.policy.enabled {
            let classification = classify(&frame, self.decoder.as_mut());
            if let Classification::Undecodable(_) = classification {
                self.stats.undecodable += 1;
            }
            self.policy.decide(&classification, &mut self.cache, now)
        } else {
            Decision::Forward
        };

        match decision {
            Decision::Forward => {
                self.fan_out(frame);
                self.stats.forwarded += 1;
            }
            Decision::Drop => {
                debug!("Filtered {}", frame);
                self.stats.filtered += 1;
            }
        }
        decision
    }

    fn fan_out(&mut self, frame: Frame) {
        self.sinks.retain(|sink| {
            let active = sink.is_active();
            if !active {
                info!("{}: sink closed, no longer forwarding to it", sink.name);
            }
            active
        });

        // The last sink takes the original
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.queue.push(frame.clone());
            }
            last.queue.push(frame);
        }
    }

    /// Purge the cache if the purge interval has elapsed
    pub fn maybe_purge(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_purge) < self.config.purge_interval {
            return 0;
        }
        self.last_purge = now;

        let removed = self.cache.purge(now, self.config.cache_ttl);
        self.stats.purged += removed as u64;
        removed
    }

    /// Run until shutdown, returning the final counters
    pub async fn run(mut self, mut shutdown: Shutdown) -> DispatchStats {
        info!(
            "Dispatcher started with {} sinks (filter {})",
            self.sinks.len(),
            if self.policy.enabled { "on" } else { "off" }
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => break,

                next = self.ingest.pop_timeout(self.config.poll_timeout) => {
                    if let Some(frame) = next {
                        self.dispatch(frame, Instant::now());
                    }
                }
            }
            self.maybe_purge(Instant::now());
        }

        let stats = self.stats;
        info!(
            "Dispatcher stopped: {} received, {} forwarded, {} filtered, {} undecodable, {} purged",
            stats.received, stats.forwarded, stats.filtered, stats.undecodable, stats.purged
        );
        stats
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sinks.len())
            .field("policy", &self.policy)
            .field("cached_vessels", &self.cache.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
