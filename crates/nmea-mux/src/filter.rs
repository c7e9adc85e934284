//! AIS traffic filter
//!
//! Suppresses near-stationary and small vessels. The policy fails open:
//! anything it cannot classify is forwarded.

use std::time::Instant;

use nmea_protocol::{AisDecoder, DecodeError, DecodedMessage, Frame};
use tracing::debug;

use crate::cache::IdentityCache;
use crate::config::FilterConfig;

/// Outcome of the filter for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Drop,
}

/// What a frame turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Not an AIS sentence
    NonAis,
    /// AIS sentence the decoder could not turn into fields
    Undecodable(DecodeError),
    /// AIS sentence decoded into fields
    Decoded(DecodedMessage),
}

/// Run `frame` through the decoder if it is an AIS sentence
pub fn classify(frame: &Frame, decoder: &mut dyn AisDecoder) -> Classification {
    if !frame.is_ais() {
        return Classification::NonAis;
    }
    match decoder.decode(frame.as_bytes()) {
        Ok(msg) => Classification::Decoded(msg),
        Err(e) => Classification::Undecodable(e),
    }
}

/// Speed and length thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPolicy {
    pub enabled: bool,
    pub min_speed_knots: f64,
    pub min_length_m: u32,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::from(&FilterConfig::default())
    }
}

impl From<&FilterConfig> for FilterPolicy {
    fn from(config: &FilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_speed_knots: config.min_speed_knots,
            min_length_m: config.min_length_m,
        }
    }
}

impl FilterPolicy {
    /// Forward everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Decide whether a classified frame goes to the sinks
    ///
    /// A disabled policy forwards everything and leaves `cache` alone.
    /// Otherwise decoded messages update `cache` before the thresholds are
    /// applied, so a length learned from a static report applies to later
    /// position reports of the same vessel.
    pub fn decide(
        &self,
        classification: &Classification,
        cache: &mut IdentityCache,
        now: Instant,
    ) -> Decision {
        if !self.enabled {
            return Decision::Forward;
        }

        let msg = match classification {
            Classification::NonAis => return Decision::Forward,
            Classification::Undecodable(e) => {
                debug!("Forwarding undecodable AIS sentence: {}", e);
                return Decision::Forward;
            }
            Classification::Decoded(msg) => msg,
        };

        let Some(mmsi) = msg.mmsi() else {
            return Decision::Forward;
        };
        cache.observe(mmsi, msg.length(), now);

        if let Some(speed) = msg.speed() {
            if speed < self.min_speed_knots {
                debug!("Dropping {}: speed {:.1} kn", mmsi, speed);
                return Decision::Drop;
            }
        }

        if let Some(length) = cache.lookup(mmsi) {
            if length < self.min_length_m {
                debug!("Dropping {}: length {} m", mmsi, length);
                return Decision::Drop;
            }
        }

        Decision::Forward
    }
}

#[cfg(test)]
mod tests {
    use nmea_protocol::testing::{position_report, static_report};
    use nmea_protocol::{AivdmDecoder, FieldValue};

    use super::*;

    fn decoded(fields: &[(&str, FieldValue)]) -> Classification {
        let msg = fields
            .iter()
            .cloned()
            .fold(DecodedMessage::new(), |msg, (name, value)| msg.with(name, value));
        Classification::Decoded(msg)
    }

    #[test]
    fn test_classify_non_ais() {
        let mut decoder = AivdmDecoder::new();
        let frame = Frame::from("$GPGLL,4916.45,N,12311.12,W,225444,A,*1D");
        assert_eq!(classify(&frame, &mut decoder), Classification::NonAis);
    }

    #[test]
    fn test_classify_incomplete_is_undecodable() {
        let mut decoder = AivdmDecoder::new();
        let [first, _] = static_report(1, "X", 1, 1);
        let frame = Frame::from(first.as_str());
        assert!(matches!(
            classify(&frame, &mut decoder),
            Classification::Undecodable(DecodeError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_non_ais_always_forwarded() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        cache.observe(1, Some(3), Instant::now());

        let decision = policy.decide(&Classification::NonAis, &mut cache, Instant::now());
        assert_eq!(decision, Decision::Forward);
    }

    #[test]
    fn test_decode_failures_fail_open() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        let now = Instant::now();

        for err in [
            DecodeError::Unsupported(8),
            DecodeError::Incomplete {
                received: 1,
                total: 2,
            },
            DecodeError::Malformed("bad".into()),
        ] {
            let decision = policy.decide(&Classification::Undecodable(err), &mut cache, now);
            assert_eq!(decision, Decision::Forward);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_slow_vessel_dropped() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        let msg = decoded(&[
            ("mmsi", FieldValue::Int(1)),
            ("speed", FieldValue::Float(0.4)),
        ]);
        assert_eq!(policy.decide(&msg, &mut cache, Instant::now()), Decision::Drop);
    }

    #[test]
    fn test_speed_at_threshold_forwarded() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        let msg = decoded(&[
            ("mmsi", FieldValue::Int(1)),
            ("speed", FieldValue::Float(0.5)),
        ]);
        assert_eq!(
            policy.decide(&msg, &mut cache, Instant::now()),
            Decision::Forward
        );
    }

    #[test]
    fn test_cached_length_drops_later_reports() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        cache.observe(42, Some(12), Instant::now());

        let msg = decoded(&[
            ("mmsi", FieldValue::Int(42)),
            ("speed", FieldValue::Float(12.0)),
        ]);
        assert_eq!(policy.decide(&msg, &mut cache, Instant::now()), Decision::Drop);
    }

    #[test]
    fn test_unknown_length_forwarded() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        let msg = decoded(&[
            ("mmsi", FieldValue::Int(42)),
            ("speed", FieldValue::Float(12.0)),
        ]);
        assert_eq!(
            policy.decide(&msg, &mut cache, Instant::now()),
            Decision::Forward
        );
        assert!(cache.entry(42).is_some());
    }

    #[test]
    fn test_missing_mmsi_forwarded() {
        let policy = FilterPolicy::default();
        let mut cache = IdentityCache::new();
        let msg = decoded(&[("speed", FieldValue::Float(0.0))]);
        assert_eq!(
            policy.decide(&msg, &mut cache, Instant::now()),
            Decision::Forward
        );
    }

    #[test]
    fn test_disabled_policy_leaves_cache_untouched() {
        let policy = FilterPolicy::disabled();
        let mut cache = IdentityCache::new();
        let msg = decoded(&[
            ("mmsi", FieldValue::Int(7)),
            ("speed", FieldValue::Float(0.0)),
            ("to_bow", FieldValue::Int(2)),
            ("to_stern", FieldValue::Int(2)),
        ]);
        assert_eq!(
            policy.decide(&msg, &mut cache, Instant::now()),
            Decision::Forward
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_slow_position_report_dropped_end_to_end() {
        let policy = FilterPolicy::default();
        let mut decoder = AivdmDecoder::new();
        let mut cache = IdentityCache::new();

        // 0.4 kn, below the 0.5 kn default
        let frame = Frame::from(position_report(235_009_802, 4).as_str());
        let classification = classify(&frame, &mut decoder);
        assert!(matches!(classification, Classification::Decoded(_)));
        assert_eq!(
            policy.decide(&classification, &mut cache, Instant::now()),
            Decision::Drop
        );
        assert_eq!(cache.entry(235_009_802).map(|e| e.length_m), Some(None));
    }

    #[test]
    fn test_small_vessel_sequence() {
        let policy = FilterPolicy::default();
        let mut decoder = AivdmDecoder::new();
        let mut cache = IdentityCache::new();
        let now = Instant::now();

        let [first, second] = static_report(235_009_802, "ORAC", 5, 3);
        let part = classify(&Frame::from(first.as_str()), &mut decoder);
        assert_eq!(policy.decide(&part, &mut cache, now), Decision::Forward);

        let whole = classify(&Frame::from(second.as_str()), &mut decoder);
        assert_eq!(policy.decide(&whole, &mut cache, now), Decision::Drop);
        assert_eq!(cache.lookup(235_009_802), Some(8));

        let moving = classify(
            &Frame::from(position_report(235_009_802, 30).as_str()),
            &mut decoder,
        );
        assert_eq!(policy.decide(&moving, &mut cache, now), Decision::Drop);
    }
}
