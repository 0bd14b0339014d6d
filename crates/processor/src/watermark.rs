//! Event-time watermark tracking
//!
//! Watermarks represent a timestamp threshold asserting that no event at or
//! before it is still expected. Advancing the watermark is what closes windows
//! and expires pending pattern matches, so it is the single piece of state the
//! whole pipeline agrees on.
//!
//! # Overview
//!
//! - [`WatermarkTracker`] derives the watermark from observed event times.
//!   With zero lateness it implements the ascending-timestamp policy: the
//!   watermark is the largest timestamp seen so far. A positive lateness holds
//!   the watermark back by that amount to tolerate bounded out-of-orderness.
//! - [`WatermarkCoordinator`] merges per-partition watermarks into one global
//!   value (the maximum of the partition watermarks) through a single entry
//!   point, for sharded execution.
//!
//! Watermarks never move backwards.
//!
//! # Example
//!
//! ```rust
//! use processor::watermark::{WatermarkGenerator, WatermarkTracker};
//! use processor::config::LatePolicy;
//! use std::time::Duration;
//!
//! let mut tracker = WatermarkTracker::new(Duration::ZERO, LatePolicy::Drop);
//! assert!(tracker.on_event(1_000).is_some());
//! assert!(tracker.on_event(500).is_none());
//! assert_eq!(tracker.current_watermark().timestamp, 1_000);
//! ```

use crate::config::LatePolicy;
use crate::error::{WatermarkError, WatermarkResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Represents a watermark timestamp
///
/// Watermarks indicate that all events with timestamps less than or equal to the watermark
/// have been processed. This allows the system to trigger time-based operations and
/// detect late-arriving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// The watermark timestamp in milliseconds since epoch
    pub timestamp: i64,
}

impl Watermark {
    /// Creates a new watermark with the given timestamp
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Creates a watermark from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            timestamp: dt.timestamp_millis(),
        }
    }

    /// Converts the watermark to a DateTime, if it is representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Returns the minimum possible watermark (beginning of time)
    pub fn min() -> Self {
        Self { timestamp: i64::MIN }
    }

    /// Returns the maximum possible watermark (end of time)
    pub fn max() -> Self {
        Self { timestamp: i64::MAX }
    }

    /// Checks if this watermark has reached the given instant
    pub fn has_reached(&self, instant: DateTime<Utc>) -> bool {
        self.timestamp >= instant.timestamp_millis()
    }

    /// Returns true if this is the minimum watermark
    pub fn is_min(&self) -> bool {
        self.timestamp == i64::MIN
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::min()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) if !self.is_min() => write!(f, "Watermark({})", dt),
            _ => write!(f, "Watermark({})", self.timestamp),
        }
    }
}

/// Trait for generating watermarks from event streams
pub trait WatermarkGenerator: Send + Sync {
    /// Called when an accepted event arrives
    ///
    /// Returns the new watermark if it advanced.
    fn on_event(&mut self, timestamp: i64) -> Option<Watermark>;

    /// Gets the current watermark without advancing it
    fn current_watermark(&self) -> Watermark;

    /// Resets the generator to its pre-start state
    fn reset(&mut self);
}

/// Watermark generator for near-ordered sources
///
/// Tracks the maximum event time seen and holds the watermark back by the
/// configured lateness.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    /// Maximum event time seen
    max_timestamp: i64,
    /// Lateness allowance in milliseconds
    lateness_ms: i64,
    /// Handling of events behind the watermark
    late_policy: LatePolicy,
    /// Current watermark
    current: Watermark,
}

impl WatermarkTracker {
    /// Creates a new tracker
    ///
    /// A zero lateness yields the ascending-timestamp policy.
    pub fn new(lateness: Duration, late_policy: LatePolicy) -> Self {
        Self {
            max_timestamp: i64::MIN,
            lateness_ms: i64::try_from(lateness.as_millis()).unwrap_or(i64::MAX),
            late_policy,
            current: Watermark::min(),
        }
    }

    /// Checks if an event is late based on the current watermark
    pub fn is_late_event(&self, timestamp: i64) -> bool {
        timestamp < self.current.timestamp
    }

    /// Gets the lateness of an event (how far behind the watermark it is)
    ///
    /// Returns 0 if the event is not late
    pub fn get_lateness(&self, timestamp: i64) -> i64 {
        if self.is_late_event(timestamp) {
            self.current.timestamp.saturating_sub(timestamp)
        } else {
            0
        }
    }

    /// Applies the ordering policy to an incoming event time
    ///
    /// Under [`LatePolicy::Fail`] a late event is an ordering violation;
    /// under [`LatePolicy::Drop`] it is left to the aggregator to discard.
    pub fn check_order(&self, timestamp: i64) -> WatermarkResult<()> {
        if self.late_policy == LatePolicy::Fail && self.is_late_event(timestamp) {
            return Err(WatermarkError::OrderingViolation {
                event_time: timestamp,
                watermark: self.current.timestamp,
            });
        }
        Ok(())
    }

    /// Largest event time observed so far
    pub fn max_timestamp(&self) -> i64 {
        self.max_timestamp
    }

    fn compute_watermark(&self) -> Watermark {
        Watermark::new(self.max_timestamp.saturating_sub(self.lateness_ms))
    }
}

impl WatermarkGenerator for WatermarkTracker {
    fn on_event(&mut self, timestamp: i64) -> Option<Watermark> {
        trace!(timestamp = timestamp, "Processing event for watermark");

        if timestamp <= self.max_timestamp {
            return None;
        }
        self.max_timestamp = timestamp;

        let candidate = self.compute_watermark();
        if candidate > self.current {
            self.current = candidate;
            debug!(watermark = %candidate, "Advanced watermark");
            Some(candidate)
        } else {
            None
        }
    }

    fn current_watermark(&self) -> Watermark {
        self.current
    }

    fn reset(&mut self) {
        self.max_timestamp = i64::MIN;
        self.current = Watermark::min();
        debug!("Watermark tracker reset");
    }
}

/// Merges per-partition watermarks into the global watermark
///
/// Each partition reports its latest watermark; the global watermark is the
/// maximum reported value and is only ever raised through [`update`].
///
/// [`update`]: WatermarkCoordinator::update
#[derive(Debug)]
pub struct WatermarkCoordinator {
    partition_watermarks: DashMap<u32, Watermark>,
    global: AtomicI64,
}

impl WatermarkCoordinator {
    pub fn new() -> Self {
        Self {
            partition_watermarks: DashMap::new(),
            global: AtomicI64::new(i64::MIN),
        }
    }

    /// Records a partition watermark and returns the global watermark if it advanced
    ///
    /// A partition reporting a value below its previous one is a regression.
    pub fn update(
        &self,
        partition: u32,
        watermark: Watermark,
    ) -> WatermarkResult<Option<Watermark>> {
        let mut entry = self
            .partition_watermarks
            .entry(partition)
            .or_insert(Watermark::min());
        if watermark < *entry {
            return Err(WatermarkError::WatermarkRegression {
                current_watermark: entry.timestamp,
                new_watermark: watermark.timestamp,
            });
        }
        *entry = watermark;
        drop(entry);

        let previous = self.global.fetch_max(watermark.timestamp, Ordering::AcqRel);
        if watermark.timestamp > previous {
            debug!(partition = partition, watermark = %watermark, "Advanced global watermark");
            Ok(Some(watermark))
        } else {
            Ok(None)
        }
    }

    /// Gets the current global watermark
    pub fn current_watermark(&self) -> Watermark {
        Watermark::new(self.global.load(Ordering::Acquire))
    }

    /// Gets the watermark last reported by a partition
    pub fn partition_watermark(&self, partition: u32) -> Option<Watermark> {
        self.partition_watermarks.get(&partition).map(|w| *w)
    }

    pub fn reset(&self) {
        self.partition_watermarks.clear();
        self.global.store(i64::MIN, Ordering::Release);
    }
}

impl Default for WatermarkCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
