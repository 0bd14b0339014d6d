//! Window assigners
//!
//! This module provides the strategy for assigning events to windows based on
//! their timestamps.

use super::types::{Window, WindowBounds};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// Trait for assigning events to windows
pub trait WindowAssigner: Send + Sync + fmt::Debug {
    /// Assign a timestamp to one or more windows
    fn assign_windows(&self, timestamp: DateTime<Utc>) -> Vec<Window>;

    /// Get the maximum number of windows an event can be assigned to
    fn max_windows_per_event(&self) -> usize {
        1
    }
}

/// Tumbling window assigner
///
/// Creates fixed-size, non-overlapping windows aligned to the Unix epoch.
/// Each event is assigned to exactly one window based on its timestamp.
///
/// # Example
/// ```text
/// Window size: 1 day
/// Event at 2024-07-01T13:00 -> Window [2024-07-01T00:00, 2024-07-02T00:00)
/// Event at 2024-07-02T00:00 -> Window [2024-07-02T00:00, 2024-07-03T00:00)
/// ```
#[derive(Debug, Clone)]
pub struct TumblingWindowAssigner {
    /// Size of each window
    size: Duration,
    /// Optional offset for window alignment
    offset: Duration,
}

impl TumblingWindowAssigner {
    /// Create a new tumbling window assigner
    pub fn new(size: Duration) -> Self {
        assert!(size > Duration::zero(), "Window size must be positive");
        Self {
            size,
            offset: Duration::zero(),
        }
    }

    /// Daily windows starting at midnight UTC
    pub fn daily() -> Self {
        Self::new(Duration::days(1))
    }

    /// Create a tumbling window assigner with an offset
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn size(&self) -> Duration {
        self.size
    }

    /// Calculate the window start for a given timestamp
    fn window_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let ts_millis = timestamp.timestamp_millis();
        let offset_millis = self.offset.num_milliseconds();
        let size_millis = self.size.num_milliseconds();

        let aligned = ts_millis - (ts_millis - offset_millis).rem_euclid(size_millis);

        // Any millisecond inside chrono's range stays inside it after flooring
        // unless it is within one window of the minimum.
        Utc.timestamp_millis_opt(aligned)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// The single window containing the timestamp
    pub fn assign(&self, timestamp: DateTime<Utc>) -> Window {
        let start = self.window_start(timestamp);
        let end = start + self.size;
        Window::new(WindowBounds::new(start, end))
    }
}

impl WindowAssigner for TumblingWindowAssigner {
    fn assign_windows(&self, timestamp: DateTime<Utc>) -> Vec<Window> {
        vec![self.assign(timestamp)]
    }
}
