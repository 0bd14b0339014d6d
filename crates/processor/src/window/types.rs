//! Window types and bounds
//!
//! This module defines the window types used for the daily aggregation.

use chrono::{DateTime, Duration, Utc};
use heatwatch_types::WindowKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the time bounds of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Start time of the window (inclusive)
    pub start: DateTime<Utc>,
    /// End time of the window (exclusive)
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    /// Create a new window bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Get the duration of the window
    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.end.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl PartialOrd for WindowBounds {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowBounds {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start.cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

/// Represents a window in the stream processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// The time bounds of this window
    pub bounds: WindowBounds,
}

impl Window {
    /// Create a new window with the given bounds
    pub fn new(bounds: WindowBounds) -> Self {
        Self { bounds }
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.bounds.contains(timestamp)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.bounds.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.bounds.end
    }

    /// Key of this window for one station
    pub fn key_for(&self, station: &str) -> WindowKey {
        WindowKey {
            station: station.to_string(),
            window_start: self.bounds.start,
            window_end: self.bounds.end,
        }
    }
}

impl From<&WindowKey> for Window {
    fn from(key: &WindowKey) -> Self {
        Window::new(WindowBounds::new(key.window_start, key.window_end))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Window[{}]", self.bounds)
    }
}
