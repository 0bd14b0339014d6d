//! Windowing module for stream processing
//!
//! This module provides the event-time windowing used for daily aggregation.
//!
//! # Tumbling Windows
//!
//! Fixed-size, non-overlapping windows aligned to the epoch. Each event
//! belongs to exactly one window.
//!
//! ```text
//! Time:     day1-----day2-----day3-----day4
//! Windows:  [-------)[-------)[-------)
//! ```
//!
//! # Window Triggers
//!
//! [`OnWatermarkTrigger`] fires a window once the watermark reaches its end.
//! At shutdown a still-open window is purged, or fired when the pipeline is
//! configured to flush.
//!
//! # Example Usage
//!
//! ```rust
//! use processor::window::{
//!     OnWatermarkTrigger, TriggerResult, TumblingWindowAssigner, WindowTrigger,
//! };
//! use processor::watermark::Watermark;
//! use chrono::{TimeZone, Utc};
//!
//! let assigner = TumblingWindowAssigner::daily();
//! let window = assigner.assign(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap());
//!
//! let trigger = OnWatermarkTrigger::new();
//! let watermark = Watermark::from_datetime(window.end());
//! assert_eq!(trigger.on_watermark(&window, watermark), TriggerResult::FireAndPurge);
//! ```

pub mod assigner;
pub mod trigger;
pub mod types;

pub use assigner::{TumblingWindowAssigner, WindowAssigner};
pub use trigger::{OnWatermarkTrigger, TriggerResult, WindowTrigger};
pub use types::{Window, WindowBounds};
