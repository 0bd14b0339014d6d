//! Window triggers
//!
//! This module decides when a window is evaluated and its result emitted.
//! Event-time windows fire on watermark progress only, never on wall-clock
//! timers, which keeps the pipeline deterministic for a given input.

use super::types::Window;
use crate::watermark::Watermark;
use std::fmt;

/// Result of trigger evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    /// Continue processing, don't fire
    Continue,
    /// Fire the window and purge its state
    FireAndPurge,
    /// Purge the window without firing
    Purge,
}

/// Trait for window triggers
pub trait WindowTrigger: Send + Sync + fmt::Debug {
    /// Evaluate when the watermark advances
    fn on_watermark(&self, window: &Window, watermark: Watermark) -> TriggerResult;

    /// Evaluate when the pipeline shuts down with the window still open
    fn on_shutdown(&self, window: &Window, flush: bool) -> TriggerResult {
        let _ = window;
        if flush {
            TriggerResult::FireAndPurge
        } else {
            TriggerResult::Purge
        }
    }
}

/// Trigger that fires when the watermark reaches the end of the window
///
/// This is the standard trigger for event-time windows. Once the watermark
/// reaches the (exclusive) window end, no further event for the window can be
/// accepted, so the window is emitted exactly once and its state discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnWatermarkTrigger;

impl OnWatermarkTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl WindowTrigger for OnWatermarkTrigger {
    fn on_watermark(&self, window: &Window, watermark: Watermark) -> TriggerResult {
        if watermark.has_reached(window.end()) {
            TriggerResult::FireAndPurge
        } else {
            TriggerResult::Continue
        }
    }
}
