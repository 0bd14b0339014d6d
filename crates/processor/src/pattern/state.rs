//! Per-station pattern state

use chrono::{DateTime, Utc};
use heatwatch_types::AggregatedRecord;
use serde::{Deserialize, Serialize};

/// A pattern waiting for its second qualifying record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialMatch {
    /// Number of pattern elements matched so far
    pub step_index: usize,
    pub first_event: AggregatedRecord,
    /// End of the first event's window
    pub start_time: DateTime<Utc>,
    /// Latest window end a second record may have
    pub deadline: DateTime<Utc>,
}

impl PartialMatch {
    pub fn new(first_event: AggregatedRecord, bound: chrono::Duration) -> Self {
        let start_time = first_event.window_end();
        Self {
            step_index: 1,
            first_event,
            start_time,
            deadline: start_time + bound,
        }
    }

    /// Whether a record closing at `window_end` can still complete the match
    pub fn accepts(&self, window_end: DateTime<Utc>) -> bool {
        window_end <= self.deadline
    }

    /// Whether the watermark rules out any completing record
    ///
    /// Records are only produced for windows the watermark has closed, so once
    /// the watermark reaches the deadline no record with a window end at or
    /// before it can still arrive.
    pub fn is_expired(&self, watermark: DateTime<Utc>) -> bool {
        self.deadline <= watermark
    }
}

/// State machine position of one station
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PatternState {
    #[default]
    Idle,
    Armed(PartialMatch),
}

impl PatternState {
    pub fn is_armed(&self) -> bool {
        matches!(self, PatternState::Armed(_))
    }

    pub fn partial(&self) -> Option<&PartialMatch> {
        match self {
            PatternState::Armed(partial) => Some(partial),
            PatternState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use heatwatch_types::WindowKey;

    fn record(day: u32) -> AggregatedRecord {
        let start = Utc.with_ymd_and_hms(2024, 7, day, 0, 0, 0).unwrap();
        let key = WindowKey::new("S1", start, start + Duration::days(1)).unwrap();
        AggregatedRecord::new(key, 39.0, start)
    }

    #[test]
    fn test_deadline_is_window_end_plus_bound() {
        let partial = PartialMatch::new(record(1), Duration::days(2));
        assert_eq!(partial.step_index, 1);
        assert_eq!(partial.start_time, Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap());
        assert_eq!(partial.deadline, Utc.with_ymd_and_hms(2024, 7, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_accepts_inclusive_deadline() {
        let partial = PartialMatch::new(record(1), Duration::days(2));
        assert!(partial.accepts(record(3).window_end()));
        assert!(!partial.accepts(record(4).window_end()));
    }

    #[test]
    fn test_expiry() {
        let partial = PartialMatch::new(record(1), Duration::days(2));
        assert!(!partial.is_expired(Utc.with_ymd_and_hms(2024, 7, 3, 23, 0, 0).unwrap()));
        assert!(partial.is_expired(Utc.with_ymd_and_hms(2024, 7, 4, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_state_default_idle() {
        let state = PatternState::default();
        assert!(!state.is_armed());
        assert!(state.partial().is_none());
    }
}
