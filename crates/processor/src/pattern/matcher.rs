//! Bounded two-step heat pattern detection

use super::state::{PartialMatch, PatternState};
use crate::config::PatternConfig;
use crate::error::PatternError;
use crate::watermark::Watermark;
use chrono::Duration;
use heatwatch_types::{AggregatedRecord, WarningEvent};
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// Detects two qualifying daily maxima of one station within a time bound
///
/// Each station moves between [`PatternState::Idle`] and
/// [`PatternState::Armed`]. Matches do not overlap: the record completing a
/// match is not reused as the first element of the next one.
#[derive(Debug)]
pub struct PatternMatcher {
    threshold: f64,
    bound: Duration,
    /// Armed stations only; absent means idle
    partials: HashMap<String, PartialMatch>,
}

impl PatternMatcher {
    pub fn new(threshold: f64, bound: Duration) -> Result<Self, PatternError> {
        if !threshold.is_finite() {
            return Err(PatternError::InvalidThreshold { threshold });
        }
        if bound <= Duration::zero() {
            return Err(PatternError::InvalidBound {
                bound_ms: bound.num_milliseconds().max(0) as u64,
            });
        }
        Ok(Self {
            threshold,
            bound,
            partials: HashMap::new(),
        })
    }

    pub fn from_config(config: &PatternConfig) -> Result<Self, PatternError> {
        let bound = Duration::from_std(config.bound())
            .map_err(|_| PatternError::InvalidBound { bound_ms: config.bound_ms })?;
        Self::new(config.threshold_celsius, bound)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn qualifies(&self, record: &AggregatedRecord) -> bool {
        record.max_temperature >= self.threshold
    }

    /// Feed one closed window record
    ///
    /// Returns a warning when the record completes a pending match.
    pub fn on_record(&mut self, record: &AggregatedRecord) -> Option<WarningEvent> {
        let qualifies = self.qualifies(record);

        match self.partials.remove(&record.station) {
            None => {
                if qualifies {
                    trace!(station = %record.station, window = %record.window_key, "Pattern armed");
                    self.arm(record);
                }
                None
            }
            Some(_) if !qualifies => {
                debug!(
                    station = %record.station,
                    max_temperature = record.max_temperature,
                    "Non-qualifying record, discarding partial match"
                );
                None
            }
            Some(partial) if partial.accepts(record.window_end()) => {
                let warning =
                    WarningEvent::from_match(self.threshold, &partial.first_event, record);
                info!(station = %warning.station, message = %warning.message, "Heat warning");
                Some(warning)
            }
            Some(stale) => {
                debug!(
                    station = %record.station,
                    deadline = %stale.deadline,
                    "Partial match out of bound, re-arming"
                );
                self.arm(record);
                None
            }
        }
    }

    /// Discard partial matches that can no longer complete
    ///
    /// Must run after every record closed by the same watermark has been fed
    /// through [`on_record`](Self::on_record). Returns the number expired.
    pub fn on_watermark(&mut self, watermark: Watermark) -> usize {
        let Some(now) = watermark.to_datetime() else {
            return 0;
        };
        let before = self.partials.len();
        self.partials.retain(|station, partial| {
            let expired = partial.is_expired(now);
            if expired {
                debug!(station = %station, deadline = %partial.deadline, "Partial match expired");
            }
            !expired
        });
        before - self.partials.len()
    }

    /// Discard every partial match; incomplete patterns are never emitted
    pub fn drain(&mut self) -> usize {
        let discarded = self.partials.len();
        self.partials.clear();
        if discarded > 0 {
            debug!(discarded = discarded, "Drained pattern matcher");
        }
        discarded
    }

    /// State of one station
    pub fn state(&self, station: &str) -> PatternState {
        self.partials
            .get(station)
            .cloned()
            .map(PatternState::Armed)
            .unwrap_or_default()
    }

    /// Number of stations holding a partial match
    pub fn partial_matches(&self) -> usize {
        self.partials.len()
    }

    fn arm(&mut self, record: &AggregatedRecord) {
        self.partials.insert(
            record.station.clone(),
            PartialMatch::new(record.clone(), self.bound),
        );
    }
}
