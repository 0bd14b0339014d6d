use super::trait_::Aggregator;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use heatwatch_types::Observation;
use serde::{Deserialize, Serialize};

/// The maximum reading of a window and the time it was first reached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxBy {
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

/// Accumulator for max-by aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaxByAccumulator {
    max: Option<MaxBy>,
    count: u64,
}

/// Max-by aggregator - tracks the observation holding the maximum temperature
///
/// Only a strictly greater temperature replaces the current maximum, so on
/// ties the first observation to reach the value is kept.
///
/// # Examples
///
/// ```
/// use processor::aggregation::{Aggregator, MaxByAggregator};
/// use heatwatch_types::Observation;
/// use chrono::{TimeZone, Utc};
///
/// let first = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
/// let later = Utc.with_ymd_and_hms(2024, 7, 1, 14, 0, 0).unwrap();
///
/// let mut agg = MaxByAggregator::new();
/// agg.update(Observation::new("S1", first, Some(39.0)).unwrap()).unwrap();
/// agg.update(Observation::new("S1", later, Some(39.0)).unwrap()).unwrap();
///
/// let max = agg.finalize().unwrap();
/// assert_eq!(max.temperature, 39.0);
/// assert_eq!(max.timestamp, first);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MaxByAggregator {
    max: Option<MaxBy>,
    count: u64,
}

impl MaxByAggregator {
    /// Create a new max-by aggregator
    pub fn new() -> Self {
        Self { max: None, count: 0 }
    }

    /// Get the current maximum
    pub fn max(&self) -> Option<MaxBy> {
        self.max
    }
}

impl Aggregator for MaxByAggregator {
    type Input = Observation;
    type Output = MaxBy;
    type Accumulator = MaxByAccumulator;

    fn new() -> Self {
        Self::new()
    }

    fn update(&mut self, value: Observation) -> anyhow::Result<()> {
        let temperature = value
            .temperature()
            .ok_or_else(|| anyhow!("Observation {} has no temperature", value))?;
        if temperature.is_nan() {
            return Err(anyhow!("Observation {} has a NaN temperature", value));
        }

        let candidate = MaxBy {
            temperature,
            timestamp: value.timestamp(),
        };
        self.max = match self.max {
            Some(current) if temperature > current.temperature => Some(candidate),
            Some(current) => Some(current),
            None => Some(candidate),
        };
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<MaxBy> {
        self.max
            .ok_or_else(|| anyhow!("Cannot compute maximum of zero values"))
    }

    fn accumulator(&self) -> MaxByAccumulator {
        MaxByAccumulator {
            max: self.max,
            count: self.count,
        }
    }

    fn merge(&mut self, other: MaxByAccumulator) -> anyhow::Result<()> {
        // Equal maxima keep the earlier event time.
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => {
                if b.temperature > a.temperature
                    || (b.temperature == a.temperature && b.timestamp < a.timestamp)
                {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        self.count += other.count;
        Ok(())
    }

    fn reset(&mut self) {
        self.max = None;
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn obs(hour: u32, temperature: Option<f64>) -> Observation {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap();
        Observation::new("S1", ts, temperature).unwrap()
    }

    #[test]
    fn test_max_by_tracks_maximum() {
        let mut agg = MaxByAggregator::new();
        agg.update_batch(&[obs(1, Some(20.0)), obs(2, Some(35.5)), obs(3, Some(30.0))])
            .unwrap();

        let max = agg.finalize().unwrap();
        assert_eq!(max.temperature, 35.5);
        assert_eq!(max.timestamp, obs(2, None).timestamp());
        assert_eq!(agg.count(), 3);
    }

    #[test]
    fn test_max_by_first_reach_wins_ties() {
        let mut agg = MaxByAggregator::new();
        agg.update(obs(5, Some(38.0))).unwrap();
        agg.update(obs(6, Some(38.0))).unwrap();
        assert_eq!(agg.finalize().unwrap().timestamp, obs(5, None).timestamp());
    }

    #[test]
    fn test_max_by_rejects_missing_temperature() {
        let mut agg = MaxByAggregator::new();
        assert!(agg.update(obs(1, None)).is_err());
        assert!(agg.is_empty());
        assert!(agg.finalize().is_err());
    }

    #[test]
    fn test_max_by_merge_prefers_earlier_on_tie() {
        let mut a = MaxByAggregator::new();
        a.update(obs(10, Some(40.0))).unwrap();

        let mut b = MaxByAggregator::new();
        b.update(obs(3, Some(40.0))).unwrap();

        a.merge(b.accumulator()).unwrap();
        let max = a.finalize().unwrap();
        assert_eq!(max.timestamp, obs(10, None).timestamp() - Duration::hours(7));
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn test_max_by_reset() {
        let mut agg = MaxByAggregator::new();
        agg.update(obs(1, Some(10.0))).unwrap();
        agg.reset();
        assert!(agg.is_empty());
        assert_eq!(agg.max(), None);
    }
}
