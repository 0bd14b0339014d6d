//! Aggregation module for computing window results over streaming data
//!
//! Aggregators follow one incremental interface ([`Aggregator`]):
//!
//! - **Incremental updates**: Feed values one at a time
//! - **Accumulator merging**: Combine partial results of the same window
//! - **State serialization**: Persist and restore aggregator state
//!
//! [`MaxByAggregator`] keeps the observation holding the maximum temperature,
//! and [`KeyedWindowAggregator`] runs one of them per station and tumbling
//! window, emitting each window once the watermark closes it.
//!
//! # Example
//!
//! ```rust
//! use processor::aggregation::KeyedWindowAggregator;
//! use processor::watermark::Watermark;
//! use heatwatch_types::Observation;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let mut agg = KeyedWindowAggregator::new(Duration::days(1)).unwrap();
//! let noon = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
//! agg.ingest(&Observation::new("S1", noon, Some(40.0)).unwrap()).unwrap();
//!
//! let midnight = Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap();
//! let records = agg.on_watermark(Watermark::from_datetime(midnight)).unwrap();
//! assert_eq!(records[0].max_temperature, 40.0);
//! ```

// Re-name to avoid collision with trait
mod trait_;

mod keyed;
mod maxby;

pub use keyed::{IngestOutcome, KeyedWindowAggregator};
pub use maxby::{MaxBy, MaxByAccumulator, MaxByAggregator};
pub use trait_::Aggregator;
