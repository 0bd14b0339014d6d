//! Heat pattern matching over closed daily windows
//!
//! A warning is raised when one station produces two daily maxima at or above
//! the threshold whose windows end no more than the configured bound apart.
//! Deadlines are checked on watermark progress, never on wall-clock time.

mod matcher;
mod state;

pub use matcher::PatternMatcher;
pub use state::{PartialMatch, PatternState};
