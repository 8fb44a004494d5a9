//! Segment and label statistics.
//!
//! - [`variables`]: the exported variables, [`LabelStats`] and [`TimeUnit`].
//! - [`gev`]: the cross-condition GEV denominator (phase 1).
//! - [`aggregate`]: per-file, per-label tables (phase 2).
//!
//! Values that cannot be computed for a label (it never occurs, or the
//! file has no labeled sample) are `None`, never `0.0`; only sample and
//! segment counts are plain numbers.

pub mod aggregate;
pub mod gev;
pub mod variables;

pub use aggregate::{duration_histogram, file_statistics, geometric_mean, FileStatistics};
pub use gev::GevDenominator;
pub use variables::{LabelStats, TimeUnit, Variable};
