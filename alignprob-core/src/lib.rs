//! alignprob Core Library
//!
//! Calibrated classification of alignment placements as true, false or invalid
//! from their aligned length and score, plus posterior aggregation over the
//! alternative placements of a read.

pub mod types;
pub mod io;
pub mod negbin;
pub mod model;
pub mod posterior;

// Re-export commonly used types and functions
pub use types::{AlignedLength, AlignmentClass, CalibrationRow, RowError, Score, TableSummary};
pub use io::{CalibrationParser, CalibrationTable, LoadError};
pub use negbin::{NegativeBinomial, ParamError};
pub use model::ScoreModel;
pub use posterior::{PosteriorAggregator, PosteriorError, PosteriorResult};

/// Version information for the alignprob core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
