//! File format I/O modules for alignprob
//!
//! Only the calibration table is read here; alignment records themselves are
//! parsed by the caller.

pub mod calibration;

pub use calibration::{CalibrationParser, CalibrationTable, LoadError, FORMAT_VERSION};
