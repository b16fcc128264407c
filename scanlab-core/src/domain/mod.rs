//! Domain types for ScanLab

pub mod bar;
pub mod range;

pub use bar::{normalize_rows, Bar};
pub use range::{default_ranges, Interval, RangeSpec};

