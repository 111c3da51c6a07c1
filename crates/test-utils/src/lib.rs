//! Shared test utilities for the smio workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Temporary fixture directories
//! - NetCDF cell, grid and ISMN station fixture writers
//! - Deterministic soil-moisture series generators
//! - Approximate-equality assertions
//! - Log capture for tests
//!
//! # Usage
//!
//! ```ignore
//! use test_utils::{temp_test_dir, write_testdata};
//!
//! let dir = temp_test_dir();
//! let data = write_testdata(dir.path()).unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Element-wise approximate equality of two float slices; `NaN` equals `NaN`.
#[macro_export]
macro_rules! assert_series_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: &[f64] = &$left;
        let right: &[f64] = &$right;
        assert_eq!(left.len(), right.len(), "series lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if l.is_nan() && r.is_nan() {
                continue;
            }
            if (l - r).abs() > $epsilon as f64 {
                panic!(
                    "assertion failed at index {}: `{:?}` != `{:?}` (epsilon {:?})",
                    i, l, r, $epsilon
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_series_approx_eq_treats_nan_as_equal() {
        assert_series_approx_eq!(vec![1.0, f64::NAN], vec![1.0000001, f64::NAN], 1e-6);
    }

    #[test]
    fn test_write_testdata_layout() {
        let dir = crate::temp_test_dir();
        let data = crate::write_testdata(dir.path()).unwrap();
        assert!(data.cci_dir.join("grid.nc").exists());
        assert!(data.cci_dir.join("1431.nc").exists());
        assert!(data.cci_dir.join("2244.nc").exists());
        assert!(data.c3s_dir.join("1431.nc").exists());
        assert!(data
            .ismn_dir
            .join("SCAN")
            .join("SilverSword")
            .is_dir());
        assert_eq!(data.cci_points_in_cell(2244).len(), 3);
    }
}
