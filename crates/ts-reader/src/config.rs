//! Reader configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use cell_io::{CellLayout, FilenameTemplate, DEFAULT_CACHE_CELLS};
use dataset_catalog::DatasetBinding;
use serde::{Deserialize, Serialize};
use smio_common::DateRange;

/// Units of `t0` columns when neither the binding nor the caller says otherwise.
pub const DEFAULT_T0_UNITS: &str = "days since 1970-01-01 00:00:00";

/// Settings of a gridded or in-situ reader.
///
/// Fields left empty are filled from the dataset binding by
/// [`ReaderConfig::merged_with`]; explicitly set fields win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Variables to read. Empty means the binding's defaults.
    pub parameters: Vec<String>,

    /// Expected on-disk layout; a cell in another layout is corrupt.
    pub layout: Option<CellLayout>,

    /// Keep already-read cells in memory.
    pub read_bulk: bool,

    /// Number of cells kept when `read_bulk` is on.
    pub cache_capacity: usize,

    /// Replace the nominal index with the exact observation times.
    pub exact_index: bool,

    /// Column holding exact observation times.
    pub t0_column: Option<String>,

    /// Units of the `t0` column.
    pub t0_units: Option<String>,

    /// Restrict every returned frame to this closed interval.
    pub clip_dates: Option<DateRange>,

    /// Maximum distance for nearest grid point or station lookups, in metres.
    pub max_dist_m: Option<f64>,

    /// Per-variable fill values overriding the file's `_FillValue`.
    pub fill_overrides: BTreeMap<String, f64>,

    /// Per-variable factors applied after decoding.
    pub scale_factors: BTreeMap<String, f64>,

    /// Cell file naming, if it differs from the binding's.
    pub filename: Option<FilenameTemplate>,

    /// Only try this path group when resolving the dataset directory.
    pub force_path_group: Option<String>,

    /// Replacement for `{testdata}` in path configurations.
    pub testdata_dir: Option<PathBuf>,

    /// Rebuild the in-situ station index even if one exists.
    pub rebuild_index: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            layout: None,
            read_bulk: false,
            cache_capacity: DEFAULT_CACHE_CELLS,
            exact_index: false,
            t0_column: None,
            t0_units: None,
            clip_dates: None,
            max_dist_m: None,
            fill_overrides: BTreeMap::new(),
            scale_factors: BTreeMap::new(),
            filename: None,
            force_path_group: None,
            testdata_dir: None,
            rebuild_index: false,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SMIO_CELL_CACHE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.cache_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("SMIO_READ_BULK") {
            config.read_bulk = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("SMIO_FORCE_PATH_GROUP") {
            if !val.is_empty() {
                config.force_path_group = Some(val);
            }
        }

        if let Ok(val) = std::env::var("SMIO_TESTDATA_DIR") {
            if !val.is_empty() {
                config.testdata_dir = Some(PathBuf::from(val));
            }
        }

        config
    }

    pub fn with_parameters<S: AsRef<str>>(mut self, parameters: &[S]) -> Self {
        self.parameters = parameters.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn with_read_bulk(mut self, read_bulk: bool) -> Self {
        self.read_bulk = read_bulk;
        self
    }

    pub fn with_exact_index(mut self, exact_index: bool) -> Self {
        self.exact_index = exact_index;
        self
    }

    pub fn with_clip_dates(mut self, range: DateRange) -> Self {
        self.clip_dates = Some(range);
        self
    }

    pub fn with_testdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.testdata_dir = Some(dir.into());
        self
    }

    pub fn with_force_path_group(mut self, group: impl Into<String>) -> Self {
        self.force_path_group = Some(group.into());
        self
    }

    /// Fill unset fields from a dataset binding.
    pub fn merged_with(&self, binding: &DatasetBinding) -> Self {
        let mut merged = self.clone();
        if merged.parameters.is_empty() {
            merged.parameters = binding.parameters.clone();
        }
        if merged.layout.is_none() {
            merged.layout = Some(binding.layout);
        }
        if merged.t0_column.is_none() {
            merged.t0_column = binding.t0_column.clone();
        }
        if merged.t0_units.is_none() {
            merged.t0_units = Some(binding.t0_units.clone());
        }
        if merged.filename.is_none() {
            merged.filename = Some(binding.filename.clone());
        }
        for (name, fill) in &binding.fill_values {
            merged.fill_overrides.entry(name.clone()).or_insert(*fill);
        }
        for (name, factor) in &binding.scale_factors {
            merged.scale_factors.entry(name.clone()).or_insert(*factor);
        }
        merged
    }

    /// Units used to decode the `t0` column.
    pub fn t0_units(&self) -> &str {
        self.t0_units.as_deref().unwrap_or(DEFAULT_T0_UNITS)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_bulk && self.cache_capacity == 0 {
            return Err("cache_capacity must be > 0 when read_bulk is set".to_string());
        }

        if self.exact_index && self.t0_column.is_none() {
            return Err("exact_index requires a t0_column".to_string());
        }

        if let Some(range) = &self.clip_dates {
            if range.start > range.end {
                return Err(format!(
                    "clip_dates start {} is after end {}",
                    range.start, range.end
                ));
            }
        }

        if let Some(dist) = self.max_dist_m {
            if !(dist > 0.0) {
                return Err("max_dist_m must be > 0".to_string());
            }
        }

        for (name, factor) in &self.scale_factors {
            if !factor.is_finite() {
                return Err(format!("scale factor of '{}' is not finite", name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset_catalog::{DatasetId, PathConfig, PathGroup};

    fn binding() -> DatasetBinding {
        DatasetBinding::gridded(
            DatasetId::new(["X", "v1"]),
            &["sm", "flag"],
            PathConfig::default().group(PathGroup::everywhere("local", "/data")),
        )
        .with_fill_value("sm", -9999.0)
        .with_scale_factor("sm", 100.0)
        .with_t0("t0")
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReaderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_explicit_settings() {
        let mut config = ReaderConfig::default().with_parameters(&["sm"]);
        config.fill_overrides.insert("sm".to_string(), -1.0);

        let merged = config.merged_with(&binding());
        assert_eq!(merged.parameters, vec!["sm".to_string()]);
        assert_eq!(merged.fill_overrides.get("sm"), Some(&-1.0));
        assert_eq!(merged.scale_factors.get("sm"), Some(&100.0));
        assert_eq!(merged.t0_column.as_deref(), Some("t0"));
        assert_eq!(merged.t0_units(), DEFAULT_T0_UNITS);
        assert_eq!(merged.layout, Some(CellLayout::OrthoMulti));
    }

    #[test]
    fn test_merge_uses_binding_parameters() {
        let merged = ReaderConfig::default().merged_with(&binding());
        assert_eq!(merged.parameters, vec!["sm".to_string(), "flag".to_string()]);
    }

    #[test]
    fn test_validation() {
        let config = ReaderConfig::default().with_exact_index(true);
        assert!(config.validate().is_err());

        let mut config = ReaderConfig::default().with_read_bulk(true);
        config.cache_capacity = 0;
        assert!(config.validate().is_err());

        let config = ReaderConfig {
            max_dist_m: Some(-5.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ReaderConfig =
            serde_json::from_str(r#"{"read_bulk": true, "parameters": ["sm"]}"#).unwrap();
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CELLS);
        assert!(config.read_bulk);
        assert!(config.fill_overrides.is_empty());
    }
}
