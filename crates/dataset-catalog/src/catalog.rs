//! Dataset identifiers and reader bindings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use cell_io::{CellLayout, FilenameTemplate};
use serde::{Deserialize, Serialize};
use smio_common::{SmioError, SmioResult, DEFAULT_CELL_SIZE};
use tracing::{debug, info};

use crate::paths::PathConfig;

/// Ordered tuple of tags, e.g. `("ESA_CCI_SM", "v061", "COMBINED")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Vec<String>);

impl DatasetId {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    /// Parse `"FAMILY/version/product"`.
    pub fn parse(s: &str) -> Self {
        Self::new(s.split('/').map(str::trim).filter(|t| !t.is_empty()))
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    /// First tag.
    pub fn family(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Which reader serves a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReaderKind {
    /// Cell files on a grid.
    #[default]
    Gridded,
    /// Station files.
    Insitu,
}

/// Where a gridded dataset's grid comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridDefinition {
    /// A grid file inside the dataset directory.
    File { name: String },
    /// Regular global lon/lat grid.
    Regular { resolution: f64 },
}

impl Default for GridDefinition {
    fn default() -> Self {
        GridDefinition::File {
            name: "grid.nc".to_string(),
        }
    }
}

/// Everything a reader needs to know about one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBinding {
    pub id: DatasetId,
    #[serde(default)]
    pub reader: ReaderKind,
    #[serde(default)]
    pub layout: CellLayout,
    /// Variables read when the caller does not name any.
    pub parameters: Vec<String>,
    /// Per-variable fill values overriding the file's `_FillValue`.
    #[serde(default)]
    pub fill_values: BTreeMap<String, f64>,
    /// Per-variable unit factors applied after decoding.
    #[serde(default)]
    pub scale_factors: BTreeMap<String, f64>,
    /// Column holding exact observation times, if the product has one.
    #[serde(default)]
    pub t0_column: Option<String>,
    #[serde(default = "default_t0_units")]
    pub t0_units: String,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    #[serde(default)]
    pub grid: GridDefinition,
    #[serde(default)]
    pub filename: FilenameTemplate,
    pub paths: PathConfig,
}

fn default_t0_units() -> String {
    "days since 1970-01-01 00:00:00".to_string()
}

fn default_cell_size() -> f64 {
    DEFAULT_CELL_SIZE
}

impl DatasetBinding {
    /// Gridded binding with defaults for everything but id, parameters and paths.
    pub fn gridded(id: DatasetId, parameters: &[&str], paths: PathConfig) -> Self {
        Self {
            id,
            reader: ReaderKind::Gridded,
            layout: CellLayout::OrthoMulti,
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            fill_values: BTreeMap::new(),
            scale_factors: BTreeMap::new(),
            t0_column: None,
            t0_units: default_t0_units(),
            cell_size: DEFAULT_CELL_SIZE,
            grid: GridDefinition::default(),
            filename: FilenameTemplate::default(),
            paths,
        }
    }

    pub fn with_layout(mut self, layout: CellLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_reader(mut self, reader: ReaderKind) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_fill_value(mut self, variable: &str, fill: f64) -> Self {
        self.fill_values.insert(variable.to_string(), fill);
        self
    }

    pub fn with_scale_factor(mut self, variable: &str, factor: f64) -> Self {
        self.scale_factors.insert(variable.to_string(), factor);
        self
    }

    pub fn with_t0(mut self, column: &str) -> Self {
        self.t0_column = Some(column.to_string());
        self
    }

    pub fn with_grid(mut self, grid: GridDefinition) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_filename(mut self, filename: FilenameTemplate) -> Self {
        self.filename = filename;
        self
    }

    /// Validate the binding.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("dataset id must have at least one tag".to_string());
        }
        if self.paths.is_empty() {
            return Err(format!("{}: no path groups configured", self.id));
        }
        if self.parameters.is_empty() {
            return Err(format!("{}: no default parameters", self.id));
        }
        if self.reader == ReaderKind::Gridded {
            if self.cell_size <= 0.0 || (180.0 / self.cell_size).fract().abs() > 1e-9 {
                return Err(format!(
                    "{}: cell_size {} must evenly divide 180",
                    self.id, self.cell_size
                ));
            }
            if let GridDefinition::Regular { resolution } = self.grid {
                if resolution <= 0.0 {
                    return Err(format!("{}: grid resolution must be > 0", self.id));
                }
            }
        }
        Ok(())
    }
}

/// Registry of dataset bindings and their path configurations.
///
/// The path table and the bindings are kept separately so a family of
/// bindings can be checked against the ids the path table declares.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    paths: BTreeMap<DatasetId, PathConfig>,
    bindings: BTreeMap<DatasetId, DatasetBinding>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in, process-wide catalog.
    pub fn builtin() -> &'static Catalog {
        &crate::datasets::BUILTIN
    }

    /// Add (or replace) a binding and its path configuration.
    pub fn with_entry(mut self, binding: DatasetBinding) -> Self {
        self.insert(binding);
        self
    }

    pub fn insert(&mut self, binding: DatasetBinding) {
        debug!(dataset = %binding.id, "Registering dataset binding");
        self.paths.insert(binding.id.clone(), binding.paths.clone());
        self.bindings.insert(binding.id.clone(), binding);
    }

    /// Add a path configuration without a binding.
    pub fn with_paths(mut self, id: DatasetId, paths: PathConfig) -> Self {
        self.paths.insert(id, paths);
        self
    }

    /// Binding for `id`; unknown ids are a configuration error.
    pub fn lookup(&self, id: &DatasetId) -> SmioResult<&DatasetBinding> {
        self.bindings.get(id).ok_or_else(|| {
            SmioError::configuration(format!("dataset {} is not in the catalog", id))
        })
    }

    pub fn path_config(&self, id: &DatasetId) -> SmioResult<&PathConfig> {
        self.paths.get(id).ok_or_else(|| {
            SmioError::configuration(format!("no path configuration for dataset {}", id))
        })
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.bindings.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&DatasetId> {
        self.bindings.keys().collect()
    }

    pub fn families(&self) -> BTreeSet<&str> {
        self.bindings.keys().map(DatasetId::family).collect()
    }

    pub fn family_ids(&self, family: &str) -> Vec<&DatasetId> {
        self.bindings
            .keys()
            .filter(|id| id.family() == family)
            .collect()
    }

    /// Check that the ids bound for `family` are exactly the ids the path
    /// table declares for it, and that each binding carries its table entry.
    pub fn validate_bindings(&self, family: &str) -> SmioResult<()> {
        let bound: BTreeSet<&DatasetId> = self.family_ids(family).into_iter().collect();
        let declared: BTreeSet<&DatasetId> =
            self.paths.keys().filter(|id| id.family() == family).collect();

        if bound != declared {
            let unbound: Vec<String> = declared.difference(&bound).map(|i| i.to_string()).collect();
            let unpathed: Vec<String> = bound.difference(&declared).map(|i| i.to_string()).collect();
            return Err(SmioError::configuration(format!(
                "family {}: ids without binding {:?}, ids without paths {:?}",
                family, unbound, unpathed
            )));
        }

        for id in bound {
            let binding = self.lookup(id)?;
            if self.paths.get(id) != Some(&binding.paths) {
                return Err(SmioError::configuration(format!(
                    "{}: binding paths differ from the path table",
                    id
                )));
            }
            binding.validate().map_err(SmioError::configuration)?;
        }
        Ok(())
    }

    /// Validate every family.
    pub fn validate(&self) -> SmioResult<()> {
        let families: BTreeSet<&str> = self
            .paths
            .keys()
            .map(DatasetId::family)
            .chain(self.families())
            .collect();
        for family in families {
            self.validate_bindings(family)?;
        }
        Ok(())
    }

    /// Add bindings from a YAML list of [`DatasetBinding`] records.
    pub fn extend_from_yaml_str(&mut self, yaml: &str) -> SmioResult<usize> {
        let bindings: Vec<DatasetBinding> = serde_yaml::from_str(yaml)
            .map_err(|e| SmioError::configuration(format!("invalid catalog YAML: {}", e)))?;
        let count = bindings.len();
        for binding in bindings {
            binding.validate().map_err(SmioError::configuration)?;
            self.insert(binding);
        }
        info!(datasets = count, "Extended catalog from YAML");
        Ok(count)
    }

    pub fn extend_from_yaml_file(&mut self, path: &Path) -> SmioResult<usize> {
        let contents = std::fs::read_to_string(path)?;
        self.extend_from_yaml_str(&contents)
    }
}
