//! Facade configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use dataset_catalog::{DatasetId, ReaderKind};
use serde::{Deserialize, Serialize};
use smio_common::{SmioError, SmioResult};
use ts_adapters::{AdapterDescriptor, CombineFunc};
use ts_reader::{ReadMethod, ReadOptions, ReaderConfig};

use crate::nans::NanPolicy;
use crate::resample::ResampleRule;

/// How to resample the final frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Bin rule, e.g. `"10D"`, `"W"`, `"MS"`.
    pub rule: String,
    /// Reducer applied to the present values of each bin.
    pub method: CombineFunc,
}

impl ResampleConfig {
    pub fn new(rule: impl Into<String>, method: CombineFunc) -> Self {
        Self {
            rule: rule.into(),
            method,
        }
    }
}

/// Everything a [`ReaderFacade`](crate::ReaderFacade) needs.
///
/// ```yaml
/// dataset: ESA_CCI_SM/v061/COMBINED
/// reader:
///   parameters: [sm, flag]
/// adapters:
///   01-mask: {kind: self_mask, column: flag, op: "==", threshold: 0}
/// resample: {rule: 10D, method: mean}
/// params_rename: {sm: esa_cci_sm}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Catalogued dataset to open. Not needed when a reader is supplied.
    #[serde(with = "dataset_id_opt")]
    pub dataset: Option<DatasetId>,

    /// Settings passed to the reader.
    pub reader: ReaderConfig,

    /// Expected reader kind; opening a dataset of another kind fails.
    pub reader_kind: Option<ReaderKind>,

    /// Reader entry point used by `read`.
    pub read_method: ReadMethod,

    /// Extra arguments for `read_method`.
    pub read_options: ReadOptions,

    /// Adapters by name, applied in name order.
    pub adapters: BTreeMap<String, AdapterDescriptor>,

    /// Values to turn into absent values after adapters ran.
    pub remove_nans: Option<NanPolicy>,

    /// Months (1-12) to keep.
    pub filter_months: Option<BTreeSet<u32>>,

    /// Drop rows outside `filter_months` instead of blanking them.
    pub drop_filtered_months: bool,

    pub resample: Option<ResampleConfig>,

    /// Final column renames.
    pub params_rename: BTreeMap<String, String>,

    /// Only try this path group; overrides the reader setting.
    pub force_path_group: Option<String>,
}

impl FacadeConfig {
    pub fn for_dataset(id: DatasetId) -> Self {
        Self {
            dataset: Some(id),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> SmioResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SmioError::configuration(format!("invalid facade YAML: {}", e)))?;
        config.validate().map_err(SmioError::configuration)?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> SmioResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn with_reader(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_read_method(mut self, method: ReadMethod) -> Self {
        self.read_method = method;
        self
    }

    pub fn with_adapter(mut self, name: impl Into<String>, descriptor: AdapterDescriptor) -> Self {
        self.adapters.insert(name.into(), descriptor);
        self
    }

    pub fn with_remove_nans(mut self, policy: NanPolicy) -> Self {
        self.remove_nans = Some(policy);
        self
    }

    pub fn with_filter_months(mut self, months: &[u32], drop: bool) -> Self {
        self.filter_months = Some(months.iter().copied().collect());
        self.drop_filtered_months = drop;
        self
    }

    pub fn with_resample(mut self, rule: impl Into<String>, method: CombineFunc) -> Self {
        self.resample = Some(ResampleConfig::new(rule, method));
        self
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.params_rename.insert(from.into(), to.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.dataset {
            if id.is_empty() {
                return Err("dataset id must have at least one tag".to_string());
            }
        }

        for (name, descriptor) in &self.adapters {
            descriptor
                .validate()
                .map_err(|e| format!("adapter '{}': {}", name, e))?;
        }

        if let Some(months) = &self.filter_months {
            if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
                return Err(format!("filter_months contains {}, expected 1-12", bad));
            }
        }

        if let Some(rs) = &self.resample {
            ResampleRule::parse(&rs.rule)?;
        }

        let targets: BTreeSet<&String> = self.params_rename.values().collect();
        if targets.len() != self.params_rename.len() {
            return Err("params_rename maps two columns to the same name".to_string());
        }

        if self.reader.cache_capacity == 0 && self.reader.read_bulk {
            return Err("reader.cache_capacity must be > 0 when read_bulk is on".to_string());
        }

        Ok(())
    }
}

/// Dataset ids in YAML are written `FAMILY/version/product` or as a tag list.
mod dataset_id_opt {
    use dataset_catalog::DatasetId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Path(String),
        Tags(Vec<String>),
    }

    pub fn serialize<S: Serializer>(id: &Option<DatasetId>, s: S) -> Result<S::Ok, S::Error> {
        id.as_ref().map(|id| id.to_string()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DatasetId>, D::Error> {
        Ok(Option::<Repr>::deserialize(d)?.map(|repr| match repr {
            Repr::Path(s) => DatasetId::parse(&s),
            Repr::Tags(tags) => DatasetId::new(tags),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_adapters::Reducer;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
dataset: ESA_CCI_SM/v061/COMBINED
reader:
  parameters: [sm, flag]
  read_bulk: true
adapters:
  "01-mask": {kind: self_mask, column: flag, op: "==", threshold: 0}
  "02-anomaly": {kind: anomaly_clim, columns: [sm]}
filter_months: [6, 7, 8]
resample: {rule: 10D, method: mean}
params_rename: {sm: esa_cci_sm}
force_path_group: __test
"#;
        let config = FacadeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.dataset,
            Some(DatasetId::new(["ESA_CCI_SM", "v061", "COMBINED"]))
        );
        assert_eq!(config.reader.parameters, vec!["sm", "flag"]);
        assert!(config.reader.read_bulk);
        assert_eq!(config.adapters.len(), 2);
        assert_eq!(config.read_method, ReadMethod::Read);
        assert!(!config.drop_filtered_months);
        let resample = config.resample.unwrap();
        assert_eq!(resample.method, CombineFunc::Named(Reducer::Mean));
        assert_eq!(config.force_path_group.as_deref(), Some("__test"));
    }

    #[test]
    fn test_dataset_as_tag_list() {
        let config =
            FacadeConfig::from_yaml_str("dataset: [ISMN, v20230110]\nread_method: read_nearest\n")
                .unwrap();
        assert_eq!(config.dataset, Some(DatasetId::new(["ISMN", "v20230110"])));
        assert_eq!(config.read_method, ReadMethod::ReadNearest);
    }

    #[test]
    fn test_validation_errors() {
        let bad_month = FacadeConfig::default().with_filter_months(&[0, 5], false);
        assert!(bad_month.validate().is_err());

        let bad_rule = FacadeConfig::default().with_resample("10X", CombineFunc::Named(Reducer::Mean));
        assert!(bad_rule.validate().is_err());

        let clash = FacadeConfig::default().with_rename("a", "x").with_rename("b", "x");
        assert!(clash.validate().is_err());

        let err = FacadeConfig::from_yaml_str("adapters: {\"01\": {kind: nope}}").unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }
}
