//! Serializable adapter descriptions.
//!
//! Descriptors are plain data (they usually come from a YAML facade
//! configuration). [`AdapterDescriptor::build`] validates one and turns it
//! into a ready-to-apply [`Adapter`].

use serde::{Deserialize, Serialize};
use smio_common::{DateRange, SmioError, SmioResult, Value};

use crate::anomaly::AnomalyClimAdapter;
use crate::basic::BasicAdapter;
use crate::combine::{ColumnCombineAdapter, CombineFunc};
use crate::mask::SelfMaskAdapter;
use crate::Adapter;

/// Comparison of a `self_mask` adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "between")]
    Between,
}

impl MaskOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskOp::Eq => "==",
            MaskOp::Ne => "!=",
            MaskOp::Lt => "<",
            MaskOp::Le => "<=",
            MaskOp::Gt => ">",
            MaskOp::Ge => ">=",
            MaskOp::In => "in",
            MaskOp::Between => "between",
        }
    }
}

impl std::fmt::Display for MaskOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a mask comparison: one value, or a list for `in`
/// and `between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Scalar(Value),
    List(Vec<Value>),
}

impl From<f64> for Threshold {
    fn from(v: f64) -> Self {
        Threshold::Scalar(Value::Float(v))
    }
}

impl From<&str> for Threshold {
    fn from(v: &str) -> Self {
        Threshold::Scalar(Value::Text(v.to_string()))
    }
}

impl From<Vec<Value>> for Threshold {
    fn from(v: Vec<Value>) -> Self {
        Threshold::List(v)
    }
}

/// Longest window (days) for smoothing the series before the climatology.
pub const MAX_ORIG_WINDOW_DAYS: f64 = 3660.0;

/// Longest window (days) for smoothing the day-of-year climatology.
pub const MAX_CLIM_WINDOW_DAYS: f64 = 366.0;

fn default_moving_avg_orig() -> f64 {
    5.0
}

fn default_moving_avg_clim() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_min_obs() -> usize {
    1
}

/// Parameters of an `anomaly_clim` adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyClimParams {
    pub columns: Vec<String>,
    /// Only observations inside this interval enter the climatology.
    #[serde(default)]
    pub timespan: Option<DateRange>,
    /// Window (days) smoothing the series before averaging by day of year.
    #[serde(default = "default_moving_avg_orig")]
    pub moving_avg_orig: f64,
    /// Window (days) smoothing the day-of-year climatology.
    #[serde(default = "default_moving_avg_clim")]
    pub moving_avg_clim: f64,
    /// Smooth across the Dec 31 / Jan 1 boundary.
    #[serde(default = "default_true")]
    pub wraparound: bool,
    /// Use the median per day of year instead of the mean.
    #[serde(default)]
    pub median: bool,
    /// Days of year with fewer observations are absent before smoothing.
    #[serde(default = "default_min_obs")]
    pub min_obs_clim: usize,
    /// Keep the original column and add `<column>_climatology`.
    #[serde(default)]
    pub return_clim: bool,
}

impl AnomalyClimParams {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            timespan: None,
            moving_avg_orig: default_moving_avg_orig(),
            moving_avg_clim: default_moving_avg_clim(),
            wraparound: true,
            median: false,
            min_obs_clim: default_min_obs(),
            return_clim: false,
        }
    }
}

/// Keyword arguments of a `column_combine` reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncKwargs {
    /// Ignore absent values; otherwise any absent input gives an absent result.
    #[serde(default = "default_true")]
    pub skipna: bool,
    /// Fewer present values than this give an absent result.
    #[serde(default = "default_min_obs")]
    pub min_count: usize,
    /// Delta degrees of freedom of `std`.
    #[serde(default = "default_min_obs")]
    pub ddof: usize,
}

impl Default for FuncKwargs {
    fn default() -> Self {
        Self {
            skipna: true,
            min_count: 1,
            ddof: 1,
        }
    }
}

/// Parameters of a `column_combine` adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCombineParams {
    pub func: CombineFunc,
    pub columns: Vec<String>,
    pub new_name: String,
    #[serde(default)]
    pub func_kwargs: FuncKwargs,
}

/// One entry of an adapter chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterDescriptor {
    /// Drop coordinate-like auxiliary columns.
    Basic,
    /// Keep rows where `column op threshold` holds.
    SelfMask {
        column: String,
        op: MaskOp,
        threshold: Threshold,
    },
    /// Replace columns by their anomalies from a day-of-year climatology.
    AnomalyClim(AnomalyClimParams),
    /// Reduce several columns row-wise into a new one.
    ColumnCombine(ColumnCombineParams),
}

impl AdapterDescriptor {
    pub fn self_mask(column: impl Into<String>, op: MaskOp, threshold: impl Into<Threshold>) -> Self {
        AdapterDescriptor::SelfMask {
            column: column.into(),
            op,
            threshold: threshold.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdapterDescriptor::Basic => "basic",
            AdapterDescriptor::SelfMask { .. } => "self_mask",
            AdapterDescriptor::AnomalyClim(_) => "anomaly_clim",
            AdapterDescriptor::ColumnCombine(_) => "column_combine",
        }
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AdapterDescriptor::Basic => Ok(()),
            AdapterDescriptor::SelfMask { column, op, threshold } => {
                if column.is_empty() {
                    return Err("self_mask needs a column".to_string());
                }
                match (op, threshold) {
                    (MaskOp::In, Threshold::List(values)) if !values.is_empty() => {}
                    (MaskOp::In, _) => {
                        return Err("self_mask 'in' needs a non-empty list threshold".to_string())
                    }
                    (MaskOp::Between, Threshold::List(values)) if values.len() == 2 => {
                        if let (Some(lo), Some(hi)) = (values[0].as_f64(), values[1].as_f64()) {
                            if lo > hi {
                                return Err(format!(
                                    "self_mask 'between' bounds are not ordered: {} > {}",
                                    lo, hi
                                ));
                            }
                        }
                    }
                    (MaskOp::Between, _) => {
                        return Err("self_mask 'between' needs a [low, high] threshold".to_string())
                    }
                    (_, Threshold::List(_)) => {
                        return Err(format!("self_mask '{}' needs a single threshold", op))
                    }
                    (_, Threshold::Scalar(_)) => {}
                }
                let values: Vec<&Value> = match threshold {
                    Threshold::Scalar(v) => vec![v],
                    Threshold::List(vs) => vs.iter().collect(),
                };
                let texts = values.iter().filter(|v| v.as_str().is_some()).count();
                if texts != 0 && texts != values.len() {
                    return Err("self_mask threshold mixes text and numbers".to_string());
                }
                Ok(())
            }
            AdapterDescriptor::AnomalyClim(p) => {
                if p.columns.is_empty() {
                    return Err("anomaly_clim needs at least one column".to_string());
                }
                if !(0.0..=MAX_ORIG_WINDOW_DAYS).contains(&p.moving_avg_orig) {
                    return Err(format!(
                        "anomaly_clim moving_avg_orig must be within 0-{} days, got {}",
                        MAX_ORIG_WINDOW_DAYS, p.moving_avg_orig
                    ));
                }
                if !(0.0..=MAX_CLIM_WINDOW_DAYS).contains(&p.moving_avg_clim) {
                    return Err(format!(
                        "anomaly_clim moving_avg_clim must be within 0-{} days, got {}",
                        MAX_CLIM_WINDOW_DAYS, p.moving_avg_clim
                    ));
                }
                if p.min_obs_clim == 0 {
                    return Err("anomaly_clim min_obs_clim must be >= 1".to_string());
                }
                if let Some(span) = &p.timespan {
                    if span.start > span.end {
                        return Err("anomaly_clim timespan start is after its end".to_string());
                    }
                }
                Ok(())
            }
            AdapterDescriptor::ColumnCombine(p) => {
                if p.columns.is_empty() {
                    return Err("column_combine needs at least one column".to_string());
                }
                if p.new_name.is_empty() {
                    return Err("column_combine needs a new_name".to_string());
                }
                Ok(())
            }
        }
    }

    /// Validate and build the adapter. Invalid parameters are a
    /// configuration error.
    pub fn build(&self) -> SmioResult<Box<dyn Adapter>> {
        self.validate()
            .map_err(|e| SmioError::configuration(format!("{} adapter: {}", self.kind(), e)))?;
        Ok(match self {
            AdapterDescriptor::Basic => Box::new(BasicAdapter),
            AdapterDescriptor::SelfMask { column, op, threshold } => {
                Box::new(SelfMaskAdapter::new(column.clone(), *op, threshold.clone()))
            }
            AdapterDescriptor::AnomalyClim(p) => Box::new(AnomalyClimAdapter::new(p.clone())),
            AdapterDescriptor::ColumnCombine(p) => Box::new(ColumnCombineAdapter::new(p.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_from_yaml() {
        let yaml = r#"
01-mask:
  kind: self_mask
  column: flag
  op: "=="
  threshold: 0
02-anom:
  kind: anomaly_clim
  columns: [sm]
  moving_avg_clim: 30
03-combine:
  kind: column_combine
  func: mean
  columns: [a, b]
  new_name: ab
04-flags:
  kind: self_mask
  column: flag
  op: in
  threshold: [G, M]
"#;
        let map: std::collections::BTreeMap<String, AdapterDescriptor> =
            serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            map["01-mask"],
            AdapterDescriptor::self_mask("flag", MaskOp::Eq, 0.0)
        );
        let AdapterDescriptor::AnomalyClim(p) = &map["02-anom"] else {
            panic!("wrong kind");
        };
        assert_eq!(p.moving_avg_orig, 5.0);
        assert!(p.wraparound);
        let AdapterDescriptor::ColumnCombine(p) = &map["03-combine"] else {
            panic!("wrong kind");
        };
        assert_eq!(p.func_kwargs, FuncKwargs::default());
        assert_eq!(
            map["04-flags"],
            AdapterDescriptor::self_mask(
                "flag",
                MaskOp::In,
                vec![Value::from("G"), Value::from("M")]
            )
        );
        for descriptor in map.values() {
            assert!(descriptor.build().is_ok());
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = serde_yaml::from_str::<AdapterDescriptor>("kind: smooth\n").unwrap_err();
        assert!(err.to_string().contains("smooth"));
    }

    #[test]
    fn test_invalid_thresholds() {
        let cases = [
            AdapterDescriptor::self_mask("flag", MaskOp::In, 0.0),
            AdapterDescriptor::self_mask("flag", MaskOp::Between, vec![Value::from(1.0)]),
            AdapterDescriptor::self_mask(
                "flag",
                MaskOp::Between,
                vec![Value::from(2.0), Value::from(1.0)],
            ),
            AdapterDescriptor::self_mask("flag", MaskOp::Lt, vec![Value::from(1.0)]),
            AdapterDescriptor::self_mask(
                "flag",
                MaskOp::In,
                vec![Value::from(1.0), Value::from("G")],
            ),
        ];
        for case in cases {
            let err = case.build().err().unwrap();
            assert!(matches!(err, SmioError::Configuration(_)), "{:?}", case);
        }
    }
    #[test]
    fn test_anomaly_window_bounds() {
        let window = |orig: f64, clim: f64| {
            AdapterDescriptor::AnomalyClim(AnomalyClimParams {
                moving_avg_orig: orig,
                moving_avg_clim: clim,
                ..AnomalyClimParams::new(&["sm"])
            })
        };
        assert!(window(0.0, 0.0).build().is_ok());
        assert!(window(MAX_ORIG_WINDOW_DAYS, MAX_CLIM_WINDOW_DAYS).build().is_ok());

        for (orig, clim) in [
            (1.0e9, 30.0),
            (f64::INFINITY, 30.0),
            (f64::NAN, 30.0),
            (-1.0, 30.0),
            (5.0, 367.0),
            (5.0, f64::INFINITY),
        ] {
            let err = window(orig, clim).build().err().unwrap();
            assert!(
                matches!(err, SmioError::Configuration(_)),
                "{} {}: {:?}",
                orig,
                clim,
                err
            );
        }
    }
}
