//! Row-wise reduction of several columns into one.

use std::sync::Arc;

use smio_common::{Column, Frame, SmioError, SmioResult};
use tracing::debug;

use crate::descriptor::{ColumnCombineParams, FuncKwargs};
use crate::Adapter;

/// Named reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Sum,
    Min,
    Max,
    Median,
    Std,
    Count,
    First,
    Last,
}

impl Reducer {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mean" => Some(Self::Mean),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "median" => Some(Self::Median),
            "std" => Some(Self::Std),
            "count" => Some(Self::Count),
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::Count => "count",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Reduce present (non-NaN) values.
    pub fn reduce(&self, values: &[f64], ddof: usize) -> f64 {
        if values.is_empty() {
            return match self {
                Self::Sum => 0.0,
                Self::Count => 0.0,
                _ => f64::NAN,
            };
        }
        let n = values.len() as f64;
        match self {
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Sum => values.iter().sum(),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Median => median(values),
            Self::Std => {
                if values.len() <= ddof {
                    return f64::NAN;
                }
                let mean = values.iter().sum::<f64>() / n;
                let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
                (ss / (n - ddof as f64)).sqrt()
            }
            Self::Count => n,
            Self::First => values[0],
            Self::Last => values[values.len() - 1],
        }
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Reducer applied to each row.
pub type RowFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A named reducer or a caller-supplied function.
///
/// Only named reducers can be written to or read from configuration files.
#[derive(Clone)]
pub enum CombineFunc {
    Named(Reducer),
    Custom(RowFn),
}

impl CombineFunc {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        CombineFunc::Custom(Arc::new(f))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CombineFunc::Named(r) => r.as_str(),
            CombineFunc::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Debug for CombineFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineFunc::Named(r) => write!(f, "Named({})", r.as_str()),
            CombineFunc::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for CombineFunc {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CombineFunc::Named(a), CombineFunc::Named(b)) => a == b,
            (CombineFunc::Custom(a), CombineFunc::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl TryFrom<String> for CombineFunc {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Reducer::from_str(&s)
            .map(CombineFunc::Named)
            .ok_or_else(|| format!("unknown reducer '{}'", s))
    }
}

impl serde::Serialize for CombineFunc {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for CombineFunc {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CombineFunc::try_from(s).map_err(serde::de::Error::custom)
    }
}

/// Adds `new_name` = `func(columns...)` for every row.
pub struct ColumnCombineAdapter {
    params: ColumnCombineParams,
}

impl ColumnCombineAdapter {
    pub fn new(params: ColumnCombineParams) -> Self {
        Self { params }
    }

    fn reduce_row(&self, row: &[f64]) -> f64 {
        let FuncKwargs {
            skipna,
            min_count,
            ddof,
        } = self.params.func_kwargs;
        let present: Vec<f64> = row.iter().copied().filter(|v| !v.is_nan()).collect();
        if !skipna && present.len() != row.len() {
            return f64::NAN;
        }
        if let CombineFunc::Named(Reducer::Count) = self.params.func {
            return present.len() as f64;
        }
        if present.len() < min_count {
            return f64::NAN;
        }
        match &self.params.func {
            CombineFunc::Named(r) => r.reduce(&present, ddof),
            CombineFunc::Custom(f) => f(&present),
        }
    }
}

impl Adapter for ColumnCombineAdapter {
    fn kind(&self) -> &'static str {
        "column_combine"
    }

    fn apply(&self, frame: &Frame) -> SmioResult<Frame> {
        let mut out = frame.clone();
        if frame.is_empty() {
            out.insert_column(self.params.new_name.clone(), Column::Float(Vec::new()))?;
            return Ok(out);
        }

        let mut inputs: Vec<&[f64]> = Vec::with_capacity(self.params.columns.len());
        for name in &self.params.columns {
            let column = frame.column(name).ok_or_else(|| {
                SmioError::adapter_precondition(self.kind(), format!("column '{}' not present", name))
            })?;
            let values = column.as_float().ok_or_else(|| {
                SmioError::adapter_precondition(self.kind(), format!("column '{}' is not numeric", name))
            })?;
            inputs.push(values);
        }

        let mut row = vec![0.0; inputs.len()];
        let combined: Vec<f64> = (0..frame.len())
            .map(|i| {
                for (slot, values) in row.iter_mut().zip(&inputs) {
                    *slot = values[i];
                }
                self.reduce_row(&row)
            })
            .collect();

        debug!(
            func = self.params.func.name(),
            columns = ?self.params.columns,
            new_name = %self.params.new_name,
            "Combined columns"
        );
        out.insert_column(self.params.new_name.clone(), Column::Float(combined))?;
        Ok(out)
    }
}
