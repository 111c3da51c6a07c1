//! Sentinel replacement after the adapter chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smio_common::{Column, Frame, Value};
use tracing::debug;

/// Which values become absent (or are replaced) in the final frame.
///
/// In YAML: `-9999` for every column, `{sm: -9999}` per column, or
/// `{sm: {"-9999": -1}}` to replace instead of blanking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NanPolicy {
    /// Blank this value in every column.
    Scalar(Value),
    /// Blank one value per column.
    PerColumn(BTreeMap<String, Value>),
    /// Replace values per column; keys are the values to replace.
    Nested(BTreeMap<String, BTreeMap<String, Value>>),
}

impl NanPolicy {
    /// Apply the policy. Columns named in the policy but absent from the
    /// frame are ignored.
    pub fn apply(&self, frame: &Frame) -> Frame {
        let mut out = frame.clone();
        let mut touched = 0usize;
        match self {
            NanPolicy::Scalar(value) => {
                let names: Vec<String> = out.column_names().iter().map(|n| n.to_string()).collect();
                for name in names {
                    if let Some(column) = out.column_mut(&name) {
                        touched += blank(column, value);
                    }
                }
            }
            NanPolicy::PerColumn(values) => {
                for (name, value) in values {
                    if let Some(column) = out.column_mut(name) {
                        touched += blank(column, value);
                    }
                }
            }
            NanPolicy::Nested(mapping) => {
                for (name, replacements) in mapping {
                    if let Some(column) = out.column_mut(name) {
                        for (from, to) in replacements {
                            touched += replace(column, from, to);
                        }
                    }
                }
            }
        }
        debug!(values = touched, "Applied nan policy");
        out
    }
}

fn is_match(value: &Value, float: Option<f64>, text: Option<&str>) -> bool {
    match value {
        Value::Float(v) => float.is_some_and(|f| f == *v),
        Value::Text(v) => text == Some(v.as_str()),
    }
}

fn blank(column: &mut Column, value: &Value) -> usize {
    let rows: Vec<usize> = match column {
        Column::Float(values) => values
            .iter()
            .enumerate()
            .filter(|(_, v)| is_match(value, Some(**v), None))
            .map(|(i, _)| i)
            .collect(),
        Column::Text(values) => values
            .iter()
            .enumerate()
            .filter(|(_, v)| is_match(value, None, v.as_deref()))
            .map(|(i, _)| i)
            .collect(),
    };
    for row in &rows {
        column.set_absent(*row);
    }
    rows.len()
}

fn replace(column: &mut Column, from: &str, to: &Value) -> usize {
    let mut count = 0;
    match column {
        Column::Float(values) => {
            let (Ok(from), Some(to)) = (from.parse::<f64>(), to.as_f64()) else {
                return 0;
            };
            for v in values.iter_mut().filter(|v| **v == from) {
                *v = to;
                count += 1;
            }
        }
        Column::Text(values) => {
            let to = to.as_str().map(str::to_string);
            for v in values.iter_mut().filter(|v| v.as_deref() == Some(from)) {
                *v = to.clone();
                count += 1;
            }
        }
    }
    count
}
