//! Reshaping of per-variable cell dumps.
//!
//! A cell aggregation starts from one wide frame per variable (rows are
//! timestamps, one column per gpi) and reshapes the set into one of four
//! layouts. Every layout carries the same `(time, gpi, variable, value)`
//! observations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use smio_common::{
    Column, Frame, Key, MultiColumnFrame, MultiIndexFrame, Record, SmioError, SmioResult,
};

/// Output layout of an aggregated cell read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationShape {
    /// Columns keyed `(variable, gpi)`.
    #[default]
    WideVargpi,
    /// Rows keyed `(variable, time)`, one column per gpi.
    LongVartime,
    /// Rows keyed `(time, gpi)`, one column per variable.
    LongTimegpi,
    /// One frame per gpi with a column per variable.
    ByGpiDict,
}

impl AggregationShape {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wide_vargpi" => Some(Self::WideVargpi),
            "long_vartime" => Some(Self::LongVartime),
            "long_timegpi" => Some(Self::LongTimegpi),
            "by_gpi_dict" => Some(Self::ByGpiDict),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WideVargpi => "wide_vargpi",
            Self::LongVartime => "long_vartime",
            Self::LongTimegpi => "long_timegpi",
            Self::ByGpiDict => "by_gpi_dict",
        }
    }
}

/// Result of an aggregated cell read.
#[derive(Debug, Clone, PartialEq)]
pub enum CellAggregate {
    Wide(MultiColumnFrame),
    Long(MultiIndexFrame),
    /// `gpi -> frame` with one column per variable.
    ByGpi(BTreeMap<u64, Frame>),
    /// Swapped form of [`CellAggregate::ByGpi`]: `variable -> frame` with
    /// one column per gpi.
    ByVariable(BTreeMap<String, Frame>),
}

impl CellAggregate {
    pub fn as_wide(&self) -> Option<&MultiColumnFrame> {
        match self {
            Self::Wide(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<&MultiIndexFrame> {
        match self {
            Self::Long(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_by_gpi(&self) -> Option<&BTreeMap<u64, Frame>> {
        match self {
            Self::ByGpi(m) => Some(m),
            _ => None,
        }
    }

    /// Every non-absent observation, sorted.
    pub fn to_records(&self) -> Vec<Record> {
        let mut records = match self {
            Self::Wide(f) => f.to_records(),
            Self::Long(f) => f.to_records(),
            Self::ByGpi(map) => map
                .iter()
                .flat_map(|(gpi, frame)| frame_records(frame, |col| Some((*gpi, col.to_string()))))
                .collect(),
            Self::ByVariable(map) => map
                .iter()
                .flat_map(|(var, frame)| {
                    frame_records(frame, |col| col.parse().ok().map(|g| (g, var.clone())))
                })
                .collect(),
        };
        records.sort_by(|a, b| {
            (a.0, a.1, &a.2)
                .cmp(&(b.0, b.1, &b.2))
                .then(a.3.total_cmp(&b.3))
        });
        records
    }
}

fn frame_records<F>(frame: &Frame, key: F) -> Vec<Record>
where
    F: Fn(&str) -> Option<(u64, String)>,
{
    let mut out = Vec::new();
    for (name, column) in frame.columns() {
        let (Some((gpi, var)), Some(values)) = (key(name), column.as_float()) else {
            continue;
        };
        for (t, v) in frame.index().iter().zip(values) {
            if !v.is_nan() {
                out.push((*t, gpi, var.clone(), *v));
            }
        }
    }
    out
}

/// Wide per-variable frames aligned on one time index.
struct Aligned {
    index: Vec<NaiveDateTime>,
    gpis: Vec<u64>,
    /// `values[var][gpi][row]`
    values: BTreeMap<String, BTreeMap<u64, Vec<f64>>>,
}

impl Aligned {
    fn new(wide: &BTreeMap<String, Frame>) -> SmioResult<Self> {
        let index: Vec<NaiveDateTime> = wide
            .values()
            .flat_map(|f| f.index().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let position: HashMap<NaiveDateTime, usize> =
            index.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let mut gpis = BTreeSet::new();
        let mut values = BTreeMap::new();
        for (var, frame) in wide {
            let mut per_gpi = BTreeMap::new();
            for (name, column) in frame.columns() {
                let gpi: u64 = name.parse().map_err(|_| {
                    SmioError::configuration(format!("cell column '{}' is not a gpi", name))
                })?;
                let Column::Float(data) = column else {
                    continue;
                };
                let mut aligned = vec![f64::NAN; index.len()];
                for (t, v) in frame.index().iter().zip(data) {
                    if let Some(&row) = position.get(t) {
                        aligned[row] = *v;
                    }
                }
                gpis.insert(gpi);
                per_gpi.insert(gpi, aligned);
            }
            values.insert(var.clone(), per_gpi);
        }

        Ok(Self {
            index,
            gpis: gpis.into_iter().collect(),
            values,
        })
    }

    fn get(&self, var: &str, gpi: u64) -> Option<&[f64]> {
        self.values.get(var)?.get(&gpi).map(Vec::as_slice)
    }

    fn series(&self, var: &str, gpi: u64) -> Vec<f64> {
        self.get(var, gpi)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![f64::NAN; self.index.len()])
    }
}

/// Reshape per-variable wide frames (`variable -> frame`) into `shape`.
pub fn reshape(
    wide: &BTreeMap<String, Frame>,
    shape: AggregationShape,
    swap_levels: bool,
) -> SmioResult<CellAggregate> {
    let aligned = Aligned::new(wide)?;
    let variables: Vec<&String> = aligned.values.keys().collect();

    let out = match shape {
        AggregationShape::WideVargpi => {
            let mut frame = MultiColumnFrame::new(["variable", "gpi"], aligned.index.clone());
            for var in &variables {
                for gpi in &aligned.gpis {
                    frame.columns.push((
                        (Key::Text((*var).clone()), Key::Gpi(*gpi)),
                        aligned.series(var, *gpi),
                    ));
                }
            }
            let frame = frame.sort();
            CellAggregate::Wide(if swap_levels { frame.swap_levels() } else { frame })
        }
        AggregationShape::LongVartime => {
            let mut frame = MultiIndexFrame::new(["variable", "time"]);
            for var in &variables {
                for t in &aligned.index {
                    frame.index.push((Key::Text((*var).clone()), Key::Time(*t)));
                }
            }
            for gpi in &aligned.gpis {
                let column: Vec<f64> = variables
                    .iter()
                    .flat_map(|var| aligned.series(var, *gpi))
                    .collect();
                frame.columns.push((Key::Gpi(*gpi), column));
            }
            let frame = frame.sort();
            CellAggregate::Long(if swap_levels { frame.swap_levels() } else { frame })
        }
        AggregationShape::LongTimegpi => {
            let mut frame = MultiIndexFrame::new(["time", "gpi"]);
            for t in &aligned.index {
                for gpi in &aligned.gpis {
                    frame.index.push((Key::Time(*t), Key::Gpi(*gpi)));
                }
            }
            for var in &variables {
                let series: Vec<Vec<f64>> =
                    aligned.gpis.iter().map(|g| aligned.series(var, *g)).collect();
                let column: Vec<f64> = (0..aligned.index.len())
                    .flat_map(|row| series.iter().map(move |s| s[row]))
                    .collect();
                frame.columns.push((Key::Text((*var).clone()), column));
            }
            let frame = frame.sort();
            CellAggregate::Long(if swap_levels { frame.swap_levels() } else { frame })
        }
        AggregationShape::ByGpiDict if !swap_levels => {
            let mut map = BTreeMap::new();
            for gpi in &aligned.gpis {
                let columns = variables
                    .iter()
                    .map(|var| ((*var).clone(), Column::Float(aligned.series(var, *gpi))))
                    .collect();
                map.insert(*gpi, Frame::from_columns(aligned.index.clone(), columns)?);
            }
            CellAggregate::ByGpi(map)
        }
        AggregationShape::ByGpiDict => {
            let mut map = BTreeMap::new();
            for var in &variables {
                let columns = aligned
                    .gpis
                    .iter()
                    .map(|gpi| (gpi.to_string(), Column::Float(aligned.series(var, *gpi))))
                    .collect();
                map.insert((*var).clone(), Frame::from_columns(aligned.index.clone(), columns)?);
            }
            CellAggregate::ByVariable(map)
        }
    };
    Ok(out)
}
