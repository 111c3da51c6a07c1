//! Time-indexed tabular results.
//!
//! A [`Frame`] is the unit every reader returns and every adapter consumes:
//! a timestamp row index plus named columns. Float columns use `NaN` as the
//! absent-value marker, text columns use `None`.
//!
//! Cell aggregations need two-level labels; those are carried by
//! [`MultiColumnFrame`] (two-level column labels over a time index) and
//! [`MultiIndexFrame`] (two-level row labels).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{SmioError, SmioResult};
use crate::time::DateRange;

/// A scalar cell value, used for thresholds and replacements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Float(_) => None,
            Value::Text(s) => Some(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Column storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// A column of `len` absent values with the same type as `self`.
    pub fn absent_like(&self, len: usize) -> Column {
        match self {
            Column::Float(_) => Column::Float(vec![f64::NAN; len]),
            Column::Text(_) => Column::Text(vec![None; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_absent(&self, row: usize) -> bool {
        match self {
            Column::Float(v) => v.get(row).map_or(true, |x| x.is_nan()),
            Column::Text(v) => v.get(row).map_or(true, |x| x.is_none()),
        }
    }

    /// True when every value is absent (also true for an empty column).
    pub fn all_absent(&self) -> bool {
        (0..self.len()).all(|i| self.is_absent(i))
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Float(v) => v.get(row).filter(|x| !x.is_nan()).map(|x| Value::Float(*x)),
            Column::Text(v) => v.get(row).cloned().flatten().map(Value::Text),
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Float(_) => None,
            Column::Text(v) => Some(v),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Float(_))
    }

    /// Set one row to the absent marker.
    pub fn set_absent(&mut self, row: usize) {
        match self {
            Column::Float(v) => {
                if let Some(x) = v.get_mut(row) {
                    *x = f64::NAN;
                }
            }
            Column::Text(v) => {
                if let Some(x) = v.get_mut(row) {
                    *x = None;
                }
            }
        }
    }

    /// Gather rows by position. `None` positions become absent.
    pub fn take(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Float(v) => Column::Float(
                rows.iter()
                    .map(|r| r.and_then(|i| v.get(i).copied()).unwrap_or(f64::NAN))
                    .collect(),
            ),
            Column::Text(v) => Column::Text(
                rows.iter()
                    .map(|r| r.and_then(|i| v.get(i).cloned()).flatten())
                    .collect(),
            ),
        }
    }
}

/// Time-indexed table with one column per variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    index: Vec<NaiveDateTime>,
    columns: Vec<(String, Column)>,
}

impl Frame {
    /// Frame with the given index and no columns.
    pub fn new(index: Vec<NaiveDateTime>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Frame with no rows and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Zero-row frame carrying the given float column names.
    pub fn empty_with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            index: Vec::new(),
            columns: names
                .iter()
                .map(|n| (n.as_ref().to_string(), Column::Float(Vec::new())))
                .collect(),
        }
    }

    /// Build a frame, checking column lengths and name uniqueness.
    pub fn from_columns(
        index: Vec<NaiveDateTime>,
        columns: Vec<(String, Column)>,
    ) -> SmioResult<Self> {
        let mut frame = Self::new(index);
        for (name, column) in columns {
            if frame.has_column(&name) {
                return Err(SmioError::configuration(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
            frame.insert_column(name, column)?;
        }
        Ok(frame)
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn float_column(&self, name: &str) -> Option<&[f64]> {
        self.column(name).and_then(Column::as_float)
    }

    /// Insert or replace a column. Replacement keeps the column position.
    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> SmioResult<()> {
        let name = name.into();
        if column.len() != self.index.len() {
            return Err(SmioError::configuration(format!(
                "column '{}' has {} rows, index has {}",
                name,
                column.len(),
                self.index.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let pos = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(pos).1)
    }

    /// Return a frame with only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> SmioResult<Frame> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let column = self.column(name).ok_or_else(|| {
                SmioError::configuration(format!("column '{}' not present in frame", name))
            })?;
            columns.push((name.to_string(), column.clone()));
        }
        Ok(Frame {
            index: self.index.clone(),
            columns,
        })
    }

    /// Rename columns. Names absent from the frame are ignored; a rename that
    /// would produce duplicate names fails.
    pub fn rename(&self, mapping: &BTreeMap<String, String>) -> SmioResult<Frame> {
        let columns: Vec<(String, Column)> = self
            .columns
            .iter()
            .map(|(n, c)| (mapping.get(n).cloned().unwrap_or_else(|| n.clone()), c.clone()))
            .collect();

        let mut seen = BTreeSet::new();
        for (name, _) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(SmioError::configuration(format!(
                    "rename produces duplicate column '{}'",
                    name
                )));
            }
        }

        Ok(Frame {
            index: self.index.clone(),
            columns,
        })
    }

    /// Keep rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Frame {
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take_rows(&rows)
    }

    /// Gather rows by position.
    pub fn take_rows(&self, rows: &[usize]) -> Frame {
        let opt: Vec<Option<usize>> = rows.iter().map(|r| Some(*r)).collect();
        Frame {
            index: rows.iter().filter_map(|r| self.index.get(*r).copied()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.take(&opt)))
                .collect(),
        }
    }

    /// Stable sort by timestamp.
    pub fn sort_index(&self) -> Frame {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.index[i]);
        self.take_rows(&order)
    }

    /// Restrict to the closed interval `[range.start, range.end]`.
    pub fn clip(&self, range: &DateRange) -> Frame {
        let mask: Vec<bool> = self.index.iter().map(|t| range.contains(t)).collect();
        self.filter_rows(&mask)
    }

    /// Replace the row index, keeping column data.
    pub fn with_index(&self, index: Vec<NaiveDateTime>) -> SmioResult<Frame> {
        if index.len() != self.len() {
            return Err(SmioError::configuration(format!(
                "new index has {} rows, frame has {}",
                index.len(),
                self.len()
            )));
        }
        Ok(Frame {
            index,
            columns: self.columns.clone(),
        })
    }

    /// Strictly increasing timestamps (no duplicates).
    pub fn is_strictly_increasing(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }

    /// Rows where every column is absent.
    pub fn all_absent_rows(&self) -> Vec<bool> {
        (0..self.len())
            .map(|i| self.columns.iter().all(|(_, c)| c.is_absent(i)))
            .collect()
    }

    /// Column-wise concatenation on the sorted union of all indices.
    ///
    /// Duplicate timestamps inside one input keep their last value.
    pub fn outer_join(frames: Vec<Frame>) -> SmioResult<Frame> {
        let union: BTreeSet<NaiveDateTime> = frames
            .iter()
            .flat_map(|f| f.index.iter().copied())
            .collect();
        let index: Vec<NaiveDateTime> = union.into_iter().collect();
        let position: HashMap<NaiveDateTime, usize> =
            index.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let mut out = Frame::new(index.clone());
        for frame in frames {
            let mut rows: Vec<Option<usize>> = vec![None; index.len()];
            for (src, t) in frame.index.iter().enumerate() {
                rows[position[t]] = Some(src);
            }
            for (name, column) in frame.columns {
                if out.has_column(&name) {
                    return Err(SmioError::configuration(format!(
                        "duplicate column '{}' in join",
                        name
                    )));
                }
                out.columns.push((name, column.take(&rows)));
            }
        }
        Ok(out)
    }
}

/// Level label for two-level indices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Time(NaiveDateTime),
    Gpi(u64),
    Text(String),
}

impl Key {
    pub fn as_gpi(&self) -> Option<u64> {
        match self {
            Key::Gpi(g) => Some(*g),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Key::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Time(t) => write!(f, "{}", t),
            Key::Gpi(g) => write!(f, "{}", g),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One flattened observation: `(time, gpi, variable, value)`.
pub type Record = (NaiveDateTime, u64, String, f64);

/// Time-indexed frame whose columns carry a two-level label.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiColumnFrame {
    pub level_names: [String; 2],
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<((Key, Key), Vec<f64>)>,
}

impl MultiColumnFrame {
    pub fn new(level_names: [&str; 2], index: Vec<NaiveDateTime>) -> Self {
        Self {
            level_names: [level_names[0].to_string(), level_names[1].to_string()],
            index,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, key: &(Key, Key)) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_keys(&self) -> Vec<&(Key, Key)> {
        self.columns.iter().map(|(k, _)| k).collect()
    }

    /// Lexicographic sort of column labels on both levels.
    pub fn sort(mut self) -> Self {
        self.columns.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Exchange the two column levels, then re-sort.
    pub fn swap_levels(mut self) -> Self {
        self.level_names.swap(0, 1);
        for ((a, b), _) in self.columns.iter_mut() {
            std::mem::swap(a, b);
        }
        self.sort()
    }

    /// Flatten to records, skipping absent values.
    pub fn to_records(&self) -> Vec<Record> {
        let (var_level, _) = self.level_positions();
        let mut out = Vec::new();
        for ((a, b), values) in &self.columns {
            let (var, gpi) = if var_level == 0 { (a, b) } else { (b, a) };
            let (Some(var), Some(gpi)) = (var.as_text(), gpi.as_gpi()) else {
                continue;
            };
            for (t, v) in self.index.iter().zip(values) {
                if !v.is_nan() {
                    out.push((*t, gpi, var.to_string(), *v));
                }
            }
        }
        out
    }

    fn level_positions(&self) -> (usize, usize) {
        match self.columns.first() {
            Some(((Key::Text(_), _), _)) => (0, 1),
            _ => (1, 0),
        }
    }
}

/// Frame with a two-level row index and single-level column labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiIndexFrame {
    pub level_names: [String; 2],
    pub index: Vec<(Key, Key)>,
    pub columns: Vec<(Key, Vec<f64>)>,
}

impl MultiIndexFrame {
    pub fn new(level_names: [&str; 2]) -> Self {
        Self {
            level_names: [level_names[0].to_string(), level_names[1].to_string()],
            index: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, key: &Key) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_keys(&self) -> Vec<&Key> {
        self.columns.iter().map(|(k, _)| k).collect()
    }

    /// Lexicographic sort of rows (both levels) and of column labels.
    pub fn sort(mut self) -> Self {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by(|&a, &b| self.index[a].cmp(&self.index[b]));
        self.index = order.iter().map(|&i| self.index[i].clone()).collect();
        for (_, values) in self.columns.iter_mut() {
            *values = order.iter().map(|&i| values[i]).collect();
        }
        self.columns.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Exchange the two row levels, then re-sort.
    pub fn swap_levels(mut self) -> Self {
        self.level_names.swap(0, 1);
        for (a, b) in self.index.iter_mut() {
            std::mem::swap(a, b);
        }
        self.sort()
    }

    /// Flatten to records, skipping absent values.
    pub fn to_records(&self) -> Vec<Record> {
        let mut out = Vec::new();
        for (row, (a, b)) in self.index.iter().enumerate() {
            for (col, values) in &self.columns {
                let v = values[row];
                if v.is_nan() {
                    continue;
                }
                let keys = [a, b, col];
                let time = keys.iter().find_map(|k| k.as_time());
                let gpi = keys.iter().find_map(|k| k.as_gpi());
                let var = keys.iter().find_map(|k| k.as_text());
                if let (Some(t), Some(g), Some(var)) = (time, gpi, var) {
                    out.push((t, g, var.to_string(), v));
                }
            }
        }
        out
    }
}
