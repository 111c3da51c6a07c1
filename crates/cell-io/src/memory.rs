//! In-memory cell storage, used for tests and for data assembled at runtime.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{CellIoError, CellIoResult};
use crate::source::{CellSource, RawCell};

#[derive(Debug, Default)]
pub struct MemoryCellSource {
    cells: RwLock<BTreeMap<u32, RawCell>>,
}

impl MemoryCellSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_cell(self, raw: RawCell) -> Self {
        self.insert(raw);
        self
    }

    pub fn insert(&self, raw: RawCell) {
        if let Ok(mut cells) = self.cells.write() {
            cells.insert(raw.cell, raw);
        }
    }

    pub fn cells(&self) -> Vec<u32> {
        self.cells
            .read()
            .map(|cells| cells.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl CellSource for MemoryCellSource {
    fn cell_path(&self, cell: u32) -> PathBuf {
        PathBuf::from(format!("memory://{:04}", cell))
    }

    fn exists(&self, cell: u32) -> bool {
        self.cells
            .read()
            .map(|cells| cells.contains_key(&cell))
            .unwrap_or(false)
    }

    fn read_cell(&self, cell: u32, variables: Option<&[String]>) -> CellIoResult<RawCell> {
        let cells = self
            .cells
            .read()
            .map_err(|_| CellIoError::corrupt(cell, "cell store lock poisoned"))?;
        let raw = cells.get(&cell).ok_or_else(|| CellIoError::CellMissing {
            cell,
            path: self.cell_path(cell),
        })?;
        raw.restricted_to(variables)
    }

    fn available_variables(&self, cell: u32) -> CellIoResult<Vec<String>> {
        Ok(self.read_cell(cell, None)?.variable_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CellLayout, RawVariable};

    fn raw(cell: u32) -> RawCell {
        let mut variables = BTreeMap::new();
        variables.insert("sm".to_string(), RawVariable::new_1d("time", vec![0.2]));
        variables.insert("flag".to_string(), RawVariable::new_1d("time", vec![0.0]));
        RawCell {
            cell,
            layout: CellLayout::OrthoMulti,
            location_ids: vec![5],
            time: vec![0.0],
            time_units: "days since 2000-01-01".to_string(),
            row_size: None,
            variables,
        }
    }

    #[test]
    fn test_read_restricts_variables() {
        let source = MemoryCellSource::new().with_cell(raw(3));
        assert!(source.exists(3));
        let cell = source.read_cell(3, Some(&["sm".to_string()])).unwrap();
        assert_eq!(cell.variable_names(), vec!["sm"]);
        assert_eq!(source.available_variables(3).unwrap(), vec!["flag", "sm"]);
    }

    #[test]
    fn test_missing_cell_and_variable() {
        let source = MemoryCellSource::new().with_cell(raw(3));
        assert!(matches!(
            source.read_cell(4, None),
            Err(CellIoError::CellMissing { cell: 4, .. })
        ));
        assert!(matches!(
            source.read_cell(3, Some(&["ssm".to_string()])),
            Err(CellIoError::VariableMissing { .. })
        ));
    }
}
