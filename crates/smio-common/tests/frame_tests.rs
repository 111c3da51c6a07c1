//! Tests for Frame operations used along the read pipeline.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use smio_common::{Column, Frame, Key, MultiColumnFrame, Value};

fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn frame() -> Frame {
    Frame::from_columns(
        vec![ts(2020, 1, 1), ts(2020, 1, 2), ts(2020, 1, 3), ts(2020, 1, 4)],
        vec![
            ("sm".to_string(), Column::Float(vec![0.1, 0.2, f64::NAN, 0.4])),
            ("flag".to_string(), Column::Float(vec![0.0, 1.0, 0.0, 0.0])),
        ],
    )
    .unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_duplicate_columns_rejected() {
    let result = Frame::from_columns(
        vec![ts(2020, 1, 1)],
        vec![
            ("sm".to_string(), Column::Float(vec![1.0])),
            ("sm".to_string(), Column::Float(vec![2.0])),
        ],
    );
    assert!(result.is_err());
}

#[test]
fn test_empty_with_columns_keeps_schema() {
    let frame = Frame::empty_with_columns(&["sm", "flag"]);
    assert!(frame.is_empty());
    assert_eq!(frame.column_names(), vec!["sm", "flag"]);
}

// ============================================================================
// Row operations
// ============================================================================

#[test]
fn test_filter_rows() {
    let kept = frame().filter_rows(&[true, false, true, false]);
    assert_eq!(kept.index(), &[ts(2020, 1, 1), ts(2020, 1, 3)]);
    assert_eq!(kept.float_column("flag").unwrap(), &[0.0, 0.0]);
}

#[test]
fn test_select_missing_column_fails() {
    assert!(frame().select(&["sm", "t0"]).is_err());
    let selected = frame().select(&["flag"]).unwrap();
    assert_eq!(selected.column_names(), vec!["flag"]);
}

#[test]
fn test_all_absent_rows() {
    let frame = Frame::from_columns(
        vec![ts(2020, 1, 1), ts(2020, 1, 2)],
        vec![
            ("a".to_string(), Column::Float(vec![f64::NAN, 1.0])),
            ("b".to_string(), Column::Text(vec![None, None])),
        ],
    )
    .unwrap();
    assert_eq!(frame.all_absent_rows(), vec![true, false]);
}

#[test]
fn test_column_get_skips_absent() {
    let frame = frame();
    let sm = frame.column("sm").unwrap();
    assert_eq!(sm.get(0), Some(Value::Float(0.1)));
    assert_eq!(sm.get(2), None);
    assert!(sm.is_absent(2));
}

// ============================================================================
// Rename
// ============================================================================

#[test]
fn test_rename_is_bijective() {
    let mut mapping = BTreeMap::new();
    mapping.insert("sm".to_string(), "esa_cci_sm".to_string());
    let renamed = frame().rename(&mapping).unwrap();
    assert_eq!(renamed.column_names(), vec!["esa_cci_sm", "flag"]);
    assert_eq!(renamed.n_columns(), frame().n_columns());
}

// ============================================================================
// Multi-level frames
// ============================================================================

#[test]
fn test_multi_column_records_ignore_absent() {
    let mut wide = MultiColumnFrame::new(["variable", "gpi"], vec![ts(2020, 1, 1), ts(2020, 1, 2)]);
    wide.columns.push(((Key::Text("sm".into()), Key::Gpi(7)), vec![0.5, f64::NAN]));
    let records = wide.to_records();
    assert_eq!(records, vec![(ts(2020, 1, 1), 7, "sm".to_string(), 0.5)]);

    let swapped = wide.swap_levels();
    assert_eq!(swapped.level_names, ["gpi".to_string(), "variable".to_string()]);
    assert_eq!(swapped.to_records().len(), 1);
}
