//! Cell files written with the netcdf library and read back through
//! `NetCdfCellSource`.

use std::collections::BTreeMap;

use cell_io::{
    location_series, read_cell_wide, read_grid_file, CellCache, CellIoError, CellLayout,
    CellSource, FilenameTemplate, NetCdfCellSource,
};
use smio_common::CellGrid;
use test_utils::{
    points, temp_test_dir, write_ortho_cell, write_ragged_cell, write_testdata, FixturePoint,
    FixtureVariable, FIXTURE_FILL, PACKED_FILL,
};

// ============================================================================
// Orthogonal multi
// ============================================================================

#[test]
fn test_ortho_cell_roundtrip_through_fixture_tree() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let source = NetCdfCellSource::new(&data.cci_dir, FilenameTemplate::default());

    let raw = source.read_cell(points::DUMP_CELL, None).unwrap();
    assert_eq!(raw.layout, CellLayout::OrthoMulti);
    assert_eq!(raw.location_ids.len(), 3);
    assert_eq!(raw.time.len(), data.cci_times.len());
    assert_eq!(raw.variable_names(), vec!["flag", "sm", "t0"]);

    let frame = read_cell_wide(&raw, "sm", None).unwrap();
    assert!(frame.is_strictly_increasing());
    assert_eq!(frame.index()[0], data.cci_times[0]);
    for p in data.cci_points_in_cell(points::DUMP_CELL) {
        let column = frame.float_column(&p.gpi.to_string()).unwrap();
        assert!(column.iter().all(|v| v.is_nan() || *v != FIXTURE_FILL));
        assert!(column.iter().any(|v| v.is_nan()));
    }
}

#[test]
fn test_available_variables_excludes_structure() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let source = NetCdfCellSource::new(&data.cci_dir, FilenameTemplate::default());

    let names = source.available_variables(points::CCI_POINT_CELL).unwrap();
    assert_eq!(names, vec!["flag", "sm", "t0"]);
}

#[test]
fn test_missing_variable_and_cell() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let source = NetCdfCellSource::new(&data.cci_dir, FilenameTemplate::default());

    let err = source
        .read_cell(points::DUMP_CELL, Some(&["ssm".to_string()]))
        .unwrap_err();
    assert!(matches!(err, CellIoError::VariableMissing { .. }));

    let err = source.read_cell(9, None).unwrap_err();
    assert!(matches!(err, CellIoError::CellMissing { cell: 9, .. }));
}

// ============================================================================
// Contiguous ragged
// ============================================================================

#[test]
fn test_ragged_cell_scaling_and_fill() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let source = NetCdfCellSource::new(&data.c3s_dir, FilenameTemplate::default());

    let raw = source.read_cell(points::CCI_POINT_CELL, None).unwrap();
    assert_eq!(raw.layout, CellLayout::ContiguousRagged);
    let sm = raw.variable("sm").unwrap();
    assert_eq!(sm.scale_factor, Some(1e-4));
    assert_eq!(sm.fill_value, Some(PACKED_FILL as f64));

    let gpi = data.c3s_points[1].gpi;
    let frame = location_series(&raw, gpi, &["sm".to_string()], &BTreeMap::new()).unwrap();
    let values = frame.float_column("sm").unwrap();
    assert!(!values.is_empty());
    assert!(values.iter().all(|v| v.is_nan() || (*v > 0.0 && *v < 1.0)));
    assert!(frame.is_strictly_increasing());

    let wide = read_cell_wide(&raw, "sm", None).unwrap();
    assert_eq!(wide.n_columns(), data.c3s_points.len());
    assert!(wide.len() > frame.len());
}

#[test]
fn test_ragged_row_size_mismatch_is_corrupt() {
    let dir = temp_test_dir();
    let points = vec![
        FixturePoint::regular(15.125, 45.125, 0.25),
        FixturePoint::regular(15.375, 45.125, 0.25),
    ];
    write_ragged_cell(
        &dir.path().join("1431.nc"),
        &points,
        &[vec![0.0, 1.0], vec![0.0]],
        &[FixtureVariable::float("sm", vec![vec![0.1, 0.2], vec![0.3]])],
    )
    .unwrap();

    let source = NetCdfCellSource::new(dir.path(), FilenameTemplate::default());
    let mut raw = source.read_cell(1431, None).unwrap();
    raw.row_size = Some(vec![1, 1]);
    let err = read_cell_wide(&raw, "sm", None).unwrap_err();
    assert!(matches!(err, CellIoError::CellCorrupt { .. }));
}

#[test]
fn test_time_without_units_is_corrupt() {
    let dir = temp_test_dir();
    {
        let mut file = netcdf::create(dir.path().join("1431.nc")).unwrap();
        file.add_dimension("locations", 1).unwrap();
        file.add_dimension("time", 2).unwrap();
        file.add_variable::<i64>("location_id", &["locations"])
            .unwrap()
            .put_values(&[1_i64], ..)
            .unwrap();
        file.add_variable::<f64>("time", &["time"])
            .unwrap()
            .put_values(&[0.0, 1.0], ..)
            .unwrap();
        file.add_variable::<f64>("sm", &["locations", "time"])
            .unwrap()
            .put_values(&[0.1, 0.2], ..)
            .unwrap();
    }

    let source = NetCdfCellSource::new(dir.path(), FilenameTemplate::default());
    let err = source.read_cell(1431, None).unwrap_err();
    match err {
        CellIoError::CellCorrupt { cell, reason } => {
            assert_eq!(cell, 1431);
            assert!(reason.contains("units"), "{}", reason);
        }
        other => panic!("expected CellCorrupt, got {:?}", other),
    }
}

#[test]
fn test_custom_filename_template() {
    let dir = temp_test_dir();
    let points = vec![FixturePoint::regular(15.125, 45.125, 0.25)];
    write_ortho_cell(
        &dir.path().join("ts_01431.nc4"),
        &points,
        &[0.0, 1.0],
        &[FixtureVariable::float("sm", vec![vec![0.1, f64::NAN]])],
    )
    .unwrap();

    let source = NetCdfCellSource::new(dir.path(), FilenameTemplate::new("ts_", 5, ".nc4"));
    assert!(source.exists(1431));
    let raw = source.read_cell(1431, None).unwrap();
    let frame = read_cell_wide(&raw, "sm", None).unwrap();
    let column = frame.float_column(&points[0].gpi.to_string()).unwrap();
    assert_eq!(column[0], 0.1);
    assert!(column[1].is_nan());
}

// ============================================================================
// Grid file and cache
// ============================================================================

#[test]
fn test_grid_file_cells_match_fixture() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let grid = read_grid_file(&data.cci_dir.join("grid.nc"), 5.0).unwrap();

    assert_eq!(grid.len(), data.cci_points.len());
    assert_eq!(grid.cells(), vec![points::CCI_POINT_CELL, points::DUMP_CELL]);
    let (gpi, _) = grid
        .find_nearest_gpi(points::CCI_POINT.0, points::CCI_POINT.1, None)
        .unwrap();
    assert_eq!(gpi, data.cci_points[0].gpi);
}

#[test]
fn test_missing_grid_file() {
    let dir = temp_test_dir();
    let err = read_grid_file(&dir.path().join("grid.nc"), 5.0).unwrap_err();
    assert!(matches!(err, CellIoError::InvalidGrid { .. }));
}

#[test]
fn test_cache_serves_repeated_reads() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let source = NetCdfCellSource::new(&data.cci_dir, FilenameTemplate::default());
    let mut cache = CellCache::new(1);

    for cell in [points::DUMP_CELL, points::DUMP_CELL, points::CCI_POINT_CELL] {
        if cache.get(cell).is_none() {
            cache.insert(source.read_cell(cell, None).unwrap());
        }
    }
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.evictions, 1);
}
