//! Facade pipelines over the generated fixture tree.

use chrono::{Duration, NaiveDate};
use dataset_catalog::{Catalog, DatasetId, PathResolver, TEST_GROUP};
use reader_facade::{FacadeConfig, NanPolicy, ReadOutcome, ReaderFacade};
use smio_common::{DateRange, Frame, Location, Value};
use test_utils::{
    assert_series_approx_eq, init_test_logging, points, temp_test_dir, write_testdata, TestData,
};
use ts_adapters::{AdapterDescriptor, AnomalyClimParams, CombineFunc, MaskOp, Reducer};
use ts_reader::{DepthRange, ReadMethod, ReadOptions, ReaderConfig};

fn cci_id() -> DatasetId {
    DatasetId::new(["ESA_CCI_SM", "v061", "COMBINED"])
}

fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn cci_config(data: &TestData) -> FacadeConfig {
    let mut config = FacadeConfig::for_dataset(cci_id()).with_reader(
        ReaderConfig::default()
            .with_parameters(&["sm", "flag"])
            .with_testdata_dir(&data.root),
    );
    config.force_path_group = Some(TEST_GROUP.to_string());
    config
}

fn build(config: FacadeConfig) -> ReaderFacade {
    ReaderFacade::with_catalog(config, Catalog::builtin(), PathResolver::default()).unwrap()
}

fn cci_point() -> Location {
    Location::LonLat(points::CCI_POINT.0, points::CCI_POINT.1)
}

fn assert_frames_match(a: &Frame, b: &Frame) {
    assert_eq!(a.index(), b.index());
    assert_eq!(a.column_names(), b.column_names());
    for name in a.column_names() {
        assert_series_approx_eq!(a.float_column(name).unwrap(), b.float_column(name).unwrap(), 1e-12);
    }
}

#[test]
fn test_masked_anomaly_pipeline() {
    init_test_logging();
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();

    let anomaly = AnomalyClimParams {
        timespan: Some(DateRange::new(date(1991, 1, 1), date(2010, 12, 31))),
        moving_avg_clim: 30.0,
        wraparound: true,
        ..AnomalyClimParams::new(&["sm"])
    };
    let config = cci_config(&data)
        .with_adapter("01-mask", AdapterDescriptor::self_mask("flag", MaskOp::Eq, 0.0))
        .with_adapter("02-anomaly", AdapterDescriptor::AnomalyClim(anomaly))
        .with_resample("10D", CombineFunc::Named(Reducer::Mean))
        .with_rename("sm", "esa_cci_sm");
    let mut facade = build(config);
    assert_eq!(facade.adapter_names(), vec!["01-mask", "02-anomaly"]);

    let frame = facade.read(&cci_point()).unwrap();
    assert_eq!(frame.column_names(), vec!["esa_cci_sm", "flag"]);
    assert!(frame
        .float_column("flag")
        .unwrap()
        .iter()
        .filter(|f| !f.is_nan())
        .all(|f| *f == 0.0));
    let sm = frame.float_column("esa_cci_sm").unwrap();
    assert!(sm.iter().any(|v| *v < 0.0));
    assert!(sm.iter().any(|v| *v > 0.0));
    assert!(frame
        .index()
        .windows(2)
        .all(|w| w[1] - w[0] == Duration::days(10)));
}

#[test]
fn test_mask_soundness_through_facade() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let config = cci_config(&data)
        .with_adapter("01-mask", AdapterDescriptor::self_mask("flag", MaskOp::Eq, 1.0));
    let mut facade = build(config);

    let frame = facade.read(&cci_point()).unwrap();
    assert!(!frame.is_empty());
    assert!(frame.len() < data.cci_times.len() / 4);
    assert!(frame.float_column("flag").unwrap().iter().all(|f| *f == 1.0));
}

#[test]
fn test_nearest_station_with_flag_mask() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let mut config = FacadeConfig::for_dataset(DatasetId::new(["ISMN", "v20230110"]))
        .with_reader(ReaderConfig::default().with_testdata_dir(&data.root))
        .with_read_method(ReadMethod::ReadNearest)
        .with_adapter("01-mask", AdapterDescriptor::self_mask("flag", MaskOp::Eq, "G"));
    config.read_options = ReadOptions {
        variable: Some("soil_moisture".to_string()),
        depth: Some(DepthRange::new(0.0, 0.1)),
        only_valid_flag: false,
    };
    config.force_path_group = Some(TEST_GROUP.to_string());
    let mut facade = build(config);

    let (lon, lat) = points::SILVERSWORD_QUERY;
    let nearest = facade
        .reader()
        .as_insitu()
        .unwrap()
        .find_nearest_station(lon, lat, None)
        .unwrap();
    assert_eq!(nearest.station, "SilverSword");

    let frame = facade.read(&Location::LonLat(lon, lat)).unwrap();
    assert!(!frame.is_empty());
    let flags = frame.column("flag").unwrap().as_text().unwrap();
    assert!(flags.iter().all(|f| f.as_deref() == Some("G")));
    assert!(frame
        .float_column("soil_moisture")
        .unwrap()
        .iter()
        .any(|v| !v.is_nan()));
}

#[test]
fn test_remove_nans_is_idempotent() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let config = cci_config(&data).with_remove_nans(NanPolicy::Scalar(Value::Float(0.0)));
    let mut facade = build(config);

    let once = facade.read(&cci_point()).unwrap();
    assert!(once.float_column("flag").unwrap().iter().all(|f| *f != 0.0));
    let twice = facade.post_process(once.clone()).unwrap();
    assert_frames_match(&once, &twice);
}

#[test]
fn test_resample_at_native_frequency() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let clip = DateRange::new(date(2004, 1, 1), date(2004, 12, 31));
    let mut plain_config = cci_config(&data);
    plain_config.reader = plain_config.reader.with_clip_dates(clip);
    let resampled_config = plain_config
        .clone()
        .with_resample("1D", CombineFunc::Named(Reducer::Mean));

    let plain = build(plain_config).read(&cci_point()).unwrap();
    let resampled = build(resampled_config).read(&cci_point()).unwrap();
    assert_eq!(plain.len(), 366);
    assert_frames_match(&plain, &resampled);
}

#[test]
fn test_rename_keeps_columns_and_rejects_duplicates() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();

    let config = cci_config(&data)
        .with_rename("sm", "soil_moisture")
        .with_rename("not_read", "ignored");
    let frame = build(config).read(&cci_point()).unwrap();
    assert_eq!(frame.column_names(), vec!["soil_moisture", "flag"]);

    let clash = cci_config(&data).with_rename("sm", "flag");
    let err = build(clash).read(&cci_point()).unwrap_err();
    assert_eq!(err.kind(), "ConfigurationError");
}

#[test]
fn test_month_filter_blank_and_drop() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let clip = DateRange::new(date(2005, 1, 1), date(2005, 12, 31));

    let mut blank = cci_config(&data).with_filter_months(&[6, 7, 8], false);
    blank.reader = blank.reader.with_clip_dates(clip);
    let mut dropped = blank.clone();
    dropped.drop_filtered_months = true;

    let blanked = build(blank).read(&cci_point()).unwrap();
    assert_eq!(blanked.len(), 365);
    let flag = blanked.float_column("flag").unwrap();
    assert!(flag[..151].iter().all(|f| f.is_nan()));
    assert!(flag[151..243].iter().all(|f| !f.is_nan()));

    let kept = build(dropped).read(&cci_point()).unwrap();
    assert_eq!(kept.len(), 92);
}

#[test]
fn test_read_multiple_skips_failures() {
    init_test_logging();
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let config = cci_config(&data).with_reader(
        ReaderConfig::default()
            .with_parameters(&["sm", "flag"])
            .with_testdata_dir(&data.root)
            .with_read_bulk(true),
    );
    let mut facade = build(config);

    let near = data.cci_points_in_cell(points::CCI_POINT_CELL)[0].gpi;
    let far = data.cci_points_in_cell(points::DUMP_CELL)[0].gpi;
    let locations = vec![
        Location::Gpi(far),
        cci_point(),
        Location::Gpi(u64::MAX),
        Location::Gpi(near),
    ];
    let multi = facade.read_multiple(&locations, "sm").unwrap();

    assert_eq!(multi.report.outcomes.len(), 4);
    assert_eq!(multi.report.succeeded(), 3);
    assert!(matches!(
        multi.report.outcome(&Location::Gpi(u64::MAX)),
        Some(ReadOutcome::Failed { kind, .. }) if kind == "UnknownLocation"
    ));

    let mut columns = multi.frame.column_names();
    columns.sort();
    let mut expected = vec![near.to_string(), far.to_string()];
    expected.sort();
    assert_eq!(columns, expected);
    assert!(multi.frame.is_strictly_increasing());
    assert_eq!(multi.frame.len(), data.cci_times.len());
}

#[test]
fn test_unsupported_read_method() {
    let dir = temp_test_dir();
    let data = write_testdata(dir.path()).unwrap();
    let config = cci_config(&data).with_read_method(ReadMethod::ReadNearest);
    let err = ReaderFacade::with_catalog(config, Catalog::builtin(), PathResolver::default())
        .unwrap_err();
    assert_eq!(err.kind(), "ConfigurationError");
}
