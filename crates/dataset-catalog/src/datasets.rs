//! Built-in dataset table.
//!
//! Each product declares its path groups in resolution order. The `__test`
//! group points below `{testdata}` and is found only when a test data
//! directory is configured.

use cell_io::CellLayout;
use once_cell::sync::Lazy;

use crate::catalog::{Catalog, DatasetBinding, DatasetId, GridDefinition, ReaderKind};
use crate::paths::{HostOs, PathConfig, PathGroup, TEST_GROUP};

pub(crate) static BUILTIN: Lazy<Catalog> = Lazy::new(build);

/// Fill value of ESA CCI and C3S soil moisture products.
pub const CCI_FILL: f64 = -9999.0;

fn paths(local: (Option<String>, Option<String>), radar: Option<String>, test: &str) -> PathConfig {
    PathConfig::default()
        .group(
            PathGroup::new("local")
                .with(HostOs::Win, local.0.as_deref())
                .with(HostOs::Lin, local.1.as_deref()),
        )
        .group(
            PathGroup::new("radar")
                .with(HostOs::Win, None)
                .with(HostOs::Lin, radar.as_deref()),
        )
        .group(PathGroup::everywhere(TEST_GROUP, &format!("{{testdata}}/{}", test)))
}

fn esa_cci() -> Vec<DatasetBinding> {
    ["COMBINED", "ACTIVE", "PASSIVE"]
        .into_iter()
        .map(|product| {
            let lower = product.to_lowercase();
            let parameters: &[&str] = if product == "ACTIVE" {
                &["sm", "sm_uncertainty", "flag", "t0"]
            } else {
                &["sm", "sm_uncertainty", "flag", "dnflag", "mode", "t0"]
            };
            DatasetBinding::gridded(
                DatasetId::new(["ESA_CCI_SM", "v061", product]),
                parameters,
                paths(
                    (
                        Some(format!(r"D:\data-read\ESA_CCI_SM\v06.1\{}\timeseries", product)),
                        Some(format!("/data-read/ESA_CCI_SM/v06.1/{}/timeseries", product)),
                    ),
                    Some(format!("/home/radar/Datapool/ESA_CCI_SM/v06.1/{}/timeseries", lower)),
                    &format!("esa_cci_sm/v061/{}", lower),
                ),
            )
            .with_fill_value("sm", CCI_FILL)
            .with_fill_value("sm_uncertainty", CCI_FILL)
            .with_fill_value("t0", CCI_FILL)
            .with_t0("t0")
        })
        .collect()
}

fn c3s() -> Vec<DatasetBinding> {
    let mut out = Vec::new();
    for product in ["COMBINED", "ACTIVE", "PASSIVE"] {
        for record in ["TCDR", "ICDR"] {
            let lower = format!("{}/daily/{}", product.to_lowercase(), record.to_lowercase());
            out.push(
                DatasetBinding::gridded(
                    DatasetId::new(["C3S_SM", "v202212", product, "DAILY", record]),
                    &["sm", "sm_uncertainty", "flag", "t0"],
                    paths(
                        (
                            Some(format!(r"D:\data-read\C3S\v202212\{}\DAILY\{}", product, record)),
                            None,
                        ),
                        Some(format!(
                            "/home/radar/Datapool/C3S/v202212/{}/datasets/timeseries",
                            lower
                        )),
                        &format!("c3s_sm/v202212/{}", lower),
                    ),
                )
                .with_layout(CellLayout::ContiguousRagged)
                .with_fill_value("sm", CCI_FILL)
                .with_fill_value("t0", CCI_FILL)
                .with_t0("t0"),
            );
        }
    }
    out
}

fn era5() -> Vec<DatasetBinding> {
    [("ERA5", "era5"), ("ERA5-Land", "era5_land")]
        .into_iter()
        .map(|(family, dir)| {
            DatasetBinding::gridded(
                DatasetId::new([family, "v2023"]),
                &["swvl1", "swvl2", "stl1", "tp"],
                paths(
                    (
                        Some(format!(r"D:\data-read\{}\timeseries", family)),
                        Some(format!("/data-read/{}/timeseries", family)),
                    ),
                    None,
                    dir,
                ),
            )
            .with_grid(GridDefinition::Regular { resolution: 0.25 })
            // volumetric soil water in percent
            .with_scale_factor("swvl1", 100.0)
            .with_scale_factor("swvl2", 100.0)
        })
        .collect()
}

fn gldas() -> Vec<DatasetBinding> {
    vec![DatasetBinding::gridded(
        DatasetId::new(["GLDAS", "Noah", "v21", "3H"]),
        &["SoilMoi0_10cm_inst", "SoilTMP0_10cm_inst"],
        paths(
            (
                Some(r"D:\data-read\GLDAS_NOAH025_3H.2.1\timeseries".to_string()),
                Some("/data-read/GLDAS_NOAH025_3H.2.1/timeseries".to_string()),
            ),
            Some("/home/radar/Datapool/GLDAS/02_processed/GLDAS_NOAH025_3H.2.1/datasets".to_string()),
            "gldas/noah/v21/3h",
        ),
    )
    .with_fill_value("SoilMoi0_10cm_inst", -9999.0)
    .with_fill_value("SoilTMP0_10cm_inst", -9999.0)
    .with_grid(GridDefinition::Regular { resolution: 0.25 })
    // kg/m2 in the top 10 cm to m3/m3
    .with_scale_factor("SoilMoi0_10cm_inst", 0.01)]
}

fn smap() -> Vec<DatasetBinding> {
    ["AM", "PM"]
        .into_iter()
        .map(|overpass| {
            DatasetBinding::gridded(
                DatasetId::new(["SMAP", "SPL3SMP", "v8", overpass]),
                &["soil_moisture", "retrieval_qual_flag", "tb_time_utc"],
                paths(
                    (
                        Some(format!(r"D:\data-read\SMAP\SPL3SMP.008\{}\timeseries", overpass)),
                        Some(format!("/data-read/SMAP/SPL3SMP.008/{}/timeseries", overpass)),
                    ),
                    None,
                    &format!("smap/spl3smp/v8/{}", overpass.to_lowercase()),
                ),
            )
            .with_layout(CellLayout::ContiguousRagged)
            .with_fill_value("soil_moisture", -9999.0)
        })
        .collect()
}

fn ismn() -> Vec<DatasetBinding> {
    vec![DatasetBinding::gridded(
        DatasetId::new(["ISMN", "v20230110"]),
        &["soil_moisture"],
        paths(
            (
                Some(r"D:\data-read\ISMN\global_20230110".to_string()),
                Some("/data-read/ISMN/global_20230110".to_string()),
            ),
            Some("/home/radar/Datapool/ISMN/01_raw/global_20230110".to_string()),
            "ismn",
        ),
    )
    .with_reader(ReaderKind::Insitu)]
}

fn build() -> Catalog {
    [esa_cci(), c3s(), era5(), gldas(), smap(), ismn()]
        .into_iter()
        .flatten()
        .fold(Catalog::new(), Catalog::with_entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let catalog = Catalog::builtin();
        catalog.validate().unwrap();
        for family in ["ESA_CCI_SM", "C3S_SM", "ERA5", "ERA5-Land", "GLDAS", "SMAP", "ISMN"] {
            assert!(!catalog.family_ids(family).is_empty(), "{family}");
        }
        assert_eq!(catalog.family_ids("C3S_SM").len(), 6);
    }

    #[test]
    fn test_every_entry_has_test_group_last() {
        for id in Catalog::builtin().ids() {
            let binding = Catalog::builtin().lookup(id).unwrap();
            assert_eq!(binding.paths.group_names().last(), Some(&TEST_GROUP), "{id}");
        }
    }

    #[test]
    fn test_cci_combined_binding() {
        let id = DatasetId::new(["ESA_CCI_SM", "v061", "COMBINED"]);
        let binding = Catalog::builtin().lookup(&id).unwrap();
        assert_eq!(binding.layout, CellLayout::OrthoMulti);
        assert_eq!(binding.t0_column.as_deref(), Some("t0"));
        assert_eq!(binding.fill_values.get("sm"), Some(&CCI_FILL));
        assert_eq!(
            binding.paths.get(TEST_GROUP).unwrap().candidate(HostOs::Lin),
            Some("{testdata}/esa_cci_sm/v061/combined")
        );
    }
}
