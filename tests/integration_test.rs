//! Integration tests for dardar-atm
//!
//! These tests run the pipeline end-to-end on synthetic product, reanalysis
//! and terrain files written to temporary directories.

mod common;

use chrono::{NaiveDate, NaiveDateTime};
use common::assertions::{assert_all_approx, assert_approx_eq, assert_in_range};
use common::test_data::{self, ProfileSpec};
use dardar_atm::builder::{self, AtmosphericStateBuilder, StateInputs};
use dardar_atm::interpolation::get_interpolator;
use dardar_atm::output::{write_pass, Manifest, MANIFEST_FILE};
use dardar_atm::reanalysis::{era5_filename, FieldSource, LevelKind, LocalArchive};
use dardar_atm::{AtmError, ElevationGrid, OrbitNode, ProfileReader, DEFAULT_PRESSURE_GRID};
use pretty_assertions::assert_eq;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GRANULE: &str = "DARDAR-CLOUD_v2.1.1_2015310114257_50670.nc";
const LEVELS_HPA: [i32; 7] = [1, 10, 100, 300, 500, 850, 1000];
const HEIGHTS: [f64; 5] = [20_000.0, 10_000.0, 5_000.0, 1_000.0, 0.0];

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_yo_opt(2015, 310)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Writes every ERA5 file the standard state needs for one analysis hour
fn write_reanalysis(dir: &Path, hour: NaiveDateTime, temperature: f64) {
    let pressure_levels = [
        ("temperature", "t", temperature),
        ("geopotential", "z", 9.80665 * 1_000.0),
        ("specific_cloud_liquid_water_content", "clwc", 1e-4),
        ("specific_humidity", "q", 0.005),
    ];
    for (variable, short, value) in pressure_levels {
        let path = dir.join(era5_filename(LevelKind::PressureLevels, hour, variable));
        test_data::create_era5_pressure_level_nc(&path, short, hour, &LEVELS_HPA, |_, _, _| value)
            .unwrap();
    }

    let single_levels = [
        ("skin_temperature", "skt", 290.0),
        ("2m_temperature", "t2m", 288.0),
        ("10m_u_component_of_wind", "u10", -3.0),
        ("10m_v_component_of_wind", "v10", 4.0),
    ];
    for (variable, short, value) in single_levels {
        let path = dir.join(era5_filename(LevelKind::SingleLevels, hour, variable));
        test_data::create_era5_single_level_nc(&path, short, hour, value).unwrap();
    }
}

struct Workspace {
    _dir: TempDir,
    granule: PathBuf,
    era5: PathBuf,
    dem: PathBuf,
    output: PathBuf,
}

fn workspace(granule_name: &str, spec: &ProfileSpec) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let granule = dir.path().join(granule_name);
    let era5 = dir.path().join("ERA5");
    let dem = dir.path().join("dem.nc");
    let output = dir.path().join("output");
    std::fs::create_dir_all(&era5).unwrap();
    std::fs::create_dir_all(&output).unwrap();

    test_data::create_dardar_nc(&granule, spec).unwrap();
    test_data::create_dem_nc(&dem, 75.0).unwrap();

    Workspace {
        _dir: dir,
        granule,
        era5,
        dem,
        output,
    }
}

#[test]
fn test_end_to_end_uniform_atmosphere() {
    let ws = workspace(
        GRANULE,
        &ProfileSpec {
            latitude: &[0.0],
            longitude: &[0.0],
            height: &HEIGHTS,
            time: None,
        },
    );
    // 11:42:57 belongs to the 12 UTC analysis
    write_reanalysis(&ws.era5, at(12, 0), 250.0);

    let profile = ProfileReader::open(&ws.granule, None)
        .unwrap()
        .with_node(OrbitNode::All)
        .unwrap();
    let archive = LocalArchive::new(&ws.era5);
    let terrain = ElevationGrid::open(&ws.dem).unwrap();
    let inputs = StateInputs {
        profile: &profile,
        source: &archive,
        terrain: Some(&terrain),
        pressure_grid: &DEFAULT_PRESSURE_GRID,
        interpolation: "bilinear",
    };

    let state = AtmosphericStateBuilder::new(inputs).build().unwrap();
    assert_eq!(state.len(), 13);
    assert_eq!(state.pass().output_name(), "2015_310_11_ALL");

    let temperature = state.get("temperature").unwrap();
    assert_eq!(temperature.shape(), &[38, 1, 1]);
    assert_all_approx(temperature.iter(), 250.0, Some(1e-9));

    assert_all_approx(state.get("geopotential_height").unwrap().iter(), 1_000.0, Some(1e-6));

    let h2o = 0.005 / 0.995;
    let vmr = state.get("water_vapor_volume_mixing_ratio").unwrap();
    assert_eq!(vmr.shape(), &[1, 38, 1, 1]);
    assert_all_approx(vmr.iter(), h2o, Some(1e-12));
    assert_all_approx(state.get("nitrogen_vmr").unwrap().iter(), 0.781 * (1.0 - h2o), Some(1e-12));
    assert_all_approx(state.get("oxygen_vmr").unwrap().iter(), 0.209 * (1.0 - h2o), Some(1e-12));

    let clwc = state.get("cloud_liquid_water_content").unwrap();
    for (i, &p) in DEFAULT_PRESSURE_GRID.iter().enumerate() {
        let expected = 1e-4 * p / (287.057 * 250.0);
        assert_approx_eq(clwc[[0, i, 0, 0]], expected, Some(1e-12));
    }

    // The topmost DARDAR bin is missing, so only levels below 10 km are filled
    let iwc = state.get("ice_water_content").unwrap();
    for (i, &p) in DEFAULT_PRESSURE_GRID.iter().enumerate() {
        if p >= 30_000.0 {
            assert_approx_eq(iwc[[0, i, 0, 0]], 1e-5, Some(1e-9));
        }
    }
    assert!(iwc[[0, 0, 0, 0]].is_nan());
    assert_all_approx(state.get("radar_reflectivity").unwrap().iter(), -10.0, Some(1e-9));

    let elevation = state.get("surface_elevation").unwrap();
    assert_eq!(elevation.shape(), &[1, 1]);
    assert_approx_eq(elevation[[0, 0]], 75.0, None);
    assert_approx_eq(state.get("skin_temperature").unwrap()[[0, 0]], 290.0, Some(1e-6));
    assert_approx_eq(state.get("2m_temperature").unwrap()[[0, 0]], 288.0, Some(1e-6));
    assert_approx_eq(state.get("10m_wind_speed").unwrap()[[0, 0]], 5.0, Some(1e-6));
    assert_approx_eq(
        state.get("10m_wind_direction").unwrap()[[0, 0]],
        (-3.0f64).atan2(4.0).to_degrees(),
        Some(1e-5),
    );

    let archive_path = write_pass(&state, &ws.output, false).unwrap();
    assert_eq!(archive_path, ws.output.join("2015_310_11_ALL.zip"));
    assert!(!ws.output.join("2015_310_11_ALL").exists());

    let mut zip = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    assert_eq!(zip.len(), 13 + 4);
    let mut json = String::new();
    zip.by_name(MANIFEST_FILE)
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();
    let manifest: Manifest = serde_json::from_str(&json).unwrap();
    assert_eq!(manifest.samples, 1);
    assert_eq!(manifest.levels, 38);
    assert_eq!(manifest.abs_species, vec!["N2", "O2", "H2O", "LWC"]);
    assert_eq!(manifest.node, OrbitNode::All);
}

#[test]
fn test_latitude_band_from_file() {
    let ws = workspace(
        GRANULE,
        &ProfileSpec {
            latitude: &[-40.0, -10.0, 0.0, 25.0, 50.0],
            longitude: &[0.0; 5],
            height: &[1_000.0, 0.0],
            time: None,
        },
    );

    let profile = ProfileReader::open(&ws.granule, Some((-30.0, 30.0))).unwrap();
    assert_eq!(profile.len(), 3);
    assert_eq!(
        profile.get_1d("latitude").unwrap().to_vec(),
        vec![-10.0, 0.0, 25.0]
    );
    assert_eq!(profile.get("height").unwrap().len(), 2);

    let iwc = profile.get("iwc").unwrap();
    assert_eq!(iwc.shape(), &[3, 2]);
    assert!(iwc[[0, 0]].is_nan());
    assert_approx_eq(iwc[[0, 1]], 2e-5, Some(1e-10));
    assert_approx_eq(iwc[[2, 1]], 4e-5, Some(1e-10));

    assert!(matches!(
        profile.get("cloud_mask"),
        Err(AtmError::UnknownVariable { .. })
    ));
}

#[test]
fn test_samples_use_their_own_analysis_hour() {
    let ws = workspace(
        "DARDAR-CLOUD_v2.1.1_2015310111500_50670.nc",
        &ProfileSpec {
            latitude: &[-1.0, 0.0, 1.0],
            longitude: &[359.0, 0.0, 1.0],
            height: &HEIGHTS,
            time: Some(&[0.0, 1_200.0, 2_400.0]),
        },
    );
    write_reanalysis(&ws.era5, at(11, 0), 240.0);
    write_reanalysis(&ws.era5, at(12, 0), 260.0);

    let profile = ProfileReader::open(&ws.granule, None).unwrap();
    assert_eq!(profile.start_time().unwrap(), at(11, 15));
    assert_eq!(profile.end_time().unwrap(), at(11, 55));

    let archive = LocalArchive::new(&ws.era5);
    let grid = [50_000.0, 85_000.0];
    let inputs = StateInputs {
        profile: &profile,
        source: &archive,
        terrain: None,
        pressure_grid: &grid,
        interpolation: "bilinear",
    };
    let temperature = builder::temperature(&inputs).unwrap();
    assert_eq!(temperature.shape(), &[2, 3, 1]);
    for level in 0..2 {
        assert_approx_eq(temperature[[level, 0, 0]], 240.0, Some(1e-9));
        assert_approx_eq(temperature[[level, 1, 0]], 260.0, Some(1e-9));
        assert_approx_eq(temperature[[level, 2, 0]], 260.0, Some(1e-9));
    }
}

#[test]
fn test_missing_reanalysis_is_a_coverage_error() {
    let ws = workspace(
        GRANULE,
        &ProfileSpec {
            latitude: &[0.0],
            longitude: &[0.0],
            height: &HEIGHTS,
            time: None,
        },
    );

    let profile = ProfileReader::open(&ws.granule, None).unwrap();
    let archive = LocalArchive::new(&ws.era5);
    let inputs = StateInputs {
        profile: &profile,
        source: &archive,
        terrain: None,
        pressure_grid: &DEFAULT_PRESSURE_GRID,
        interpolation: "bilinear",
    };
    assert!(matches!(
        builder::temperature(&inputs),
        Err(AtmError::Coverage { .. })
    ));
    assert!(matches!(
        builder::skin_temperature(&inputs),
        Err(AtmError::Coverage { .. })
    ));
}

#[test]
fn test_pressure_level_file_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let hour = at(12, 0);
    let path = dir
        .path()
        .join(era5_filename(LevelKind::PressureLevels, hour, "temperature"));
    test_data::create_era5_pressure_level_nc(&path, "t", hour, &LEVELS_HPA, |level, lat, lon| {
        level + lat + lon / 1000.0
    })
    .unwrap();

    let archive = LocalArchive::new(dir.path());
    let field = archive
        .load_field(LevelKind::PressureLevels, "temperature", hour)
        .unwrap();
    let levels: Vec<f64> = LEVELS_HPA.iter().map(|&p| p as f64 * 100.0).collect();
    assert_eq!(field.levels().unwrap(), levels.as_slice());
    assert!(field.is_periodic());

    let bilinear = get_interpolator("bilinear").unwrap();
    // Level index 4 is 500 hPa
    let value = field.sample(bilinear.as_ref(), 4, 15.0, 45.0).unwrap();
    assert_approx_eq(value, 500.0 + 15.0 + 0.045, Some(1e-9));

    // Requested as the wrong product kind
    assert!(archive
        .load_field(LevelKind::SingleLevels, "temperature", hour)
        .is_err());
    // Hour not in the archive
    assert!(matches!(
        archive.load_field(LevelKind::PressureLevels, "temperature", at(13, 0)),
        Err(AtmError::Coverage { .. })
    ));
}

#[test]
fn test_orbit_segments_from_file() {
    let ws = workspace(
        GRANULE,
        &ProfileSpec {
            latitude: &[-60.0, -20.0, 20.0, 60.0, 20.0, -20.0, -60.0],
            longitude: &[0.0; 7],
            height: &[0.0],
            time: None,
        },
    );

    let ascending = ProfileReader::open(&ws.granule, None)
        .unwrap()
        .with_node(OrbitNode::Ascending)
        .unwrap();
    assert_eq!(
        ascending.get_1d("latitude").unwrap().to_vec(),
        vec![-60.0, -20.0, 20.0]
    );

    let south = ProfileReader::open(&ws.granule, None)
        .unwrap()
        .with_node(OrbitNode::DescendingSouth)
        .unwrap();
    for lat in south.get_1d("latitude").unwrap().iter() {
        assert_in_range(*lat, -90.0, 0.0);
    }

    let result = ProfileReader::open(&ws.granule, Some((30.0, 90.0)))
        .unwrap()
        .with_node(OrbitNode::DescendingSouth);
    assert!(matches!(result, Err(AtmError::MissingPass { .. })));
}
