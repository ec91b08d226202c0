//! Test data generation utilities.
//!
//! This module writes small NetCDF files laid out like the real inputs:
//! DARDAR products, ERA5 pressure- and single-level downloads and a
//! terrain model.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

// Use the netcdf crate's error type directly
use netcdf::Error;
type Result<T> = std::result::Result<T, Error>;

/// Fill value used for missing retrievals
pub const DARDAR_FILL: f32 = -999.0;

/// Along-track description of a synthetic satellite product
pub struct ProfileSpec<'a> {
    pub latitude: &'a [f64],
    pub longitude: &'a [f64],
    /// Height axis [m], top down like the real product
    pub height: &'a [f64],
    /// Seconds since the first sample
    pub time: Option<&'a [f64]>,
}

/// Creates a DARDAR-like product.
///
/// `iwc` is `1e-5 * (sample + 1)` with every sample's topmost bin missing;
/// `Z` is `-10 dBZ` everywhere.
pub fn create_dardar_nc(path: &Path, spec: &ProfileSpec) -> Result<()> {
    let n = spec.latitude.len();
    let nh = spec.height.len();
    let mut file = netcdf::create(path)?;

    file.add_dimension("time", n)?;
    file.add_dimension("height", nh)?;
    file.add_attribute("title", "Synthetic DARDAR-CLOUD granule")?;

    {
        let mut var = file.add_variable::<f64>("latitude", &["time"])?;
        var.put_attribute("units", "degrees_north")?;
        var.put_values(spec.latitude, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("longitude", &["time"])?;
        var.put_attribute("units", "degrees_east")?;
        var.put_values(spec.longitude, ..)?;
    }
    {
        let mut var = file.add_variable::<f32>("height", &["height"])?;
        var.put_attribute("units", "m")?;
        let height: Vec<f32> = spec.height.iter().map(|&h| h as f32).collect();
        var.put_values(&height, ..)?;
    }
    if let Some(time) = spec.time {
        let mut var = file.add_variable::<f64>("time", &["time"])?;
        var.put_attribute("units", "seconds")?;
        var.put_values(time, ..)?;
    }
    {
        let mut var = file.add_variable::<f32>("iwc", &["time", "height"])?;
        var.put_attribute("units", "kg m-3")?;
        var.put_attribute("_FillValue", DARDAR_FILL)?;
        let mut values = Vec::with_capacity(n * nh);
        for i in 0..n {
            for k in 0..nh {
                values.push(if k == 0 {
                    DARDAR_FILL
                } else {
                    1e-5 * (i + 1) as f32
                });
            }
        }
        var.put_values(&values, ..)?;
    }
    {
        let mut var = file.add_variable::<f32>("Z", &["time", "height"])?;
        var.put_attribute("units", "dBZ")?;
        var.put_values(&vec![-10.0f32; n * nh], ..)?;
    }

    Ok(())
}

/// Hours since 1900-01-01, the ERA5 time convention
pub fn era5_hours(time: NaiveDateTime) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (time - epoch).num_hours() as i32
}

/// 30 degree global ERA5-style grid: latitudes north to south, longitudes 0..330
pub fn era5_axes() -> (Vec<f32>, Vec<f32>) {
    let latitude = (0..7).map(|i| 90.0 - 30.0 * i as f32).collect();
    let longitude = (0..12).map(|i| 30.0 * i as f32).collect();
    (latitude, longitude)
}

fn add_era5_coordinates(
    file: &mut netcdf::FileMut,
    hour: NaiveDateTime,
    latitude: &[f32],
    longitude: &[f32],
) -> Result<()> {
    file.add_dimension("time", 1)?;
    file.add_dimension("latitude", latitude.len())?;
    file.add_dimension("longitude", longitude.len())?;
    file.add_attribute("Conventions", "CF-1.6")?;

    {
        let mut var = file.add_variable::<f32>("latitude", &["latitude"])?;
        var.put_attribute("units", "degrees_north")?;
        var.put_values(latitude, ..)?;
    }
    {
        let mut var = file.add_variable::<f32>("longitude", &["longitude"])?;
        var.put_attribute("units", "degrees_east")?;
        var.put_values(longitude, ..)?;
    }
    {
        let mut var = file.add_variable::<i32>("time", &["time"])?;
        var.put_attribute("units", "hours since 1900-01-01 00:00:00.0")?;
        var.put_values(&[era5_hours(hour)], ..)?;
    }
    Ok(())
}

/// Creates an ERA5 pressure-level file with `value(level_hpa, lat, lon)`
pub fn create_era5_pressure_level_nc<F>(
    path: &Path,
    short_name: &str,
    hour: NaiveDateTime,
    levels_hpa: &[i32],
    value: F,
) -> Result<()>
where
    F: Fn(f64, f64, f64) -> f64,
{
    let (latitude, longitude) = era5_axes();
    let mut file = netcdf::create(path)?;
    add_era5_coordinates(&mut file, hour, &latitude, &longitude)?;
    file.add_dimension("level", levels_hpa.len())?;

    {
        let mut var = file.add_variable::<i32>("level", &["level"])?;
        var.put_attribute("units", "millibars")?;
        var.put_values(levels_hpa, ..)?;
    }

    let mut values = Vec::with_capacity(levels_hpa.len() * latitude.len() * longitude.len());
    for &level in levels_hpa {
        for &lat in &latitude {
            for &lon in &longitude {
                values.push(value(level as f64, lat as f64, lon as f64));
            }
        }
    }
    {
        let mut var =
            file.add_variable::<f64>(short_name, &["time", "level", "latitude", "longitude"])?;
        var.put_values(&values, ..)?;
    }

    Ok(())
}

/// Creates an ERA5 single-level file packed as 16-bit integers, the way
/// the CDS delivers them
pub fn create_era5_single_level_nc(
    path: &Path,
    short_name: &str,
    hour: NaiveDateTime,
    value: f64,
) -> Result<()> {
    let (latitude, longitude) = era5_axes();
    let mut file = netcdf::create(path)?;
    add_era5_coordinates(&mut file, hour, &latitude, &longitude)?;

    let scale = 0.001;
    let offset = value - 1.0;
    let packed = ((value - offset) / scale).round() as i16;
    {
        let mut var = file.add_variable::<i16>(short_name, &["time", "latitude", "longitude"])?;
        var.put_attribute("scale_factor", scale)?;
        var.put_attribute("add_offset", offset)?;
        var.put_attribute("_FillValue", -32767i16)?;
        var.put_values(&vec![packed; latitude.len() * longitude.len()], ..)?;
    }

    Ok(())
}

/// Creates a global 1-degree terrain model with constant elevation
pub fn create_dem_nc(path: &Path, elevation: f64) -> Result<()> {
    let latitude: Vec<f64> = (0..181).map(|i| -90.0 + i as f64).collect();
    let longitude: Vec<f64> = (0..360).map(|i| -180.0 + i as f64).collect();
    let mut file = netcdf::create(path)?;

    file.add_dimension("lat", latitude.len())?;
    file.add_dimension("lon", longitude.len())?;

    {
        let mut var = file.add_variable::<f64>("lat", &["lat"])?;
        var.put_values(&latitude, ..)?;
    }
    {
        let mut var = file.add_variable::<f64>("lon", &["lon"])?;
        var.put_values(&longitude, ..)?;
    }
    {
        let mut var = file.add_variable::<f32>("elevation", &["lat", "lon"])?;
        var.put_attribute("units", "m")?;
        var.put_values(&vec![elevation as f32; latitude.len() * longitude.len()], ..)?;
    }

    Ok(())
}
