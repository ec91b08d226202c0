//! ERA5 reanalysis fields and their collocation with a satellite track.
//!
//! Reanalysis data arrives as one file per (hour, variable). A
//! [`FieldSource`] hands out decoded [`ReanalysisField`]s for an analysis
//! hour; a [`ReanalysisProvider`] gathers the hours spanning a pass and
//! samples them along the track: nearest analysis hour in time, bilinear (or
//! nearest) in latitude/longitude, and optionally log-pressure in the
//! vertical.

use chrono::{Duration, NaiveDateTime, Timelike};
use ndarray::{Array2, Array3, ArrayD, Axis, Ix3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data_loader::{load_dataset, Dataset};
use crate::error::{AtmError, Result};
use crate::interpolation::common::{
    align_longitude, coord_to_index, is_global_longitude, is_strictly_monotonic,
};
use crate::interpolation::vertical::{resample_columns, ValueScale};
use crate::interpolation::{get_interpolator, Interpolator};
use crate::profile::{offset_by_seconds, Track};

const LATITUDE_NAMES: &[&str] = &["latitude", "lat"];
const LONGITUDE_NAMES: &[&str] = &["longitude", "lon"];
const LEVEL_NAMES: &[&str] = &["level", "pressure_level", "isobaricInhPa"];
const TIME_NAMES: &[&str] = &["time", "valid_time"];
/// Bookkeeping variables newer CDS files carry alongside the data
const AUXILIARY_NAMES: &[&str] = &["number", "expver"];

/// CDS request names and the short names ERA5 uses inside its files
const ERA5_SHORT_NAMES: &[(&str, &str)] = &[
    ("temperature", "t"),
    ("geopotential", "z"),
    ("specific_humidity", "q"),
    ("specific_cloud_liquid_water_content", "clwc"),
    ("specific_cloud_ice_water_content", "ciwc"),
    ("relative_humidity", "r"),
    ("ozone_mass_mixing_ratio", "o3"),
    ("u_component_of_wind", "u"),
    ("v_component_of_wind", "v"),
    ("skin_temperature", "skt"),
    ("2m_temperature", "t2m"),
    ("10m_u_component_of_wind", "u10"),
    ("10m_v_component_of_wind", "v10"),
    ("surface_pressure", "sp"),
    ("land_sea_mask", "lsm"),
    ("sea_ice_cover", "siconc"),
];

/// Look up the in-file short name of an ERA5 variable
pub fn era5_short_name(variable: &str) -> Option<&'static str> {
    ERA5_SHORT_NAMES
        .iter()
        .find(|(long, _)| *long == variable)
        .map(|(_, short)| *short)
}

/// Vertical structure of a reanalysis product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    /// Values on several isobaric levels
    PressureLevels,
    /// Surface or near-surface values only
    SingleLevels,
}

impl LevelKind {
    /// CDS product name
    pub fn product(&self) -> &'static str {
        match self {
            LevelKind::PressureLevels => "reanalysis-era5-pressure-levels",
            LevelKind::SingleLevels => "reanalysis-era5-single-levels",
        }
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.product())
    }
}

/// Round a time to its analysis hour: minutes past 30 advance to the next hour.
pub fn nearest_hour(time: NaiveDateTime) -> NaiveDateTime {
    let minute = time.minute();
    let truncated = time
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time);
    if minute > 30 {
        truncated + Duration::hours(1)
    } else {
        truncated
    }
}

/// Deterministic file name of one (product, hour, variable) download
pub fn era5_filename(kind: LevelKind, hour: NaiveDateTime, variable: &str) -> String {
    format!(
        "{}_{}_{}.nc",
        kind.product(),
        hour.format("%Y%m%d%H"),
        variable
    )
}

/// One analysis time of one reanalysis variable on a regular grid
#[derive(Debug, Clone)]
pub struct ReanalysisField {
    variable: String,
    valid_time: NaiveDateTime,
    /// Pressure levels [Pa]; `None` for single-level fields
    levels: Option<Vec<f64>>,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    /// `[level, latitude, longitude]`, longitude extended by one wrapped
    /// column when the grid is globally periodic
    values: Array3<f64>,
    periodic: bool,
}

impl ReanalysisField {
    /// Build a field from its axes and a `[level, latitude, longitude]` array.
    ///
    /// Single-level fields pass `levels = None` and a level axis of length 1.
    pub fn new(
        variable: &str,
        valid_time: NaiveDateTime,
        levels: Option<Vec<f64>>,
        latitude: Vec<f64>,
        longitude: Vec<f64>,
        values: Array3<f64>,
    ) -> Result<Self> {
        let (nlev, nlat, nlon) = values.dim();
        let expected_levels = levels.as_ref().map_or(1, Vec::len);
        if nlev != expected_levels || nlat != latitude.len() || nlon != longitude.len() {
            return Err(AtmError::Interpolation {
                message: format!(
                    "Field {} has shape {:?} but axes of length ({}, {}, {})",
                    variable,
                    values.shape(),
                    expected_levels,
                    latitude.len(),
                    longitude.len()
                ),
            });
        }
        for (name, axis) in [("latitude", &latitude), ("longitude", &longitude)] {
            if axis.is_empty() || !is_strictly_monotonic(axis) {
                return Err(AtmError::Interpolation {
                    message: format!("Field {} has a non-monotonic {} axis", variable, name),
                });
            }
        }
        if let Some(levels) = &levels {
            if !is_strictly_monotonic(levels) {
                return Err(AtmError::Interpolation {
                    message: format!("Field {} has a non-monotonic level axis", variable),
                });
            }
        }

        let periodic = is_global_longitude(&longitude);
        let (longitude, values) = if periodic {
            wrap_longitude(longitude, values)
        } else {
            (longitude, values.as_standard_layout().into_owned())
        };

        Ok(Self {
            variable: variable.to_string(),
            valid_time,
            levels,
            latitude,
            longitude,
            values,
            periodic,
        })
    }

    /// Decode a field from an ERA5 NetCDF dataset at the given analysis hour
    pub fn from_dataset(
        dataset: &Dataset,
        kind: LevelKind,
        variable: &str,
        hour: NaiveDateTime,
    ) -> Result<Self> {
        let format_error = |message: String| AtmError::FileFormat {
            path: dataset.path.clone(),
            message,
        };

        let data_name = data_variable_name(dataset, variable).ok_or_else(|| {
            format_error(format!(
                "No data variable for '{}' among {:?}",
                variable,
                dataset.variable_names()
            ))
        })?;
        let raw = dataset.variable_checked(&data_name)?;
        let mut dims: Vec<String> = dataset
            .dimensions_of(&data_name)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let mut array: ArrayD<f64> = raw.clone();

        if let Some(time_axis) = dims.iter().position(|d| TIME_NAMES.contains(&d.as_str())) {
            let index = time_index(dataset, hour, array.shape()[time_axis])?;
            array = array.index_axis(Axis(time_axis), index).to_owned();
            dims.remove(time_axis);
        }

        let find = |names: &[&str]| dims.iter().position(|d| names.contains(&d.as_str()));
        let lat_axis = find(LATITUDE_NAMES)
            .ok_or_else(|| format_error(format!("{} has no latitude dimension", data_name)))?;
        let lon_axis = find(LONGITUDE_NAMES)
            .ok_or_else(|| format_error(format!("{} has no longitude dimension", data_name)))?;
        let level_axis = find(LEVEL_NAMES);

        let (order, levels) = match (kind, level_axis) {
            (LevelKind::PressureLevels, Some(level_axis)) => {
                let (_, hpa) = dataset
                    .find_variable(LEVEL_NAMES)
                    .ok_or_else(|| format_error("Missing pressure level coordinate".to_string()))?;
                let scale = level_scale_to_pa(dataset);
                let levels: Vec<f64> = hpa.iter().map(|p| p * scale).collect();
                (vec![level_axis, lat_axis, lon_axis], Some(levels))
            }
            (LevelKind::PressureLevels, None) => {
                return Err(format_error(format!(
                    "{} is not a pressure-level variable",
                    data_name
                )));
            }
            (LevelKind::SingleLevels, Some(level_axis)) if array.shape()[level_axis] == 1 => {
                (vec![level_axis, lat_axis, lon_axis], None)
            }
            (LevelKind::SingleLevels, Some(_)) => {
                return Err(format_error(format!(
                    "{} has several levels but was requested as single-level",
                    data_name
                )));
            }
            (LevelKind::SingleLevels, None) => {
                array = array.insert_axis(Axis(0));
                (vec![0, lat_axis + 1, lon_axis + 1], None)
            }
        };
        if array.ndim() != 3 {
            return Err(format_error(format!(
                "{} has unexpected dimensions {:?}",
                data_name, dims
            )));
        }

        let values = array
            .permuted_axes(order)
            .as_standard_layout()
            .into_owned()
            .into_dimensionality::<Ix3>()?;
        let (_, latitude) = dataset
            .find_variable(LATITUDE_NAMES)
            .ok_or_else(|| format_error("Missing latitude coordinate".to_string()))?;
        let (_, longitude) = dataset
            .find_variable(LONGITUDE_NAMES)
            .ok_or_else(|| format_error("Missing longitude coordinate".to_string()))?;

        Self::new(
            variable,
            hour,
            levels,
            latitude.iter().copied().collect(),
            longitude.iter().copied().collect(),
            values,
        )
    }

    /// Variable name
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Analysis time
    pub fn valid_time(&self) -> NaiveDateTime {
        self.valid_time
    }

    /// Pressure levels [Pa], if this is a pressure-level field
    pub fn levels(&self) -> Option<&[f64]> {
        self.levels.as_deref()
    }

    /// Number of vertical levels (1 for single-level fields)
    pub fn level_count(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    /// Whether the longitude axis wraps around the globe
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Sample one level at a geographic position
    pub fn sample(
        &self,
        interpolator: &dyn Interpolator,
        level: usize,
        latitude: f64,
        longitude: f64,
    ) -> Result<f64> {
        let lat_index = coord_to_index(latitude, &self.latitude).map_err(|e| self.coverage(e))?;
        let lon = self.align_longitude(longitude)?;
        let lon_index = coord_to_index(lon, &self.longitude).map_err(|e| self.coverage(e))?;

        let plane = self.values.index_axis(Axis(0), level);
        let data = plane.as_slice().ok_or_else(|| AtmError::Interpolation {
            message: "Field values are not contiguous".to_string(),
        })?;
        interpolator.interpolate(data, plane.shape(), &[lat_index, lon_index])
    }

    /// Bring a longitude into the convention of the grid ([-180, 180) or [0, 360))
    fn align_longitude(&self, longitude: f64) -> Result<f64> {
        align_longitude(longitude, &self.longitude, self.periodic).ok_or_else(|| {
            AtmError::Coverage {
                message: format!(
                    "Longitude {} is outside the {} grid ({} to {})",
                    longitude,
                    self.variable,
                    self.longitude[0],
                    self.longitude[self.longitude.len() - 1]
                ),
            }
        })
    }

    fn coverage(&self, error: AtmError) -> AtmError {
        match error {
            AtmError::Coverage { message } => AtmError::Coverage {
                message: format!("{} at {}: {}", self.variable, self.valid_time, message),
            },
            other => other,
        }
    }
}

/// Pick the data variable of an ERA5 file
fn data_variable_name(dataset: &Dataset, variable: &str) -> Option<String> {
    if let Some(short) = era5_short_name(variable) {
        if dataset.variable(short).is_some() {
            return Some(short.to_string());
        }
    }
    if dataset.variable(variable).is_some() {
        return Some(variable.to_string());
    }

    let candidates: Vec<String> = dataset
        .variable_names()
        .into_iter()
        .filter(|name| {
            let name = name.as_str();
            !(LATITUDE_NAMES.contains(&name)
                || LONGITUDE_NAMES.contains(&name)
                || LEVEL_NAMES.contains(&name)
                || TIME_NAMES.contains(&name)
                || AUXILIARY_NAMES.contains(&name))
        })
        .collect();
    match candidates.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    }
}

/// Multiplier from the file's level units to Pa
fn level_scale_to_pa(dataset: &Dataset) -> f64 {
    let units = LEVEL_NAMES
        .iter()
        .find_map(|name| dataset.attribute(name, "units"))
        .and_then(|units| units.as_text().map(str::to_lowercase));
    match units.as_deref() {
        Some("pa") => 1.0,
        // ERA5 levels are in millibars
        _ => 100.0,
    }
}

/// Index of `hour` on the time axis of a dataset
fn time_index(dataset: &Dataset, hour: NaiveDateTime, len: usize) -> Result<usize> {
    let Some((name, values)) = dataset.find_variable(TIME_NAMES) else {
        // Without a time coordinate the file is trusted to hold the requested hour
        return if len == 1 {
            Ok(0)
        } else {
            Err(AtmError::FileFormat {
                path: dataset.path.clone(),
                message: "Time axis without a time coordinate".to_string(),
            })
        };
    };

    let units = dataset
        .attribute(name, "units")
        .and_then(|u| u.as_text())
        .ok_or_else(|| AtmError::FileFormat {
            path: dataset.path.clone(),
            message: format!("Time coordinate '{}' has no units", name),
        })?;
    let (step, epoch) = parse_time_units(units).ok_or_else(|| AtmError::FileFormat {
        path: dataset.path.clone(),
        message: format!("Unsupported time units '{}'", units),
    })?;

    values
        .iter()
        .position(|&t| {
            // Values outside the calendar cannot hold the requested hour
            offset_by_seconds(epoch, t * step).is_some_and(|time| nearest_hour(time) == hour)
        })
        .ok_or_else(|| AtmError::Coverage {
            message: format!("{} does not contain {}", dataset.path.display(), hour),
        })
}

/// Parse CF time units such as `hours since 1900-01-01 00:00:00.0` into
/// (seconds per unit, epoch)
pub fn parse_time_units(units: &str) -> Option<(f64, NaiveDateTime)> {
    let (unit, epoch) = units.split_once(" since ")?;
    let step = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };

    let epoch = epoch.trim().trim_end_matches(" UTC").trim_end_matches('Z');
    let parsed = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(epoch, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some((step, parsed))
}

/// Append the first longitude column at +360 degrees
fn wrap_longitude(mut longitude: Vec<f64>, values: Array3<f64>) -> (Vec<f64>, Array3<f64>) {
    longitude.push(longitude[0] + 360.0);
    let (nlev, nlat, nlon) = values.dim();
    let wrapped = Array3::from_shape_fn((nlev, nlat, nlon + 1), |(k, i, j)| {
        values[[k, i, j % nlon]]
    });
    (longitude, wrapped)
}

/// Supplier of reanalysis fields, one analysis hour at a time.
///
/// Acquisition (download, cache lookup) is the implementor's business; a
/// field that cannot be supplied must be reported as
/// [`AtmError::Coverage`], never replaced by default values.
pub trait FieldSource {
    /// Load `variable` of product `kind` at analysis hour `hour`
    fn load_field(
        &self,
        kind: LevelKind,
        variable: &str,
        hour: NaiveDateTime,
    ) -> Result<ReanalysisField>;
}

/// ERA5 files already downloaded into a local directory
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    /// Use files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where the file for (kind, hour, variable) is expected
    pub fn path_for(&self, kind: LevelKind, hour: NaiveDateTime, variable: &str) -> PathBuf {
        self.root.join(era5_filename(kind, hour, variable))
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FieldSource for LocalArchive {
    fn load_field(
        &self,
        kind: LevelKind,
        variable: &str,
        hour: NaiveDateTime,
    ) -> Result<ReanalysisField> {
        let path = self.path_for(kind, hour, variable);
        if !path.exists() {
            return Err(AtmError::Coverage {
                message: format!(
                    "Reanalysis file {} is not available for {} at {}",
                    path.display(),
                    variable,
                    hour
                ),
            });
        }
        debug!(path = %path.display(), "Loading reanalysis field");
        let dataset = load_dataset(&path)?;
        ReanalysisField::from_dataset(&dataset, kind, variable, hour)
    }
}

/// Fields held in memory, keyed by product, variable and hour
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    fields: HashMap<(LevelKind, String, NaiveDateTime), ReanalysisField>,
}

impl MemoryArchive {
    /// An empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field under its own variable name and valid time
    pub fn insert(&mut self, kind: LevelKind, field: ReanalysisField) {
        let key = (kind, field.variable().to_string(), field.valid_time());
        self.fields.insert(key, field);
    }
}

impl FieldSource for MemoryArchive {
    fn load_field(
        &self,
        kind: LevelKind,
        variable: &str,
        hour: NaiveDateTime,
    ) -> Result<ReanalysisField> {
        self.fields
            .get(&(kind, variable.to_string(), hour))
            .cloned()
            .ok_or_else(|| AtmError::Coverage {
                message: format!("No {} field for {} at {}", kind, variable, hour),
            })
    }
}

/// A reanalysis variable over the analysis hours spanning a pass
pub struct ReanalysisProvider {
    kind: LevelKind,
    variable: String,
    fields: BTreeMap<NaiveDateTime, ReanalysisField>,
    interpolator: Box<dyn Interpolator>,
}

impl fmt::Debug for ReanalysisProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReanalysisProvider")
            .field("kind", &self.kind)
            .field("variable", &self.variable)
            .field("hours", &self.fields.keys().collect::<Vec<_>>())
            .field("interpolator", &self.interpolator.name())
            .finish()
    }
}

impl ReanalysisProvider {
    /// Acquire every analysis hour between `start` and `end` (each rounded
    /// to its nearest hour) from `source`.
    pub fn new(
        source: &dyn FieldSource,
        kind: LevelKind,
        variable: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        method: &str,
    ) -> Result<Self> {
        if end < start {
            return Err(AtmError::InvalidParameter {
                param: "end".to_string(),
                message: format!("End time {} precedes start time {}", end, start),
            });
        }
        let interpolator = get_interpolator(method)?;

        let mut fields = BTreeMap::new();
        let last = nearest_hour(end);
        let mut hour = nearest_hour(start);
        while hour <= last {
            let field = source.load_field(kind, variable, hour)?;
            if kind == LevelKind::PressureLevels && field.levels().is_none() {
                return Err(AtmError::InvalidParameter {
                    param: "kind".to_string(),
                    message: format!("{} field for {} has no pressure levels", variable, hour),
                });
            }
            fields.insert(hour, field);
            hour += Duration::hours(1);
        }

        let mut level_sets = fields.values().map(ReanalysisField::levels);
        if let Some(first) = level_sets.next() {
            if level_sets.any(|levels| levels != first) {
                return Err(AtmError::Interpolation {
                    message: format!("{} levels differ between analysis hours", variable),
                });
            }
        }

        info!(
            variable = variable,
            product = %kind,
            hours = fields.len(),
            method = interpolator.name(),
            "Reanalysis fields acquired"
        );

        Ok(Self {
            kind,
            variable: variable.to_string(),
            fields,
            interpolator,
        })
    }

    /// Product kind
    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    /// Variable name
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Native pressure levels [Pa] of a pressure-level provider
    pub fn levels(&self) -> Option<&[f64]> {
        self.fields.values().next().and_then(ReanalysisField::levels)
    }

    fn field_for(&self, time: NaiveDateTime) -> Result<&ReanalysisField> {
        let hour = nearest_hour(time);
        self.fields.get(&hour).ok_or_else(|| AtmError::Coverage {
            message: format!(
                "{} was not acquired for analysis hour {} (sample at {})",
                self.variable, hour, time
            ),
        })
    }

    /// Sample the native levels along the track, `[level, sample]`
    pub fn interpolate_native(&self, track: &Track) -> Result<Array2<f64>> {
        let levels = self.fields.values().next().map_or(1, ReanalysisField::level_count);
        let mut out = Array2::<f64>::zeros((levels, track.len()));
        for j in 0..track.len() {
            let field = self.field_for(track.times[j])?;
            for k in 0..levels {
                out[[k, j]] = field.sample(
                    self.interpolator.as_ref(),
                    k,
                    track.latitude[j],
                    track.longitude[j],
                )?;
            }
        }
        Ok(out)
    }

    /// Sample the variable along the track and, when `pressure_levels` [Pa]
    /// is given, resample it onto those levels in log-pressure.
    ///
    /// Returns `[level, sample]`; single-level providers yield one level and
    /// reject `pressure_levels`.
    pub fn interpolate(
        &self,
        track: &Track,
        pressure_levels: Option<&[f64]>,
    ) -> Result<Array2<f64>> {
        let native = self.interpolate_native(track)?;
        match (pressure_levels, self.levels()) {
            (None, _) => Ok(native),
            (Some(target), Some(source)) => {
                resample_columns(source, native.view(), target, ValueScale::Linear)
            }
            (Some(_), None) => Err(AtmError::InvalidParameter {
                param: "pressure_levels".to_string(),
                message: format!("{} is a single-level variable", self.variable),
            }),
        }
    }
}
