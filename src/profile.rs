//! Reader for DARDAR cloud-profile products.
//!
//! A product file holds one orbit of along-track samples. Per-sample
//! variables (`latitude`, `longitude`, `iwc`, `Z`, ...) share their first
//! axis; `height` is the fixed vertical axis shared by every sample. The
//! reader can restrict the samples to a latitude band and to one orbit
//! segment, and every per-sample variable it hands out is restricted the
//! same way.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::{Array1, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::data_loader::load_dataset;
use crate::error::{AtmError, Result};

/// Latitude of each sample [degrees north]
pub const LATITUDE: &str = "latitude";
/// Longitude of each sample [degrees east]
pub const LONGITUDE: &str = "longitude";
/// Fixed vertical axis [m]
pub const HEIGHT: &str = "height";
/// Per-sample time offset [s]
pub const TIME: &str = "time";
/// Retrieved ice water content [kg m^-3]
pub const ICE_WATER_CONTENT: &str = "iwc";
/// Radar reflectivity [dBZ]
pub const RADAR_REFLECTIVITY: &str = "Z";

/// Orbit segment to keep.
///
/// Samples are classified by the sign of the along-track latitude change;
/// the descending branch is split by hemisphere because it wraps around the
/// start and end of a product file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitNode {
    /// Every sample
    All,
    /// Samples moving north
    Ascending,
    /// Samples moving south, northern hemisphere
    DescendingNorth,
    /// Samples moving south, southern hemisphere
    DescendingSouth,
}

impl OrbitNode {
    /// Short tag used in output directory names
    pub fn tag(&self) -> &'static str {
        match self {
            OrbitNode::All => "ALL",
            OrbitNode::Ascending => "A",
            OrbitNode::DescendingNorth => "D_N",
            OrbitNode::DescendingSouth => "D_S",
        }
    }

    fn accepts(&self, ascending: bool, latitude: f64) -> bool {
        match self {
            OrbitNode::All => true,
            OrbitNode::Ascending => ascending,
            OrbitNode::DescendingNorth => !ascending && latitude >= 0.0,
            OrbitNode::DescendingSouth => !ascending && latitude < 0.0,
        }
    }
}

impl fmt::Display for OrbitNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrbitNode::All => "all",
            OrbitNode::Ascending => "ascending",
            OrbitNode::DescendingNorth => "descending_north",
            OrbitNode::DescendingSouth => "descending_south",
        };
        f.write_str(name)
    }
}

impl FromStr for OrbitNode {
    type Err = AtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(OrbitNode::All),
            "a" | "ascending" => Ok(OrbitNode::Ascending),
            "d_n" | "descending_north" | "descending-north" => Ok(OrbitNode::DescendingNorth),
            "d_s" | "descending_south" | "descending-south" => Ok(OrbitNode::DescendingSouth),
            _ => Err(AtmError::InvalidParameter {
                param: "node".to_string(),
                message: format!(
                    "Unknown orbit node '{}'. Must be one of: all, A, D_N, D_S",
                    s
                ),
            }),
        }
    }
}

/// Along-track coordinates of the selected samples
#[derive(Debug, Clone)]
pub struct Track {
    /// Latitude [degrees north]
    pub latitude: Vec<f64>,
    /// Longitude [degrees east]
    pub longitude: Vec<f64>,
    /// Acquisition time of each sample
    pub times: Vec<NaiveDateTime>,
}

impl Track {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.latitude.len()
    }

    /// Whether the track has no samples
    pub fn is_empty(&self) -> bool {
        self.latitude.is_empty()
    }
}

/// Reader for one satellite-product file
#[derive(Debug, Clone)]
pub struct ProfileReader {
    path: PathBuf,
    variables: HashMap<String, ArrayD<f64>>,
    latitude_range: Option<(f64, f64)>,
    node: OrbitNode,
    selection: Vec<usize>,
}

impl ProfileReader {
    /// Open a product file, optionally restricted to an inclusive latitude band
    pub fn open(path: &Path, latitude_range: Option<(f64, f64)>) -> Result<Self> {
        let dataset = load_dataset(path)?;
        Self::from_variables(path, dataset.data, latitude_range)
    }

    /// Build a reader from arrays already in memory
    pub fn from_variables(
        path: &Path,
        variables: HashMap<String, ArrayD<f64>>,
        latitude_range: Option<(f64, f64)>,
    ) -> Result<Self> {
        let latitude = variables.get(LATITUDE).ok_or_else(|| AtmError::FileFormat {
            path: path.to_path_buf(),
            message: format!("Missing '{}' variable", LATITUDE),
        })?;
        let longitude = variables.get(LONGITUDE).ok_or_else(|| AtmError::FileFormat {
            path: path.to_path_buf(),
            message: format!("Missing '{}' variable", LONGITUDE),
        })?;
        if latitude.ndim() != 1 || latitude.shape() != longitude.shape() {
            return Err(AtmError::FileFormat {
                path: path.to_path_buf(),
                message: format!(
                    "Latitude {:?} and longitude {:?} must be 1-D and of equal length",
                    latitude.shape(),
                    longitude.shape()
                ),
            });
        }

        let samples = latitude.len();
        for (name, array) in &variables {
            if name != HEIGHT && array.ndim() > 0 && array.shape()[0] != samples {
                debug!(
                    variable = %name,
                    shape = ?array.shape(),
                    "Variable is not along-track; it will not be subset"
                );
            }
        }

        if let Some((lo, hi)) = latitude_range {
            if lo > hi {
                return Err(AtmError::InvalidParameter {
                    param: "latitude_range".to_string(),
                    message: format!("Lower latitude {} exceeds upper latitude {}", lo, hi),
                });
            }
        }

        let mut reader = Self {
            path: path.to_path_buf(),
            variables,
            latitude_range,
            node: OrbitNode::All,
            selection: Vec::new(),
        };
        reader.selection = reader.compute_selection();
        Ok(reader)
    }

    /// Restrict the reader to one orbit segment.
    ///
    /// Fails with [`AtmError::MissingPass`] when no sample of that segment
    /// lies inside the latitude band.
    pub fn with_node(mut self, node: OrbitNode) -> Result<Self> {
        self.node = node;
        self.selection = self.compute_selection();
        if self.selection.is_empty() {
            let band = match self.latitude_range {
                Some((lo, hi)) => format!("between latitudes {} and {}", lo, hi),
                None => "anywhere in the orbit".to_string(),
            };
            return Err(AtmError::MissingPass {
                node: node.to_string(),
                message: format!("no samples {} in {}", band, self.path.display()),
            });
        }
        Ok(self)
    }

    fn latitudes(&self) -> &ArrayD<f64> {
        // Presence is checked in from_variables
        &self.variables[LATITUDE]
    }

    fn compute_selection(&self) -> Vec<usize> {
        let lat: Vec<f64> = self.latitudes().iter().copied().collect();
        let n = lat.len();
        (0..n)
            .filter(|&i| match self.latitude_range {
                Some((lo, hi)) => lat[i] >= lo && lat[i] <= hi,
                None => true,
            })
            .filter(|&i| {
                let ascending = if n < 2 {
                    true
                } else if i + 1 < n {
                    lat[i + 1] >= lat[i]
                } else {
                    lat[i] >= lat[i - 1]
                };
                self.node.accepts(ascending, lat[i])
            })
            .collect()
    }

    /// Path of the product file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latitude band in use, if any
    pub fn latitude_range(&self) -> Option<(f64, f64)> {
        self.latitude_range
    }

    /// Orbit segment in use
    pub fn node(&self) -> OrbitNode {
        self.node
    }

    /// Names of the variables in the product, sorted
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of selected samples
    pub fn len(&self) -> usize {
        self.selection.len()
    }

    /// Whether no samples are selected
    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Get a variable restricted to the selected samples.
    ///
    /// `height` and any variable whose first axis is not along-track are
    /// returned whole.
    pub fn get(&self, name: &str) -> Result<ArrayD<f64>> {
        let array = self
            .variables
            .get(name)
            .ok_or_else(|| AtmError::UnknownVariable {
                name: name.to_string(),
                available: self.variables(),
            })?;

        let samples = self.latitudes().len();
        let along_track = name != HEIGHT && array.ndim() > 0 && array.shape()[0] == samples;
        if !along_track || self.selection.len() == samples {
            return Ok(array.clone());
        }
        Ok(array.select(Axis(0), &self.selection))
    }

    /// Get a 1-D variable restricted to the selected samples
    pub fn get_1d(&self, name: &str) -> Result<Array1<f64>> {
        let array = self.get(name)?;
        array
            .into_dimensionality::<ndarray::Ix1>()
            .map_err(AtmError::from)
    }

    /// Parse the acquisition timestamp from the file name.
    ///
    /// Names look like `DARDAR-CLOUD_v2.1.1_2015310114257_50670.hdf`; the
    /// first `_`-separated token of exactly 13 digits is read as
    /// `YYYYDDDHHMMSS` (year, day of year, hour, minute, second).
    pub fn timestamp_from_name(&self) -> Result<NaiveDateTime> {
        timestamp_from_filename(&self.path)
    }

    /// Time of the first selected sample
    pub fn start_time(&self) -> Result<NaiveDateTime> {
        let times = self.sample_times()?;
        times.first().copied().ok_or_else(|| self.empty_selection())
    }

    /// Time of the last selected sample
    pub fn end_time(&self) -> Result<NaiveDateTime> {
        let times = self.sample_times()?;
        times.last().copied().ok_or_else(|| self.empty_selection())
    }

    fn empty_selection(&self) -> AtmError {
        AtmError::MissingPass {
            node: self.node.to_string(),
            message: format!("no samples selected in {}", self.path.display()),
        }
    }

    /// Acquisition time of every selected sample.
    ///
    /// The filename timestamp marks the first sample of the file; a `time`
    /// variable, when present, adds each sample's offset from that first
    /// sample.
    pub fn sample_times(&self) -> Result<Vec<NaiveDateTime>> {
        let t0 = self.timestamp_from_name()?;
        let offsets = match self.variables.get(TIME) {
            Some(time) if time.ndim() == 1 && time.len() == self.latitudes().len() => {
                let first = time.iter().next().copied().unwrap_or(0.0);
                Some(time.iter().map(|t| t - first).collect::<Vec<f64>>())
            }
            _ => None,
        };

        self.selection
            .iter()
            .map(|&i| match &offsets {
                Some(offsets) if offsets[i].is_finite() => offset_by_seconds(t0, offsets[i])
                    .ok_or_else(|| AtmError::FileFormat {
                        path: self.path.clone(),
                        message: format!(
                            "time offset {} s of sample {} is out of range",
                            offsets[i], i
                        ),
                    }),
                _ => Ok(t0),
            })
            .collect()
    }

    /// Coordinates and times of the selected samples
    pub fn track(&self) -> Result<Track> {
        Ok(Track {
            latitude: self.get_1d(LATITUDE)?.to_vec(),
            longitude: self.get_1d(LONGITUDE)?.to_vec(),
            times: self.sample_times()?,
        })
    }
}

/// Shift `time` by `seconds`, or `None` when the result is not representable
pub(crate) fn offset_by_seconds(time: NaiveDateTime, seconds: f64) -> Option<NaiveDateTime> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64).and_then(|delta| time.checked_add_signed(delta))
}

/// Parse the `YYYYDDDHHMMSS` token of a product file name
pub fn timestamp_from_filename(path: &Path) -> Result<NaiveDateTime> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AtmError::Format {
            message: format!("Cannot read file name of {}", path.display()),
        })?;

    let token = stem
        .split('_')
        .find(|t| t.len() == 13 && t.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| AtmError::Format {
            message: format!(
                "File name '{}' does not match <prefix>_<YYYYDDDHHMMSS>_<suffix>",
                stem
            ),
        })?;

    let field = |range: std::ops::Range<usize>| -> Result<u32> {
        token[range].parse::<u32>().map_err(|e| AtmError::Format {
            message: format!("Invalid timestamp '{}': {}", token, e),
        })
    };
    let year = field(0..4)? as i32;
    let day_of_year = field(4..7)?;
    let (hour, minute, second) = (field(7..9)?, field(9..11)?, field(11..13)?);

    NaiveDate::from_yo_opt(year, day_of_year)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| AtmError::Format {
            message: format!("Timestamp '{}' is not a valid calendar time", token),
        })
}
