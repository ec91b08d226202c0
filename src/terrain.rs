//! Surface elevation from a gridded digital elevation model.

use ndarray::{Array2, Axis, Ix2};
use std::path::Path;
use tracing::info;

use crate::data_loader::{load_dataset, Dataset};
use crate::error::{AtmError, Result};
use crate::interpolation::bilinear::BilinearInterpolator;
use crate::interpolation::common::{
    align_longitude, coord_to_index, is_global_longitude, is_strictly_monotonic,
};
use crate::interpolation::Interpolator;
use crate::profile::Track;

const LATITUDE_NAMES: &[&str] = &["latitude", "lat"];
const LONGITUDE_NAMES: &[&str] = &["longitude", "lon"];
const ELEVATION_NAMES: &[&str] = &["elevation", "altitude", "orography", "height", "z"];

/// Terrain elevation [m] on a regular latitude/longitude grid
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    /// `[latitude, longitude]`
    elevation: Array2<f64>,
    periodic: bool,
}

impl ElevationGrid {
    /// Build a grid from its axes and a `[latitude, longitude]` array
    pub fn new(latitude: Vec<f64>, longitude: Vec<f64>, elevation: Array2<f64>) -> Result<Self> {
        if elevation.dim() != (latitude.len(), longitude.len()) {
            return Err(AtmError::Interpolation {
                message: format!(
                    "Elevation shape {:?} does not match axes ({}, {})",
                    elevation.shape(),
                    latitude.len(),
                    longitude.len()
                ),
            });
        }
        if latitude.is_empty()
            || longitude.is_empty()
            || !is_strictly_monotonic(&latitude)
            || !is_strictly_monotonic(&longitude)
        {
            return Err(AtmError::Interpolation {
                message: "Elevation grid axes must be non-empty and strictly monotonic"
                    .to_string(),
            });
        }

        let periodic = is_global_longitude(&longitude);
        let (longitude, elevation) = if periodic {
            let mut longitude = longitude;
            longitude.push(longitude[0] + 360.0);
            let first = elevation.index_axis(Axis(1), 0).insert_axis(Axis(1));
            let wrapped = ndarray::concatenate(Axis(1), &[elevation.view(), first])?;
            (longitude, wrapped)
        } else {
            (longitude, elevation)
        };

        Ok(Self {
            latitude,
            longitude,
            elevation: elevation.as_standard_layout().into_owned(),
            periodic,
        })
    }

    /// Load a DEM from a NetCDF file with latitude, longitude and an
    /// elevation variable
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = load_dataset(path)?;
        let grid = Self::from_dataset(&dataset)?;
        info!(
            path = %path.display(),
            rows = grid.latitude.len(),
            columns = grid.longitude.len(),
            periodic = grid.periodic,
            "Elevation grid loaded"
        );
        Ok(grid)
    }

    fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let format_error = |message: &str| AtmError::FileFormat {
            path: dataset.path.clone(),
            message: message.to_string(),
        };
        let (_, latitude) = dataset
            .find_variable(LATITUDE_NAMES)
            .ok_or_else(|| format_error("Missing latitude coordinate"))?;
        let (_, longitude) = dataset
            .find_variable(LONGITUDE_NAMES)
            .ok_or_else(|| format_error("Missing longitude coordinate"))?;
        let (name, elevation) = dataset
            .find_variable(ELEVATION_NAMES)
            .ok_or_else(|| format_error("Missing elevation variable"))?;

        let mut elevation = elevation.clone();
        // Latitude-major unless the file says otherwise
        if let Some(dims) = dataset.dimensions_of(name) {
            if dims.len() == 2 && LONGITUDE_NAMES.contains(&dims[0].as_str()) {
                elevation = elevation.reversed_axes();
            }
        }

        Self::new(
            latitude.iter().copied().collect(),
            longitude.iter().copied().collect(),
            elevation.into_dimensionality::<Ix2>()?,
        )
    }

    /// Elevation [m] at a position; fails with `Coverage` outside the grid
    pub fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let lon = align_longitude(longitude, &self.longitude, self.periodic).ok_or_else(|| {
            AtmError::Coverage {
                message: format!("Longitude {} is outside the elevation grid", longitude),
            }
        })?;
        let indices = [
            coord_to_index(latitude, &self.latitude)?,
            coord_to_index(lon, &self.longitude)?,
        ];
        let data = self
            .elevation
            .as_slice()
            .ok_or_else(|| AtmError::Interpolation {
                message: "Elevation values are not contiguous".to_string(),
            })?;
        BilinearInterpolator.interpolate(data, self.elevation.shape(), &indices)
    }

    /// Elevation under every sample of a track
    pub fn sample_track(&self, track: &Track) -> Result<Vec<f64>> {
        track
            .latitude
            .iter()
            .zip(&track.longitude)
            .map(|(&lat, &lon)| self.elevation(lat, lon))
            .collect()
    }
}
