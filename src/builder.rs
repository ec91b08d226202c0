//! Assembly of the atmospheric state along a satellite track.
//!
//! Each state variable has its own function taking [`StateInputs`]; they
//! are independent and recompute whatever they depend on.
//! [`AtmosphericStateBuilder`] evaluates a whole set of variables and shares
//! temperature and water vapour between the ones that need them.

use ndarray::{Array2, Array3, Array4, ArrayD, Axis, Ix2, Zip};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{AtmError, Result};
use crate::interpolation::vertical::{resample_columns, ValueScale};
use crate::physics::{
    air_density, geopotential_to_height, height_to_pressure, scale_vmr,
    specific_humidity_to_vmr, wind_direction as direction_from_components,
    wind_speed as speed_from_components, N2_REFERENCE_VMR, O2_REFERENCE_VMR,
};
use crate::profile::{ProfileReader, Track, HEIGHT, ICE_WATER_CONTENT, RADAR_REFLECTIVITY};
use crate::reanalysis::{FieldSource, LevelKind, ReanalysisProvider};
use crate::state::{AtmosphericState, PassInfo};
use crate::terrain::ElevationGrid;

/// Everything a state variable may be computed from
#[derive(Clone, Copy)]
pub struct StateInputs<'a> {
    /// Satellite pass (already restricted to its latitude band and node)
    pub profile: &'a ProfileReader,
    /// Supplier of reanalysis fields
    pub source: &'a dyn FieldSource,
    /// Terrain elevation, required for `surface_elevation`
    pub terrain: Option<&'a ElevationGrid>,
    /// Target pressure grid [Pa]
    pub pressure_grid: &'a [f64],
    /// Horizontal interpolation method (`bilinear` or `nearest`)
    pub interpolation: &'a str,
}

impl fmt::Debug for StateInputs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateInputs")
            .field("profile", &self.profile.path())
            .field("terrain", &self.terrain.is_some())
            .field("levels", &self.pressure_grid.len())
            .field("interpolation", &self.interpolation)
            .finish()
    }
}

impl StateInputs<'_> {
    fn track(&self) -> Result<Track> {
        self.profile.track()
    }

    fn provider(
        &self,
        kind: LevelKind,
        variable: &str,
        track: &Track,
    ) -> Result<ReanalysisProvider> {
        let start = track.times.iter().min().copied();
        let end = track.times.iter().max().copied();
        let (start, end) = start.zip(end).ok_or_else(|| AtmError::MissingPass {
            node: self.profile.node().to_string(),
            message: "track has no samples".to_string(),
        })?;
        let provider =
            ReanalysisProvider::new(self.source, kind, variable, start, end, self.interpolation)?;
        debug!(
            kind = %provider.kind(),
            variable = provider.variable(),
            start = %start,
            end = %end,
            "Reanalysis provider ready"
        );
        Ok(provider)
    }
}

/// Pressure-level reanalysis variable on the target grid, `[p, n, 1]`
pub fn pressure_level_variable(inputs: &StateInputs, variable: &str) -> Result<Array3<f64>> {
    let track = inputs.track()?;
    let provider = inputs.provider(LevelKind::PressureLevels, variable, &track)?;
    let grid = provider.interpolate(&track, Some(inputs.pressure_grid))?;
    Ok(grid.insert_axis(Axis(2)))
}

/// Single-level reanalysis variable along the track, `[n, 1]`
pub fn single_level_variable(inputs: &StateInputs, variable: &str) -> Result<Array2<f64>> {
    let track = inputs.track()?;
    let provider = inputs.provider(LevelKind::SingleLevels, variable, &track)?;
    let surface = provider.interpolate(&track, None)?;
    Ok(surface.reversed_axes())
}

/// Air temperature [K], `[p, n, 1]`
pub fn temperature(inputs: &StateInputs) -> Result<Array3<f64>> {
    pressure_level_variable(inputs, "temperature")
}

/// Geopotential height [m], `[p, n, 1]`
pub fn geopotential_height(inputs: &StateInputs) -> Result<Array3<f64>> {
    Ok(pressure_level_variable(inputs, "geopotential")?.mapv(geopotential_to_height))
}

/// Cloud liquid water content [kg m^-3], `[1, p, n, 1]`
pub fn cloud_liquid_water_content(inputs: &StateInputs) -> Result<Array4<f64>> {
    let temperature = temperature(inputs)?;
    cloud_liquid_water_with(inputs, &temperature)
}

fn cloud_liquid_water_with(inputs: &StateInputs, temperature: &Array3<f64>) -> Result<Array4<f64>> {
    let mut clwc = pressure_level_variable(inputs, "specific_cloud_liquid_water_content")?;
    for (i, &p) in inputs.pressure_grid.iter().enumerate() {
        let mut level = clwc.index_axis_mut(Axis(0), i);
        let t = temperature.index_axis(Axis(0), i);
        Zip::from(&mut level)
            .and(&t)
            .for_each(|c, &t| *c *= air_density(p, t));
    }
    Ok(clwc.insert_axis(Axis(0)))
}

/// Water vapour volume mixing ratio, `[1, p, n, 1]`.
///
/// Specific humidity is converted on the native levels and the mixing ratio
/// is then resampled with log-log interpolation.
pub fn water_vapor_volume_mixing_ratio(inputs: &StateInputs) -> Result<Array4<f64>> {
    Ok(species(water_vapor_on_grid(inputs)?))
}

fn water_vapor_on_grid(inputs: &StateInputs) -> Result<Array2<f64>> {
    let track = inputs.track()?;
    let provider = inputs.provider(LevelKind::PressureLevels, "specific_humidity", &track)?;
    let levels = provider.levels().ok_or_else(|| AtmError::Interpolation {
        message: "specific humidity has no pressure levels".to_string(),
    })?;
    let vmr = provider
        .interpolate_native(&track)?
        .mapv(specific_humidity_to_vmr);
    resample_columns(levels, vmr.view(), inputs.pressure_grid, ValueScale::Log)
}

/// Molecular nitrogen volume mixing ratio, `[1, p, n, 1]`
pub fn nitrogen_vmr(inputs: &StateInputs) -> Result<Array4<f64>> {
    Ok(scaled_species(N2_REFERENCE_VMR, &water_vapor_on_grid(inputs)?))
}

/// Molecular oxygen volume mixing ratio, `[1, p, n, 1]`
pub fn oxygen_vmr(inputs: &StateInputs) -> Result<Array4<f64>> {
    Ok(scaled_species(O2_REFERENCE_VMR, &water_vapor_on_grid(inputs)?))
}

fn scaled_species(reference: f64, h2o: &Array2<f64>) -> Array4<f64> {
    species(h2o.mapv(|vmr| scale_vmr(reference, vmr)))
}

fn species(grid: Array2<f64>) -> Array4<f64> {
    grid.insert_axis(Axis(0)).insert_axis(Axis(3))
}

/// Retrieved ice water content on the target grid, `[1, p, n, 1]`
pub fn ice_water_content(inputs: &StateInputs) -> Result<Array4<f64>> {
    profile_on_pressure_grid(inputs, ICE_WATER_CONTENT)
}

/// Radar reflectivity on the target grid, `[1, p, n, 1]`
pub fn radar_reflectivity(inputs: &StateInputs) -> Result<Array4<f64>> {
    profile_on_pressure_grid(inputs, RADAR_REFLECTIVITY)
}

/// Move a `[sample, height]` product variable onto the pressure grid
fn profile_on_pressure_grid(inputs: &StateInputs, name: &str) -> Result<Array4<f64>> {
    let height = inputs.profile.get_1d(HEIGHT)?;
    let pressure: Vec<f64> = height.iter().map(|&h| height_to_pressure(h)).collect();
    let samples = inputs.profile.len();

    let values = inputs.profile.get(name)?.into_dimensionality::<Ix2>()?;
    // Columns are expected as [height, sample]
    let columns = match values.dim() {
        (n, h) if n == samples && h == pressure.len() => values.reversed_axes(),
        (h, n) if n == samples && h == pressure.len() => values,
        shape => {
            return Err(AtmError::Interpolation {
                message: format!(
                    "{} has shape {:?}, expected {} samples by {} heights",
                    name,
                    shape,
                    samples,
                    pressure.len()
                ),
            });
        }
    };

    let grid = resample_columns(
        &pressure,
        columns.view(),
        inputs.pressure_grid,
        ValueScale::Linear,
    )?;
    Ok(species(grid))
}

/// Terrain elevation under the track [m], `[n, 1]`
pub fn surface_elevation(inputs: &StateInputs) -> Result<Array2<f64>> {
    let terrain = inputs.terrain.ok_or_else(|| AtmError::Config {
        message: "surface_elevation needs a terrain file".to_string(),
    })?;
    let heights = terrain.sample_track(&inputs.track()?)?;
    Ok(Array2::from_shape_vec((heights.len(), 1), heights)?)
}

/// Skin temperature [K], `[n, 1]`
pub fn skin_temperature(inputs: &StateInputs) -> Result<Array2<f64>> {
    single_level_variable(inputs, "skin_temperature")
}

/// Temperature two metres above the surface [K], `[n, 1]`
pub fn two_metre_temperature(inputs: &StateInputs) -> Result<Array2<f64>> {
    single_level_variable(inputs, "2m_temperature")
}

fn wind_components(inputs: &StateInputs) -> Result<(Array2<f64>, Array2<f64>)> {
    Ok((
        single_level_variable(inputs, "10m_u_component_of_wind")?,
        single_level_variable(inputs, "10m_v_component_of_wind")?,
    ))
}

/// Wind speed ten metres above the surface [m s^-1], `[n, 1]`
pub fn wind_speed(inputs: &StateInputs) -> Result<Array2<f64>> {
    let (u, v) = wind_components(inputs)?;
    Ok(Zip::from(&u).and(&v).map_collect(|&u, &v| speed_from_components(u, v)))
}

/// Wind direction ten metres above the surface [degrees], `[n, 1]`
pub fn wind_direction(inputs: &StateInputs) -> Result<Array2<f64>> {
    let (u, v) = wind_components(inputs)?;
    Ok(Zip::from(&u).and(&v).map_collect(|&u, &v| direction_from_components(u, v)))
}

/// A named member of the atmospheric state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateVariable {
    Temperature,
    GeopotentialHeight,
    CloudLiquidWaterContent,
    WaterVaporVmr,
    NitrogenVmr,
    OxygenVmr,
    IceWaterContent,
    RadarReflectivity,
    SurfaceElevation,
    SkinTemperature,
    TwoMetreTemperature,
    WindSpeed,
    WindDirection,
    /// Any other pressure-level reanalysis variable, by CDS name
    PressureLevel(String),
    /// Any other single-level reanalysis variable, by CDS name
    SingleLevel(String),
}

impl StateVariable {
    /// The standard set written for every pass
    pub fn standard() -> Vec<StateVariable> {
        vec![
            StateVariable::Temperature,
            StateVariable::GeopotentialHeight,
            StateVariable::CloudLiquidWaterContent,
            StateVariable::WaterVaporVmr,
            StateVariable::NitrogenVmr,
            StateVariable::OxygenVmr,
            StateVariable::IceWaterContent,
            StateVariable::RadarReflectivity,
            StateVariable::SurfaceElevation,
            StateVariable::SkinTemperature,
            StateVariable::TwoMetreTemperature,
            StateVariable::WindSpeed,
            StateVariable::WindDirection,
        ]
    }

    /// Name under which the variable is stored
    pub fn name(&self) -> &str {
        match self {
            StateVariable::Temperature => "temperature",
            StateVariable::GeopotentialHeight => "geopotential_height",
            StateVariable::CloudLiquidWaterContent => "cloud_liquid_water_content",
            StateVariable::WaterVaporVmr => "water_vapor_volume_mixing_ratio",
            StateVariable::NitrogenVmr => "nitrogen_vmr",
            StateVariable::OxygenVmr => "oxygen_vmr",
            StateVariable::IceWaterContent => "ice_water_content",
            StateVariable::RadarReflectivity => "radar_reflectivity",
            StateVariable::SurfaceElevation => "surface_elevation",
            StateVariable::SkinTemperature => "skin_temperature",
            StateVariable::TwoMetreTemperature => "2m_temperature",
            StateVariable::WindSpeed => "10m_wind_speed",
            StateVariable::WindDirection => "10m_wind_direction",
            StateVariable::PressureLevel(name) | StateVariable::SingleLevel(name) => name,
        }
    }
}

impl fmt::Display for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateVariable {
    type Err = AtmError;

    /// Parse a standard variable name
    fn from_str(s: &str) -> Result<Self> {
        StateVariable::standard()
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| AtmError::UnknownVariable {
                name: s.to_string(),
                available: StateVariable::standard()
                    .iter()
                    .map(|v| v.name().to_string())
                    .collect(),
            })
    }
}

/// Values computed once per build and shared between variables
#[derive(Default)]
struct Shared {
    temperature: Option<Array3<f64>>,
    water_vapor: Option<Array2<f64>>,
}

impl Shared {
    fn temperature(&mut self, inputs: &StateInputs) -> Result<&Array3<f64>> {
        if self.temperature.is_none() {
            self.temperature = Some(temperature(inputs)?);
        }
        self.temperature.as_ref().ok_or_else(|| AtmError::Interpolation {
            message: "temperature unavailable".to_string(),
        })
    }

    fn water_vapor(&mut self, inputs: &StateInputs) -> Result<&Array2<f64>> {
        if self.water_vapor.is_none() {
            self.water_vapor = Some(water_vapor_on_grid(inputs)?);
        }
        self.water_vapor.as_ref().ok_or_else(|| AtmError::Interpolation {
            message: "water vapour unavailable".to_string(),
        })
    }
}

/// Evaluates a set of state variables for one pass
#[derive(Debug)]
pub struct AtmosphericStateBuilder<'a> {
    inputs: StateInputs<'a>,
    variables: Vec<StateVariable>,
}

impl<'a> AtmosphericStateBuilder<'a> {
    /// Builder for the standard variable set
    pub fn new(inputs: StateInputs<'a>) -> Self {
        Self {
            inputs,
            variables: StateVariable::standard(),
        }
    }

    /// Replace the variable set
    pub fn with_variables(mut self, variables: Vec<StateVariable>) -> Self {
        self.variables = variables;
        self
    }

    /// Add variables to the set
    pub fn add_variables(mut self, variables: impl IntoIterator<Item = StateVariable>) -> Self {
        for variable in variables {
            if !self.variables.contains(&variable) {
                self.variables.push(variable);
            }
        }
        self
    }

    /// Variables that will be computed
    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    /// Compute every variable and assemble the state
    pub fn build(&self) -> Result<AtmosphericState> {
        let inputs = &self.inputs;
        if inputs.pressure_grid.is_empty() {
            return Err(AtmError::InvalidParameter {
                param: "pressure_grid".to_string(),
                message: "pressure grid is empty".to_string(),
            });
        }

        let mut requested: BTreeMap<&str, &StateVariable> = BTreeMap::new();
        for variable in &self.variables {
            match requested.insert(variable.name(), variable) {
                Some(previous) if previous != variable => {
                    return Err(AtmError::InvalidParameter {
                        param: "variables".to_string(),
                        message: format!(
                            "'{}' is requested both as {:?} and as {:?}",
                            variable, previous, variable
                        ),
                    });
                }
                _ => {}
            }
        }

        let track = inputs.track()?;
        let mut shared = Shared::default();
        let mut arrays: BTreeMap<String, ArrayD<f64>> = BTreeMap::new();

        for variable in &self.variables {
            if arrays.contains_key(variable.name()) {
                continue;
            }
            debug!(variable = %variable, "Computing state variable");
            let array = self.compute(variable, &mut shared)?;
            if array.iter().any(|v| v.is_nan()) {
                warn!(variable = %variable, "State variable contains missing values");
            }
            arrays.insert(variable.name().to_string(), array);
        }

        let pass = PassInfo {
            source: inputs.profile.path().to_path_buf(),
            time: inputs.profile.timestamp_from_name()?,
            node: inputs.profile.node(),
        };
        info!(
            pass = %pass.output_name(),
            samples = track.len(),
            levels = inputs.pressure_grid.len(),
            variables = arrays.len(),
            "Atmospheric state built"
        );

        AtmosphericState::new(
            pass,
            inputs.pressure_grid.to_vec(),
            track.latitude,
            track.longitude,
            arrays,
        )
    }

    fn compute(&self, variable: &StateVariable, shared: &mut Shared) -> Result<ArrayD<f64>> {
        let inputs = &self.inputs;
        let array = match variable {
            StateVariable::Temperature => shared.temperature(inputs)?.clone().into_dyn(),
            StateVariable::GeopotentialHeight => geopotential_height(inputs)?.into_dyn(),
            StateVariable::CloudLiquidWaterContent => {
                let t = shared.temperature(inputs)?.clone();
                cloud_liquid_water_with(inputs, &t)?.into_dyn()
            }
            StateVariable::WaterVaporVmr => {
                species(shared.water_vapor(inputs)?.clone()).into_dyn()
            }
            StateVariable::NitrogenVmr => {
                scaled_species(N2_REFERENCE_VMR, shared.water_vapor(inputs)?).into_dyn()
            }
            StateVariable::OxygenVmr => {
                scaled_species(O2_REFERENCE_VMR, shared.water_vapor(inputs)?).into_dyn()
            }
            StateVariable::IceWaterContent => ice_water_content(inputs)?.into_dyn(),
            StateVariable::RadarReflectivity => radar_reflectivity(inputs)?.into_dyn(),
            StateVariable::SurfaceElevation => surface_elevation(inputs)?.into_dyn(),
            StateVariable::SkinTemperature => skin_temperature(inputs)?.into_dyn(),
            StateVariable::TwoMetreTemperature => two_metre_temperature(inputs)?.into_dyn(),
            StateVariable::WindSpeed => wind_speed(inputs)?.into_dyn(),
            StateVariable::WindDirection => wind_direction(inputs)?.into_dyn(),
            StateVariable::PressureLevel(name) => pressure_level_variable(inputs, name)?.into_dyn(),
            StateVariable::SingleLevel(name) => single_level_variable(inputs, name)?.into_dyn(),
        };
        Ok(array)
    }
}
