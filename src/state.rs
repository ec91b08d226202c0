//! The atmospheric state assembled for one satellite pass.
//!
//! A state maps variable names to arrays laid out for the radiative-transfer
//! model. It is built once per pass, validated, written out and dropped.

use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{AtmError, Result};
use crate::profile::OrbitNode;

/// Absorbing species the radiative-transfer model expects, in order
pub const ABSORPTION_SPECIES: [&str; 4] = ["N2", "O2", "H2O", "LWC"];

/// Array layouts a state variable may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `[pressure, sample, 1]`
    PressureResolved,
    /// `[1, pressure, sample, 1]`
    Species,
    /// `[sample, 1]`
    Surface,
}

impl Layout {
    /// Classify a shape against the pass dimensions
    pub fn of(shape: &[usize], levels: usize, samples: usize) -> Option<Self> {
        match *shape {
            [p, n, 1] if p == levels && n == samples => Some(Layout::PressureResolved),
            [1, p, n, 1] if p == levels && n == samples => Some(Layout::Species),
            [n, 1] if n == samples => Some(Layout::Surface),
            _ => None,
        }
    }
}

/// Where and when a pass was observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassInfo {
    /// Satellite product the pass was read from
    pub source: PathBuf,
    /// Timestamp encoded in the product file name
    pub time: NaiveDateTime,
    /// Orbit segment
    pub node: OrbitNode,
}

impl PassInfo {
    /// Directory name for this pass: `<YYYY>_<DDD>_<HH>_<node>`
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.time.format("%Y_%j_%H"), self.node.tag())
    }
}

/// Immutable collection of named state arrays on a shared grid
#[derive(Debug, Clone)]
pub struct AtmosphericState {
    pass: PassInfo,
    pressure_grid: Vec<f64>,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    variables: BTreeMap<String, ArrayD<f64>>,
}

impl AtmosphericState {
    /// Assemble a state, checking every array against the pass dimensions
    pub fn new(
        pass: PassInfo,
        pressure_grid: Vec<f64>,
        latitude: Vec<f64>,
        longitude: Vec<f64>,
        variables: BTreeMap<String, ArrayD<f64>>,
    ) -> Result<Self> {
        let state = Self {
            pass,
            pressure_grid,
            latitude,
            longitude,
            variables,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check that the state is consistent
    pub fn validate(&self) -> Result<()> {
        if self.latitude.len() != self.longitude.len() {
            return Err(AtmError::Interpolation {
                message: format!(
                    "Track has {} latitudes but {} longitudes",
                    self.latitude.len(),
                    self.longitude.len()
                ),
            });
        }

        for (name, array) in &self.variables {
            if self.layout_of(array.shape()).is_none() {
                return Err(AtmError::Interpolation {
                    message: format!(
                        "Variable {} has shape {:?}, expected one of [{p}, {n}, 1], [1, {p}, {n}, 1] or [{n}, 1]",
                        name,
                        array.shape(),
                        p = self.pressure_grid.len(),
                        n = self.latitude.len()
                    ),
                });
            }
        }
        Ok(())
    }

    fn layout_of(&self, shape: &[usize]) -> Option<Layout> {
        Layout::of(shape, self.pressure_grid.len(), self.latitude.len())
    }

    /// Pass identification
    pub fn pass(&self) -> &PassInfo {
        &self.pass
    }

    /// Target pressure grid [Pa]
    pub fn pressure_grid(&self) -> &[f64] {
        &self.pressure_grid
    }

    /// Latitude of each sample
    pub fn latitude(&self) -> &[f64] {
        &self.latitude
    }

    /// Longitude of each sample
    pub fn longitude(&self) -> &[f64] {
        &self.longitude
    }

    /// Number of along-track samples
    pub fn samples(&self) -> usize {
        self.latitude.len()
    }

    /// Get a variable's array
    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.variables.get(name)
    }

    /// Get a variable's array with error handling
    pub fn get_checked(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.variables
            .get(name)
            .ok_or_else(|| AtmError::UnknownVariable {
                name: name.to_string(),
                available: self.names().map(str::to_string).collect(),
            })
    }

    /// Layout of a variable
    pub fn layout(&self, name: &str) -> Option<Layout> {
        self.variables
            .get(name)
            .and_then(|array| self.layout_of(array.shape()))
    }

    /// Variable names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Iterate over (name, array) pairs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the state holds no variables
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Absorbing species accompanying this state
    pub fn absorption_species(&self) -> &'static [&'static str] {
        &ABSORPTION_SPECIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::{Array2, Array3, Array4};

    fn pass() -> PassInfo {
        PassInfo {
            source: PathBuf::from("DARDAR-CLOUD_v2.1.1_2015310114257_50670.hdf"),
            time: NaiveDate::from_yo_opt(2015, 310)
                .unwrap()
                .and_hms_opt(11, 42, 57)
                .unwrap(),
            node: OrbitNode::DescendingNorth,
        }
    }

    #[test]
    fn test_output_name() {
        assert_eq!(pass().output_name(), "2015_310_11_D_N");

        let mut early = pass();
        early.time = NaiveDate::from_yo_opt(2009, 5)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        early.node = OrbitNode::Ascending;
        assert_eq!(early.output_name(), "2009_005_03_A");
    }

    #[test]
    fn test_layouts() {
        assert_eq!(Layout::of(&[4, 3, 1], 4, 3), Some(Layout::PressureResolved));
        assert_eq!(Layout::of(&[1, 4, 3, 1], 4, 3), Some(Layout::Species));
        assert_eq!(Layout::of(&[3, 1], 4, 3), Some(Layout::Surface));
        assert_eq!(Layout::of(&[3, 4, 1], 4, 3), None);
    }

    #[test]
    fn test_state_validation() {
        let mut variables = BTreeMap::new();
        variables.insert("temperature".to_string(), Array3::<f64>::zeros((4, 3, 1)).into_dyn());
        variables.insert("nitrogen_vmr".to_string(), Array4::<f64>::zeros((1, 4, 3, 1)).into_dyn());
        variables.insert("skin_temperature".to_string(), Array2::<f64>::zeros((3, 1)).into_dyn());

        let state = AtmosphericState::new(
            pass(),
            vec![100.0, 1_000.0, 10_000.0, 100_000.0],
            vec![0.0; 3],
            vec![0.0; 3],
            variables.clone(),
        )
        .unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(
            state.names().collect::<Vec<_>>(),
            vec!["nitrogen_vmr", "skin_temperature", "temperature"]
        );
        assert_eq!(state.layout("nitrogen_vmr"), Some(Layout::Species));
        assert!(state.get_checked("ozone").is_err());

        variables.insert("broken".to_string(), Array2::<f64>::zeros((4, 3)).into_dyn());
        let result = AtmosphericState::new(
            pass(),
            vec![100.0, 1_000.0, 10_000.0, 100_000.0],
            vec![0.0; 3],
            vec![0.0; 3],
            variables,
        );
        assert!(result.is_err());
    }
}
