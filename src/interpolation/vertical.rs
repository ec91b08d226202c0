//! Vertical resampling in log-pressure space.
//!
//! Atmospheric quantities vary close to linearly with `ln p`, so columns are
//! interpolated against the logarithm of pressure. Strictly positive
//! quantities such as mixing ratios can additionally be interpolated in
//! `ln value`. Requests outside the source pressure range take the value of
//! the nearest source level.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{AtmError, Result};
use crate::interpolation::common;

/// How values are treated while interpolating against `ln p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueScale {
    /// Interpolate the value itself (temperature, water content, dBZ)
    Linear,
    /// Interpolate `ln value` and exponentiate back (mixing ratios)
    Log,
}

/// A source column prepared for repeated log-pressure lookups.
///
/// Levels are stored sorted by increasing `ln p` regardless of the order
/// in which the source provided them.
#[derive(Debug, Clone)]
pub struct LogPressureAxis {
    log_pressure: Vec<f64>,
    order: Vec<usize>,
}

impl LogPressureAxis {
    /// Prepare an axis from source pressures [Pa]
    pub fn new(pressure: &[f64]) -> Result<Self> {
        if pressure.is_empty() {
            return Err(AtmError::Interpolation {
                message: "Source pressure axis is empty".to_string(),
            });
        }
        if let Some(bad) = pressure.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
            return Err(AtmError::Interpolation {
                message: format!("Source pressure {} is not a positive finite value", bad),
            });
        }
        if !common::is_strictly_monotonic(pressure) {
            return Err(AtmError::Interpolation {
                message: "Source pressure axis must be strictly monotonic".to_string(),
            });
        }

        let mut order: Vec<usize> = (0..pressure.len()).collect();
        if pressure.len() > 1 && pressure[0] > pressure[pressure.len() - 1] {
            order.reverse();
        }
        let log_pressure = order.iter().map(|&i| pressure[i].ln()).collect();

        Ok(Self {
            log_pressure,
            order,
        })
    }

    /// Number of source levels
    pub fn len(&self) -> usize {
        self.log_pressure.len()
    }

    /// Whether the axis has no levels
    pub fn is_empty(&self) -> bool {
        self.log_pressure.is_empty()
    }

    /// Interpolate one source column (given in the caller's level order) at
    /// a single target pressure.
    pub fn sample(&self, column: &[f64], target_pressure: f64, scale: ValueScale) -> Result<f64> {
        if column.len() != self.len() {
            return Err(AtmError::Interpolation {
                message: format!(
                    "Column has {} values but the pressure axis has {} levels",
                    column.len(),
                    self.len()
                ),
            });
        }
        if !(target_pressure.is_finite() && target_pressure > 0.0) {
            return Err(AtmError::InvalidParameter {
                param: "pressure_grid".to_string(),
                message: format!(
                    "Target pressure {} is not a positive finite value",
                    target_pressure
                ),
            });
        }

        let n = self.len();
        let value_at = |k: usize| column[self.order[k]];
        let x = target_pressure.ln();

        // Constant extrapolation outside the source range
        if n == 1 || x <= self.log_pressure[0] {
            return Ok(value_at(0));
        }
        if x >= self.log_pressure[n - 1] {
            return Ok(value_at(n - 1));
        }

        let upper = self.log_pressure.partition_point(|&lp| lp < x);
        if self.log_pressure[upper] == x {
            return Ok(value_at(upper));
        }
        let lower = upper - 1;
        let fraction =
            (x - self.log_pressure[lower]) / (self.log_pressure[upper] - self.log_pressure[lower]);
        let (w0, w1) = common::linear_weight(fraction);
        let (v0, v1) = (value_at(lower), value_at(upper));

        match scale {
            ValueScale::Log if v0 > 0.0 && v1 > 0.0 => Ok((w0 * v0.ln() + w1 * v1.ln()).exp()),
            // Zero or negative end-points have no logarithm; fall back to linear
            _ => Ok(w0 * v0 + w1 * v1),
        }
    }
}

/// Resample a single column from `source_pressure` onto `target_pressure`.
pub fn resample_log_pressure(
    source_pressure: &[f64],
    values: &[f64],
    target_pressure: &[f64],
    scale: ValueScale,
) -> Result<Vec<f64>> {
    let axis = LogPressureAxis::new(source_pressure)?;
    target_pressure
        .iter()
        .map(|&p| axis.sample(values, p, scale))
        .collect()
}

/// Resample every column of a `[level, sample]` array onto the target grid,
/// returning a `[target, sample]` array.
pub fn resample_columns(
    source_pressure: &[f64],
    columns: ArrayView2<f64>,
    target_pressure: &[f64],
    scale: ValueScale,
) -> Result<Array2<f64>> {
    let axis = LogPressureAxis::new(source_pressure)?;
    if columns.len_of(Axis(0)) != axis.len() {
        return Err(AtmError::Interpolation {
            message: format!(
                "Columns have {} levels but the pressure axis has {}",
                columns.len_of(Axis(0)),
                axis.len()
            ),
        });
    }

    let samples = columns.len_of(Axis(1));
    let mut result = Array2::<f64>::zeros((target_pressure.len(), samples));
    for (j, column) in columns.axis_iter(Axis(1)).enumerate() {
        let column: Vec<f64> = column.to_vec();
        for (i, &p) in target_pressure.iter().enumerate() {
            result[[i, j]] = axis.sample(&column, p, scale)?;
        }
    }
    Ok(result)
}
