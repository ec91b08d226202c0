//! Bilinear interpolation.
//!
//! This method performs linear interpolation in each dimension using
//! the surrounding grid points (four of them on a lat/lon plane).

use super::Interpolator;
use crate::error::{AtmError, Result};
use crate::interpolation::common;

/// Bilinear interpolator
pub struct BilinearInterpolator;

impl Interpolator for BilinearInterpolator {
    fn interpolate(&self, data: &[f64], shape: &[usize], indices: &[f64]) -> Result<f64> {
        if indices.len() != shape.len() || indices.is_empty() {
            return Err(AtmError::Interpolation {
                message: format!(
                    "Dimension mismatch: indices has {} dimensions but shape has {} dimensions",
                    indices.len(),
                    shape.len()
                ),
            });
        }

        // Lower corner and fractional offset along each axis
        let mut lower = Vec::with_capacity(shape.len());
        let mut fractions = Vec::with_capacity(shape.len());
        for (&index, &size) in indices.iter().zip(shape) {
            let index = common::clamp_index(index, size);
            let base = (index.floor() as usize).min(size.saturating_sub(2));
            lower.push(base);
            fractions.push(index - base as f64);
        }

        // Visit every corner of the surrounding hypercube
        let mut value = 0.0;
        let mut corner = vec![0usize; shape.len()];
        for mask in 0..(1usize << shape.len()) {
            let mut weight = 1.0;
            for axis in 0..shape.len() {
                let upper = (mask >> axis) & 1 == 1;
                let (w0, w1) = common::linear_weight(fractions[axis]);
                weight *= if upper { w1 } else { w0 };
                corner[axis] = if upper && shape[axis] > 1 {
                    lower[axis] + 1
                } else {
                    lower[axis]
                };
            }
            if weight == 0.0 {
                continue;
            }
            let flat = common::flat_index(&corner, shape)?;
            let sample = data.get(flat).copied().ok_or_else(|| AtmError::Interpolation {
                message: format!(
                    "Index out of bounds: calculated index {} exceeds data length {}",
                    flat,
                    data.len()
                ),
            })?;
            value += weight * sample;
        }

        Ok(value)
    }

    fn name(&self) -> &str {
        "bilinear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_interpolation() {
        // f(i, j) = 10 i + j is reproduced exactly by bilinear interpolation
        let data = vec![
            0.0, 1.0, 2.0, // row 0
            10.0, 11.0, 12.0, // row 1
            20.0, 21.0, 22.0, // row 2
        ];
        let shape = [3, 3];
        let interpolator = BilinearInterpolator;

        let v = interpolator.interpolate(&data, &shape, &[0.5, 0.5]).unwrap();
        assert!((v - 5.5).abs() < 1e-12);

        let v = interpolator.interpolate(&data, &shape, &[1.25, 1.75]).unwrap();
        assert!((v - 14.25).abs() < 1e-12);

        // Grid nodes are reproduced exactly
        let v = interpolator.interpolate(&data, &shape, &[2.0, 2.0]).unwrap();
        assert_eq!(v, 22.0);
    }

    #[test]
    fn test_bilinear_single_row() {
        let data = vec![1.0, 3.0];
        let shape = [1, 2];
        let v = BilinearInterpolator
            .interpolate(&data, &shape, &[0.0, 0.5])
            .unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_corner_with_zero_weight_is_ignored() {
        let data = vec![1.0, f64::NAN, 3.0, f64::NAN];
        let shape = [2, 2];
        let v = BilinearInterpolator
            .interpolate(&data, &shape, &[0.5, 0.0])
            .unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(BilinearInterpolator
            .interpolate(&[1.0, 2.0], &[2], &[0.5, 0.5])
            .is_err());
    }
}
