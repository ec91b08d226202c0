//! Common utilities for interpolation algorithms.
//!
//! This module provides shared functionality used by the horizontal and
//! vertical interpolation methods: mapping physical coordinates onto
//! fractional grid indices and flattening multi-dimensional indices.

use crate::error::{AtmError, Result};

/// Tolerance used when a coordinate sits exactly on an axis end-point.
const EDGE_EPSILON: f64 = 1e-9;

/// Map a coordinate value to a fractional grid index.
///
/// The axis must be strictly monotonic but may run in either direction
/// (ERA5 latitudes run from north to south). Values outside the axis range
/// are a coverage failure, not an extrapolation.
pub fn coord_to_index(coord: f64, coord_values: &[f64]) -> Result<f64> {
    let n = coord_values.len();
    if n == 0 {
        return Err(AtmError::Interpolation {
            message: "Cannot index into an empty coordinate axis".to_string(),
        });
    }
    if !coord.is_finite() {
        return Err(AtmError::Coverage {
            message: format!("Non-finite coordinate {}", coord),
        });
    }
    if n == 1 {
        return if (coord - coord_values[0]).abs() <= EDGE_EPSILON {
            Ok(0.0)
        } else {
            Err(out_of_range(coord, coord_values))
        };
    }

    let ascending = coord_values[n - 1] > coord_values[0];
    let (lo, hi) = if ascending {
        (coord_values[0], coord_values[n - 1])
    } else {
        (coord_values[n - 1], coord_values[0])
    };
    if coord < lo - EDGE_EPSILON || coord > hi + EDGE_EPSILON {
        return Err(out_of_range(coord, coord_values));
    }

    // Binary search for the interval [i, i+1] containing coord
    let mut left = 0;
    let mut right = n - 1;
    while right - left > 1 {
        let mid = (left + right) / 2;
        let before = if ascending {
            coord_values[mid] <= coord
        } else {
            coord_values[mid] >= coord
        };
        if before {
            left = mid;
        } else {
            right = mid;
        }
    }

    let span = coord_values[right] - coord_values[left];
    let fraction = (coord - coord_values[left]) / span;
    Ok(clamp_index(left as f64 + fraction, n))
}

fn out_of_range(coord: f64, coord_values: &[f64]) -> AtmError {
    AtmError::Coverage {
        message: format!(
            "Coordinate {} is outside the grid range ({} to {})",
            coord,
            coord_values[0],
            coord_values[coord_values.len() - 1]
        ),
    }
}

/// Clamp an index to valid bounds
pub fn clamp_index(index: f64, size: usize) -> f64 {
    index.max(0.0).min((size - 1) as f64)
}

/// Get the weight for linear interpolation
pub fn linear_weight(fraction: f64) -> (f64, f64) {
    (1.0 - fraction, fraction)
}

/// Flatten a multi-dimensional index into a row-major offset
pub fn flat_index(indices: &[usize], shape: &[usize]) -> Result<usize> {
    if indices.len() != shape.len() {
        return Err(AtmError::Interpolation {
            message: format!(
                "Dimension mismatch: {} indices for a {}-dimensional shape",
                indices.len(),
                shape.len()
            ),
        });
    }

    let mut offset = 0;
    for (&index, &size) in indices.iter().zip(shape) {
        if index >= size {
            return Err(AtmError::Interpolation {
                message: format!("Index {} out of bounds for axis of length {}", index, size),
            });
        }
        offset = offset * size + index;
    }
    Ok(offset)
}

/// Check that a coordinate axis is strictly monotonic
pub fn is_strictly_monotonic(values: &[f64]) -> bool {
    if values.len() < 2 {
        return true;
    }
    let increasing = values.windows(2).all(|w| w[1] > w[0]);
    let decreasing = values.windows(2).all(|w| w[1] < w[0]);
    increasing || decreasing
}

/// Whether an ascending longitude axis [degrees] closes around the globe
pub fn is_global_longitude(longitude: &[f64]) -> bool {
    let n = longitude.len();
    if n < 2 {
        return false;
    }
    let step = longitude[1] - longitude[0];
    if step <= 0.0 {
        return false;
    }
    let closing = longitude[n - 1] + step - longitude[0];
    (closing - 360.0).abs() < step * 1e-3
}

/// Shift a longitude by whole turns into the span of `axis`.
///
/// A periodic axis covers `[first, first + 360]` once its wrapped column has
/// been appended; a regional axis only accepts shifts that land inside it.
pub fn align_longitude(longitude: f64, axis: &[f64], periodic: bool) -> Option<f64> {
    let (first, last) = (*axis.first()?, *axis.last()?);
    let (lo, hi) = (first.min(last), first.max(last));
    if periodic {
        return Some(lo + (longitude - lo).rem_euclid(360.0));
    }
    [longitude, longitude + 360.0, longitude - 360.0]
        .into_iter()
        .find(|lon| *lon >= lo - EDGE_EPSILON && *lon <= hi + EDGE_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-1.0, 10), 0.0);
        assert_eq!(clamp_index(5.5, 10), 5.5);
        assert_eq!(clamp_index(15.0, 10), 9.0);
    }

    #[test]
    fn test_linear_weight() {
        let (w0, w1) = linear_weight(0.3);
        assert!((w0 - 0.7).abs() < 1e-10);
        assert!((w1 - 0.3).abs() < 1e-10);
        assert!((w0 + w1 - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_coord_to_index_ascending() {
        let axis = [0.0, 0.25, 0.5, 0.75, 1.0];
        assert!((coord_to_index(0.0, &axis).unwrap() - 0.0).abs() < 1e-12);
        assert!((coord_to_index(0.375, &axis).unwrap() - 1.5).abs() < 1e-12);
        assert!((coord_to_index(1.0, &axis).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_coord_to_index_descending() {
        // ERA5 style latitude axis
        let axis = [90.0, 45.0, 0.0, -45.0, -90.0];
        assert!((coord_to_index(90.0, &axis).unwrap() - 0.0).abs() < 1e-12);
        assert!((coord_to_index(22.5, &axis).unwrap() - 1.5).abs() < 1e-12);
        assert!((coord_to_index(-90.0, &axis).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_coord_to_index_out_of_range() {
        let axis = [10.0, 20.0, 30.0];
        assert!(matches!(
            coord_to_index(35.0, &axis),
            Err(AtmError::Coverage { .. })
        ));
        assert!(matches!(
            coord_to_index(f64::NAN, &axis),
            Err(AtmError::Coverage { .. })
        ));
    }

    #[test]
    fn test_coord_to_index_single_point() {
        assert_eq!(coord_to_index(5.0, &[5.0]).unwrap(), 0.0);
        assert!(coord_to_index(5.5, &[5.0]).is_err());
    }

    #[test]
    fn test_flat_index() {
        assert_eq!(flat_index(&[1, 2], &[3, 4]).unwrap(), 6);
        assert!(flat_index(&[3, 0], &[3, 4]).is_err());
        assert!(flat_index(&[0], &[3, 4]).is_err());
    }

    #[test]
    fn test_monotonic() {
        assert!(is_strictly_monotonic(&[1.0, 2.0, 3.0]));
        assert!(is_strictly_monotonic(&[3.0, 2.0, 1.0]));
        assert!(!is_strictly_monotonic(&[1.0, 1.0, 2.0]));
    }

    #[test]
    fn test_global_longitude() {
        let global: Vec<f64> = (0..1440).map(|i| i as f64 * 0.25).collect();
        assert!(is_global_longitude(&global));
        let shifted: Vec<f64> = (0..360).map(|i| i as f64 - 180.0).collect();
        assert!(is_global_longitude(&shifted));
        assert!(!is_global_longitude(&[-10.0, 0.0, 10.0]));
    }

    #[test]
    fn test_align_longitude() {
        let atlantic = [-60.0, -30.0, 0.0, 30.0];
        assert_eq!(align_longitude(350.0, &atlantic, false), Some(-10.0));
        assert_eq!(align_longitude(-45.0, &atlantic, false), Some(-45.0));
        assert_eq!(align_longitude(90.0, &atlantic, false), None);

        let global = [0.0, 90.0, 180.0, 270.0, 360.0];
        assert_eq!(align_longitude(-90.0, &global, true), Some(270.0));
        assert_eq!(align_longitude(720.0, &global, true), Some(0.0));
    }
}
