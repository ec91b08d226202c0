//! Interpolation algorithms for gridded data.
//!
//! Horizontal methods implement [`Interpolator`] and operate on fractional
//! grid indices; the vertical log-pressure resampling lives in [`vertical`].

pub mod bilinear;
pub mod common;
pub mod nearest;
pub mod vertical;

use crate::error::Result;

/// Trait for horizontal interpolation methods
pub trait Interpolator {
    /// Interpolate a value at the given fractional indices
    fn interpolate(&self, data: &[f64], shape: &[usize], indices: &[f64]) -> Result<f64>;

    /// Get the name of this interpolation method
    fn name(&self) -> &str;
}

/// Get an interpolator by name
pub fn get_interpolator(name: &str) -> Result<Box<dyn Interpolator>> {
    match name.to_lowercase().as_str() {
        "nearest" => Ok(Box::new(nearest::NearestInterpolator)),
        "bilinear" => Ok(Box::new(bilinear::BilinearInterpolator)),
        _ => Err(crate::error::AtmError::InvalidParameter {
            param: "interpolation".to_string(),
            message: format!("Unknown interpolation method: {}", name),
        }),
    }
}
