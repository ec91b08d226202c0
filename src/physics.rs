//! Physical constants and unit conversions.
//!
//! Everything here is a pure function of its arguments and works on `f64` in
//! SI units (Pa, K, m, kg/kg) unless stated otherwise.

/// Standard gravity [m s^-2], used to turn geopotential into altitude.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Specific gas constant of dry air [J kg^-1 K^-1].
pub const GAS_CONSTANT_DRY_AIR: f64 = 287.057;

/// Sea-level pressure of the standard atmosphere [Pa].
pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

/// Lapse-rate coefficient of the barometric formula [m^-1].
const BAROMETRIC_SCALE: f64 = 2.25577e-5;

/// Exponent of the barometric formula.
const BAROMETRIC_EXPONENT: f64 = 5.25588;

/// Reference volume mixing ratio of molecular nitrogen in dry air.
pub const N2_REFERENCE_VMR: f64 = 0.781;

/// Reference volume mixing ratio of molecular oxygen in dry air.
pub const O2_REFERENCE_VMR: f64 = 0.209;

/// Convert altitude [m] to pressure [Pa] with the standard barometric formula.
pub fn height_to_pressure(height: f64) -> f64 {
    SEA_LEVEL_PRESSURE * (1.0 - BAROMETRIC_SCALE * height).powf(BAROMETRIC_EXPONENT)
}

/// Inverse of [`height_to_pressure`].
pub fn pressure_to_height(pressure: f64) -> f64 {
    (1.0 - (pressure / SEA_LEVEL_PRESSURE).powf(1.0 / BAROMETRIC_EXPONENT)) / BAROMETRIC_SCALE
}

/// Air density [kg m^-3] from pressure [Pa] and temperature [K] (ideal gas).
pub fn air_density(pressure: f64, temperature: f64) -> f64 {
    pressure / (GAS_CONSTANT_DRY_AIR * temperature)
}

/// Volume mixing ratio of water vapour from specific humidity [kg/kg].
pub fn specific_humidity_to_vmr(q: f64) -> f64 {
    q / (1.0 - q)
}

/// Scale a dry-air reference VMR down by the fraction occupied by water vapour.
pub fn scale_vmr(reference: f64, h2o_vmr: f64) -> f64 {
    reference * (1.0 - h2o_vmr)
}

/// Wind speed from its eastward and northward components.
pub fn wind_speed(u: f64, v: f64) -> f64 {
    u.hypot(v)
}

/// Wind direction in degrees as `atan2(u, v)`, measured clockwise from north
/// in (-180, 180].
pub fn wind_direction(u: f64, v: f64) -> f64 {
    u.atan2(v).to_degrees()
}

/// Geopotential [m^2 s^-2] to geopotential height [m].
pub fn geopotential_to_height(geopotential: f64) -> f64 {
    geopotential / STANDARD_GRAVITY
}
