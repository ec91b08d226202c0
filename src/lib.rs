//! # dardar-atm
//!
//! Collocates ERA5 reanalysis fields with DARDAR cloud-profile retrievals.
//!
//! A satellite pass is read from its product file, ERA5 fields are sampled
//! along the orbital track (nearest analysis hour in time, bilinear in
//! latitude/longitude) and resampled in log-pressure onto a fixed pressure
//! grid. Together with the retrieved ice water content, radar reflectivity
//! and a few derived quantities they form the atmospheric state handed to a
//! radiative-transfer model.
//!
//! ## Architecture
//!
//! - **Inputs**: [`profile`] reads the satellite product, [`reanalysis`]
//!   supplies ERA5 fields, [`terrain`] the surface elevation
//! - **Processing**: [`interpolation`] maps regular grids onto the track and
//!   onto the pressure grid, [`physics`] holds the unit conversions
//! - **Assembly**: [`builder`] computes the state variables into an
//!   [`state::AtmosphericState`], which [`output`] writes and archives

pub mod builder;
pub mod config;
pub mod data_loader;
pub mod error;
pub mod interpolation;
pub mod logging;
pub mod output;
pub mod physics;
pub mod profile;
pub mod reanalysis;
pub mod state;
pub mod terrain;

pub use builder::{AtmosphericStateBuilder, StateInputs, StateVariable};
pub use config::{Config, DEFAULT_PRESSURE_GRID};
pub use error::{AtmError, Result};
pub use logging::{
    generate_run_id, init_tracing, log_error, log_operation_end, log_operation_start,
    log_pass_stats, log_timed_operation,
};
pub use profile::{OrbitNode, ProfileReader, Track};
pub use reanalysis::{FieldSource, LevelKind, LocalArchive, ReanalysisField, ReanalysisProvider};
pub use state::{AtmosphericState, PassInfo};
pub use terrain::ElevationGrid;
