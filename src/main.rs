//! dardar-atm - ERA5 atmospheric states along DARDAR satellite passes
//!
//! This is the main entry point: every input file is processed for every
//! configured orbit node, and a failed pass is logged and skipped.

use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

use dardar_atm::builder::{AtmosphericStateBuilder, StateInputs, StateVariable};
use dardar_atm::logging::{
    init_tracing, log_error, log_operation_end, log_operation_start, log_pass_stats,
    log_timed_operation,
};
use dardar_atm::output::write_pass;
use dardar_atm::profile::{OrbitNode, ProfileReader};
use dardar_atm::reanalysis::LocalArchive;
use dardar_atm::terrain::ElevationGrid;
use dardar_atm::{Config, Result};

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("dardar-atm: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Load configuration
    let (config, inputs) = Config::load()?;
    init_tracing(&config.log_level);

    info!("Starting dardar-atm v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let terrain = match &config.data.terrain_file {
        Some(path) => Some(log_timed_operation("load_terrain", || {
            ElevationGrid::open(path)
        })?),
        None => {
            warn!("No terrain file configured, surface_elevation will be skipped");
            None
        }
    };
    let archive = LocalArchive::new(&config.data.reanalysis_dir);
    info!(reanalysis_dir = %archive.root().display(), "Using local ERA5 archive");
    std::fs::create_dir_all(&config.data.output_dir)?;

    let mut variables = StateVariable::standard();
    if terrain.is_none() {
        variables.retain(|v| *v != StateVariable::SurfaceElevation);
    }
    variables.extend(
        config
            .processing
            .extra_pressure_level_variables
            .iter()
            .cloned()
            .map(StateVariable::PressureLevel),
    );
    variables.extend(
        config
            .processing
            .extra_single_level_variables
            .iter()
            .cloned()
            .map(StateVariable::SingleLevel),
    );

    let mut written = 0;
    let mut failed = 0;
    for input in &inputs {
        for &node in &config.processing.nodes {
            let context = format!("{} ({})", input.display(), node);
            let start = Instant::now();
            log_operation_start("pass", Some(&context));

            let result = process_pass(
                input,
                node,
                &config,
                &archive,
                terrain.as_ref(),
                &variables,
            );
            match &result {
                Ok(()) => written += 1,
                Err(e) => {
                    log_error(e, &context);
                    failed += 1;
                }
            }
            log_operation_end("pass", start, result.is_ok());
        }
    }

    info!(written = written, failed = failed, "All inputs processed");
    Ok(())
}

fn process_pass(
    input: &Path,
    node: OrbitNode,
    config: &Config,
    archive: &LocalArchive,
    terrain: Option<&ElevationGrid>,
    variables: &[StateVariable],
) -> Result<()> {
    let profile =
        ProfileReader::open(input, config.processing.latitude_limits)?.with_node(node)?;
    info!(
        file = %input.display(),
        node = %node,
        samples = profile.len(),
        latitude_range = ?profile.latitude_range(),
        "Pass selected"
    );

    let inputs = StateInputs {
        profile: &profile,
        source: archive,
        terrain,
        pressure_grid: &config.processing.pressure_grid,
        interpolation: &config.processing.interpolation_method,
    };
    let state = AtmosphericStateBuilder::new(inputs)
        .with_variables(variables.to_vec())
        .build()?;

    let destination = write_pass(&state, &config.data.output_dir, config.data.keep_directory)?;
    log_pass_stats(&state, &destination.display().to_string());
    Ok(())
}
