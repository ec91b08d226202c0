//! Configuration management for dardar-atm.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::builder::StateVariable;
use crate::error::{AtmError, Result};
use crate::profile::OrbitNode;

/// ERA5 pressure levels plus 1150 hPa, in Pa
pub const DEFAULT_PRESSURE_GRID: [f64; 38] = [
    100.0, 200.0, 300.0, 500.0, 700.0, 1_000.0, 2_000.0, 3_000.0, 5_000.0, 7_000.0, 10_000.0,
    12_500.0, 15_000.0, 17_500.0, 20_000.0, 22_500.0, 25_000.0, 30_000.0, 35_000.0, 40_000.0,
    45_000.0, 50_000.0, 55_000.0, 60_000.0, 65_000.0, 70_000.0, 75_000.0, 77_500.0, 80_000.0,
    82_500.0, 85_000.0, 87_500.0, 90_000.0, 92_500.0, 95_000.0, 97_500.0, 100_000.0, 115_000.0,
];

/// Command-line arguments for dardar-atm
#[derive(Parser, Debug)]
#[command(name = "dardar-atm")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// DARDAR product files to process (NetCDF-4 or HDF5; convert HDF4 products first)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving one archive per pass
    #[arg(short, long, env = "DARDAR_ATM_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory holding the downloaded ERA5 files
    #[arg(short, long, env = "DARDAR_ATM_REANALYSIS_DIR")]
    pub reanalysis_dir: Option<PathBuf>,

    /// NetCDF elevation model used for surface_elevation
    #[arg(short, long, env = "DARDAR_ATM_TERRAIN_FILE")]
    pub terrain_file: Option<PathBuf>,

    /// Southern latitude limit [degrees]
    #[arg(long, env = "DARDAR_ATM_LAT_MIN", allow_hyphen_values = true)]
    pub lat_min: Option<f64>,

    /// Northern latitude limit [degrees]
    #[arg(long, env = "DARDAR_ATM_LAT_MAX", allow_hyphen_values = true)]
    pub lat_max: Option<f64>,

    /// Orbit segments to process (all, A, D_N, D_S); repeatable
    #[arg(
        short,
        long = "node",
        env = "DARDAR_ATM_NODES",
        value_delimiter = ',',
        value_parser = parse_node
    )]
    pub nodes: Vec<OrbitNode>,

    /// Horizontal interpolation method (nearest, bilinear)
    #[arg(short, long, env = "DARDAR_ATM_INTERPOLATION")]
    pub interpolation: Option<String>,

    /// Leave the per-pass directory in place instead of zipping it
    #[arg(long, env = "DARDAR_ATM_KEEP_DIRECTORY")]
    pub keep_directory: bool,

    /// Path to JSON configuration file
    #[arg(short, long, env = "DARDAR_ATM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DARDAR_ATM_LOG_LEVEL")]
    pub log_level: Option<String>,
}

fn parse_node(value: &str) -> std::result::Result<OrbitNode, String> {
    value.parse::<OrbitNode>().map_err(|e| e.to_string())
}

/// What is computed for each pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Target pressure grid [Pa]
    #[serde(default = "default_pressure_grid")]
    pub pressure_grid: Vec<f64>,

    /// Inclusive latitude band [degrees]; `None` keeps every sample
    #[serde(default)]
    pub latitude_limits: Option<(f64, f64)>,

    /// Orbit segments processed for every input file
    #[serde(default = "default_nodes")]
    pub nodes: Vec<OrbitNode>,

    /// Horizontal interpolation method
    #[serde(default = "default_interpolation")]
    pub interpolation_method: String,

    /// Additional pressure-level reanalysis variables, by CDS name
    #[serde(default)]
    pub extra_pressure_level_variables: Vec<String>,

    /// Additional single-level reanalysis variables, by CDS name
    #[serde(default)]
    pub extra_single_level_variables: Vec<String>,
}

/// Where data is read from and written to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of ERA5 files named by `era5_filename`
    #[serde(default = "default_reanalysis_dir")]
    pub reanalysis_dir: PathBuf,

    /// Elevation model; without it `surface_elevation` is skipped
    #[serde(default)]
    pub terrain_file: Option<PathBuf>,

    /// Output directory
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Keep per-pass directories rather than zipping them
    #[serde(default)]
    pub keep_directory: bool,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Data locations
    #[serde(default)]
    pub data: DataConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<(Self, Vec<PathBuf>)> {
        Self::from_args(Args::parse())
    }

    /// Resolve configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<(Self, Vec<PathBuf>)> {
        // Start with defaults
        let mut config = Config::default();

        // Load from JSON file if provided
        if let Some(config_path) = &args.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        // Override with command-line arguments
        if let Some(output) = args.output {
            config.data.output_dir = output;
        }
        if let Some(dir) = args.reanalysis_dir {
            config.data.reanalysis_dir = dir;
        }
        if args.terrain_file.is_some() {
            config.data.terrain_file = args.terrain_file;
        }
        if args.keep_directory {
            config.data.keep_directory = true;
        }
        match (args.lat_min, args.lat_max) {
            (Some(lo), Some(hi)) => config.processing.latitude_limits = Some((lo, hi)),
            (None, None) => {}
            _ => {
                return Err(AtmError::Config {
                    message: "--lat-min and --lat-max must be given together".to_string(),
                });
            }
        }
        if !args.nodes.is_empty() {
            config.processing.nodes = args.nodes;
        }
        if let Some(method) = args.interpolation {
            config.processing.interpolation_method = method;
        }
        if let Some(level) = args.log_level {
            config.log_level = level;
        }

        Ok((config, args.inputs))
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        self.processing = other.processing;
        self.data.reanalysis_dir = other.data.reanalysis_dir;
        self.data.output_dir = other.data.output_dir;
        if other.data.terrain_file.is_some() {
            self.data.terrain_file = other.data.terrain_file;
        }
        self.data.keep_directory |= other.data.keep_directory;
        self.log_level = other.log_level;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let grid = &self.processing.pressure_grid;
        if grid.is_empty() {
            return Err(AtmError::Config {
                message: "Pressure grid cannot be empty".to_string(),
            });
        }
        if let Some(p) = grid.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
            return Err(AtmError::Config {
                message: format!("Pressure grid value {} is not a positive pressure", p),
            });
        }
        let increasing = grid.windows(2).all(|w| w[1] > w[0]);
        let decreasing = grid.windows(2).all(|w| w[1] < w[0]);
        if !(increasing || decreasing) {
            return Err(AtmError::Config {
                message: "Pressure grid must be strictly monotonic".to_string(),
            });
        }

        if let Some((lo, hi)) = self.processing.latitude_limits {
            if !(-90.0..=90.0).contains(&lo) || !(-90.0..=90.0).contains(&hi) || lo > hi {
                return Err(AtmError::Config {
                    message: format!("Invalid latitude limits: [{}, {}]", lo, hi),
                });
            }
        }

        // Extra variables are written under their own names
        let mut names = HashSet::new();
        for name in self
            .processing
            .extra_pressure_level_variables
            .iter()
            .chain(&self.processing.extra_single_level_variables)
        {
            if name.parse::<StateVariable>().is_ok() || !names.insert(name.as_str()) {
                return Err(AtmError::Config {
                    message: format!("Extra variable '{}' is requested more than once", name),
                });
            }
        }

        if self.processing.nodes.is_empty() {
            return Err(AtmError::Config {
                message: "At least one orbit node must be selected".to_string(),
            });
        }

        // Validate log level
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(AtmError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        // Validate interpolation method
        match self.processing.interpolation_method.as_str() {
            "nearest" | "bilinear" => {}
            _ => {
                return Err(AtmError::Config {
                    message: format!(
                        "Invalid interpolation method: {}. Must be one of: nearest, bilinear",
                        self.processing.interpolation_method
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig::default(),
            data: DataConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            pressure_grid: default_pressure_grid(),
            latitude_limits: None,
            nodes: default_nodes(),
            interpolation_method: default_interpolation(),
            extra_pressure_level_variables: Vec::new(),
            extra_single_level_variables: Vec::new(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            reanalysis_dir: default_reanalysis_dir(),
            terrain_file: None,
            output_dir: default_output_dir(),
            keep_directory: false,
        }
    }
}

// Default value functions for serde
fn default_pressure_grid() -> Vec<f64> {
    DEFAULT_PRESSURE_GRID.to_vec()
}

fn default_nodes() -> Vec<OrbitNode> {
    vec![
        OrbitNode::Ascending,
        OrbitNode::DescendingNorth,
        OrbitNode::DescendingSouth,
    ]
}

fn default_interpolation() -> String {
    "bilinear".to_string()
}

fn default_reanalysis_dir() -> PathBuf {
    PathBuf::from("ERA5")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_log_level() -> String {
    "info".to_string()
}
