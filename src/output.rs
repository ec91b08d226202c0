//! Writing an atmospheric state to disk.
//!
//! Each pass becomes a directory named after the pass holding one NetCDF
//! file per state variable, the grid files and a JSON manifest. The
//! directory is then packed into a zip archive next to it and removed.

use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AtmError, Result};
use crate::profile::OrbitNode;
use crate::state::{AtmosphericState, Layout};

/// Pressure grid file stem
pub const PRESSURE_GRID_FILE: &str = "p_grid";
/// Track latitude file stem
pub const LATITUDE_FILE: &str = "lat_true";
/// Track longitude file stem
pub const LONGITUDE_FILE: &str = "lon_true";
/// Manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// One variable listed in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub file: String,
    pub shape: Vec<usize>,
    pub layout: Layout,
}

/// Description of a written pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub pass: String,
    pub source: PathBuf,
    pub time: NaiveDateTime,
    pub node: OrbitNode,
    pub samples: usize,
    pub levels: usize,
    pub abs_species: Vec<String>,
    pub variables: Vec<ManifestEntry>,
}

impl Manifest {
    /// Describe a state
    pub fn from_state(state: &AtmosphericState) -> Self {
        let variables = state
            .iter()
            .filter_map(|(name, array)| {
                state.layout(name).map(|layout| ManifestEntry {
                    name: name.to_string(),
                    file: format!("{}.nc", name),
                    shape: array.shape().to_vec(),
                    layout,
                })
            })
            .collect();

        Self {
            pass: state.pass().output_name(),
            source: state.pass().source.clone(),
            time: state.pass().time,
            node: state.pass().node,
            samples: state.samples(),
            levels: state.pressure_grid().len(),
            abs_species: state
                .absorption_species()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            variables,
        }
    }
}

fn dimension_names(layout: Layout) -> &'static [&'static str] {
    match layout {
        Layout::PressureResolved => &["pressure", "sample", "column"],
        Layout::Species => &["species", "pressure", "sample", "column"],
        Layout::Surface => &["sample", "column"],
    }
}

/// Write one array with named dimensions to its own NetCDF file
fn write_array(path: &Path, name: &str, dims: &[&str], array: &ArrayD<f64>) -> Result<()> {
    if dims.len() != array.ndim() {
        return Err(AtmError::InvalidParameter {
            param: name.to_string(),
            message: format!(
                "{} dimension names for a {}-dimensional array",
                dims.len(),
                array.ndim()
            ),
        });
    }

    let mut file = netcdf::create(path)?;
    for (dim, &len) in dims.iter().zip(array.shape()) {
        file.add_dimension(dim, len)?;
    }
    file.add_attribute("title", name)?;

    let values: Vec<f64> = array.iter().copied().collect();
    let mut var = file.add_variable::<f64>(name, dims)?;
    var.put_values(&values, ..)?;
    Ok(())
}

fn write_vector(path: &Path, name: &str, units: &str, values: &[f64]) -> Result<()> {
    let mut file = netcdf::create(path)?;
    file.add_dimension(name, values.len())?;
    let mut var = file.add_variable::<f64>(name, &[name])?;
    var.put_attribute("units", units)?;
    var.put_values(values, ..)?;
    Ok(())
}

/// Write every state variable, the grids and the manifest into `dir`
pub fn write_state(state: &AtmosphericState, dir: &Path) -> Result<Manifest> {
    fs::create_dir_all(dir)?;

    let manifest = Manifest::from_state(state);
    for entry in &manifest.variables {
        let array = state.get_checked(&entry.name)?;
        debug!(variable = %entry.name, shape = ?entry.shape, "Writing state variable");
        write_array(
            &dir.join(&entry.file),
            &entry.name,
            dimension_names(entry.layout),
            array,
        )?;
    }

    write_vector(
        &dir.join(format!("{}.nc", PRESSURE_GRID_FILE)),
        PRESSURE_GRID_FILE,
        "Pa",
        state.pressure_grid(),
    )?;
    write_vector(
        &dir.join(format!("{}.nc", LATITUDE_FILE)),
        LATITUDE_FILE,
        "degrees_north",
        state.latitude(),
    )?;
    write_vector(
        &dir.join(format!("{}.nc", LONGITUDE_FILE)),
        LONGITUDE_FILE,
        "degrees_east",
        state.longitude(),
    )?;

    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(dir.join(MANIFEST_FILE), json)?;

    info!(
        dir = %dir.display(),
        variables = manifest.variables.len(),
        "State written"
    );
    Ok(manifest)
}

/// Pack the files of `dir` into `<dir>.zip` and remove the directory
pub fn archive_directory(dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AtmError::InvalidParameter {
            param: "dir".to_string(),
            message: format!("{} has no usable directory name", dir.display()),
        })?;
    let archive_path = dir.with_file_name(format!("{}.zip", name));

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    entries.retain(|path| path.is_file());
    entries.sort();

    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for path in &entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(file_name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;

    fs::remove_dir_all(dir)?;
    info!(
        archive = %archive_path.display(),
        files = entries.len(),
        "Pass archived"
    );
    Ok(archive_path)
}

/// Write a state under `output_root` and, unless `keep_directory` is set,
/// archive it. Returns the directory or archive path.
pub fn write_pass(
    state: &AtmosphericState,
    output_root: &Path,
    keep_directory: bool,
) -> Result<PathBuf> {
    let dir = output_root.join(state.pass().output_name());
    write_state(state, &dir)?;
    if keep_directory {
        Ok(dir)
    } else {
        archive_directory(&dir)
    }
}
