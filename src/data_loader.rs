//! NetCDF data loading functionality.
//!
//! This module reads NetCDF-3/4 and HDF5 files fully into memory. Every
//! numeric variable is converted to an `f64` array with packing
//! (`scale_factor`/`add_offset`) undone and fill values replaced by NaN, so
//! the rest of the crate never deals with on-disk encodings.
//!
//! HDF4 products must be converted first (e.g. with `h4toh5`); the bundled
//! netCDF-C library is built without HDF4 support.

use ndarray::{ArrayD, IxDyn};
use netcdf::{self, Attribute, Variable as NetCDFVariable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AtmError, Result};

/// Metadata about a NetCDF dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    /// Name of the dimension
    pub name: String,
    /// Size of the dimension
    pub size: usize,
    /// Whether this dimension is unlimited
    pub is_unlimited: bool,
}

/// Metadata about a NetCDF variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Name of the variable
    pub name: String,
    /// Dimensions of the variable
    pub dimensions: Vec<String>,
    /// Shape of the variable (dimension sizes)
    pub shape: Vec<usize>,
    /// Variable attributes
    pub attributes: HashMap<String, AttributeValue>,
}

/// Possible attribute values in NetCDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// String attribute
    Text(String),
    /// Numeric attribute (stored as f64 for simplicity)
    Number(f64),
    /// Array of numbers
    NumberArray(Vec<f64>),
}

impl AttributeValue {
    /// The attribute as a single number, if it is numeric
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::NumberArray(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// The attribute as text, if it is a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Complete metadata for a NetCDF file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// File-level attributes
    pub global_attributes: HashMap<String, AttributeValue>,
    /// Dimensions in the file
    pub dimensions: HashMap<String, Dimension>,
    /// Variables in the file
    pub variables: HashMap<String, Variable>,
}

/// A NetCDF file held entirely in memory
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Where the dataset was read from
    pub path: PathBuf,
    /// File metadata
    pub metadata: Metadata,
    /// Decoded data arrays
    pub data: HashMap<String, ArrayD<f64>>,
}

impl Dataset {
    /// Names of all decoded variables, sorted
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get a variable's data array
    pub fn variable(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.data.get(name)
    }

    /// Get a variable's data array with error handling
    pub fn variable_checked(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.data.get(name).ok_or_else(|| AtmError::UnknownVariable {
            name: name.to_string(),
            available: self.variable_names(),
        })
    }

    /// Find the first of several alternative variable names present in the file
    pub fn find_variable<'a>(&'a self, candidates: &[&'a str]) -> Option<(&'a str, &'a ArrayD<f64>)> {
        candidates
            .iter()
            .find_map(|name| self.data.get(*name).map(|array| (*name, array)))
    }

    /// Get a variable attribute
    pub fn attribute(&self, variable: &str, attribute: &str) -> Option<&AttributeValue> {
        self.metadata
            .variables
            .get(variable)
            .and_then(|var| var.attributes.get(attribute))
    }

    /// Get the dimension names of a variable
    pub fn dimensions_of(&self, variable: &str) -> Option<&[String]> {
        self.metadata
            .variables
            .get(variable)
            .map(|var| var.dimensions.as_slice())
    }
}

/// Magic number at the start of every HDF4 file
const HDF4_SIGNATURE: [u8; 4] = [0x0e, 0x03, 0x13, 0x01];

fn is_hdf4(path: &Path) -> bool {
    let mut header = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut file| std::io::Read::read_exact(&mut file, &mut header))
        .map(|()| header == HDF4_SIGNATURE)
        .unwrap_or(false)
}

/// Load a NetCDF file into memory
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    // Check if the file exists
    if !path.exists() {
        return Err(AtmError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let file = netcdf::open(path).map_err(|e| AtmError::FileFormat {
        path: path.to_path_buf(),
        message: if is_hdf4(path) {
            "HDF4 files are not supported; convert the product to NetCDF-4 or HDF5 first"
                .to_string()
        } else {
            format!("Failed to open as a grid dataset: {}", e)
        },
    })?;

    info!("Opened NetCDF file: {}", path.display());
    debug!("File has {} variables", file.variables().count());
    debug!("File has {} dimensions", file.dimensions().count());

    let metadata = extract_metadata(&file)?;
    let data = extract_data(&file, &metadata);

    let dataset = Dataset {
        path: path.to_path_buf(),
        metadata,
        data,
    };
    validate_dataset(&dataset)?;

    Ok(dataset)
}

/// Extract metadata from the NetCDF file
fn extract_metadata(file: &netcdf::File) -> Result<Metadata> {
    let mut global_attributes = HashMap::new();
    for attr in file.attributes() {
        let value = convert_attribute(&attr)?;
        global_attributes.insert(attr.name().to_string(), value);
    }

    let mut dimensions = HashMap::new();
    for dim in file.dimensions() {
        let dimension = Dimension {
            name: dim.name().to_string(),
            size: dim.len(),
            is_unlimited: dim.is_unlimited(),
        };
        dimensions.insert(dim.name().to_string(), dimension);
    }

    let mut variables = HashMap::new();
    for var in file.variables() {
        let var_dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|dim| dim.name().to_string())
            .collect();
        let var_shape: Vec<usize> = var.dimensions().iter().map(|dim| dim.len()).collect();

        let mut var_attrs = HashMap::new();
        for attr in var.attributes() {
            let value = convert_attribute(&attr)?;
            var_attrs.insert(attr.name().to_string(), value);
        }

        let variable = Variable {
            name: var.name().to_string(),
            dimensions: var_dims,
            shape: var_shape,
            attributes: var_attrs,
        };
        variables.insert(var.name().to_string(), variable);
    }

    Ok(Metadata {
        global_attributes,
        dimensions,
        variables,
    })
}

/// Convert a NetCDF attribute to our AttributeValue enum
fn convert_attribute(attr: &Attribute) -> Result<AttributeValue> {
    use netcdf::AttributeValue as NcAttributeValue;

    let value = attr.value()?;

    let converted = match value {
        NcAttributeValue::Str(s) => AttributeValue::Text(s),
        NcAttributeValue::Uchar(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Schar(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Ushort(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Short(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Uint(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Int(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Ulonglong(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Longlong(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Float(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Double(v) => AttributeValue::Number(v),
        NcAttributeValue::Shorts(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Ints(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Floats(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Doubles(v) => AttributeValue::NumberArray(v),
        other => AttributeValue::Text(format!("{:?}", other)),
    };
    Ok(converted)
}

/// Extract and decode every numeric variable
fn extract_data(file: &netcdf::File, metadata: &Metadata) -> HashMap<String, ArrayD<f64>> {
    let mut data = HashMap::new();

    for (var_name, meta) in &metadata.variables {
        let Some(var) = file.variable(var_name) else {
            continue;
        };
        match read_variable(&var, meta) {
            Ok(array) => {
                data.insert(var_name.clone(), array);
            }
            Err(e) => {
                // Character and compound variables cannot be read as numbers
                warn!(variable = %var_name, error = %e, "Skipping unsupported variable");
            }
        }
    }

    data
}

/// Read a variable as f64, undoing packing and masking fill values
fn read_variable(var: &NetCDFVariable, meta: &Variable) -> Result<ArrayD<f64>> {
    let raw: Vec<f64> = var.get_values::<f64, _>(..)?;

    let number = |name: &str| meta.attributes.get(name).and_then(AttributeValue::as_number);
    let fill_values: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|&name| number(name))
        .collect();
    let scale = number("scale_factor").unwrap_or(1.0);
    let offset = number("add_offset").unwrap_or(0.0);

    let decoded: Vec<f64> = raw
        .into_iter()
        .map(|v| {
            if fill_values.iter().any(|&fill| v == fill) {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect();

    let array = ArrayD::from_shape_vec(IxDyn(&meta.shape), decoded)?;
    Ok(array)
}

/// Validate the loaded data for consistency
fn validate_dataset(dataset: &Dataset) -> Result<()> {
    if dataset.data.is_empty() {
        return Err(AtmError::FileFormat {
            path: dataset.path.clone(),
            message: "No numeric variables found".to_string(),
        });
    }

    for (var_name, var) in &dataset.metadata.variables {
        for dim_name in &var.dimensions {
            if !dataset.metadata.dimensions.contains_key(dim_name) {
                return Err(AtmError::FileFormat {
                    path: dataset.path.clone(),
                    message: format!(
                        "Variable {} references non-existent dimension {}",
                        var_name, dim_name
                    ),
                });
            }
        }

        if let Some(array) = dataset.data.get(var_name) {
            if array.shape() != var.shape.as_slice() {
                return Err(AtmError::FileFormat {
                    path: dataset.path.clone(),
                    message: format!(
                        "Variable {} has inconsistent shape: metadata {:?}, data {:?}",
                        var_name,
                        var.shape,
                        array.shape()
                    ),
                });
            }
        }
    }

    Ok(())
}
