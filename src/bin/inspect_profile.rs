use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use dardar_atm::data_loader::load_dataset;
use dardar_atm::profile::{timestamp_from_filename, OrbitNode, ProfileReader};

/// Print the catalog, shapes and pass times of a satellite product file
#[derive(Parser, Debug)]
#[command(name = "inspect_profile")]
struct Args {
    /// Product file to inspect
    file: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let file_path = args.file;

    println!("Inspecting product file: {}", file_path.display());

    match timestamp_from_filename(&file_path) {
        Ok(t) => println!("Filename timestamp: {}", t),
        Err(e) => println!("Filename timestamp: unavailable ({})", e),
    }

    let dataset = load_dataset(&file_path)?;

    println!("\n=== FILE INFORMATION ===");

    let mut dims: Vec<_> = dataset.metadata.dimensions.values().collect();
    dims.sort_by(|a, b| a.name.cmp(&b.name));
    println!("\nDimensions:");
    for dim in dims {
        println!(
            "  {} = {} {}",
            dim.name,
            dim.size,
            if dim.is_unlimited { "(unlimited)" } else { "" }
        );
    }

    println!("\nVariables:");
    for name in dataset.variable_names() {
        let Some(data) = dataset.variable(&name) else {
            continue;
        };
        let dims = dataset.dimensions_of(&name).unwrap_or_default();
        let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
        let (min, max) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        print!("  {} [{}] {:?}", name, dims.join(", "), data.shape());
        if finite.is_empty() {
            println!(" no valid values");
        } else {
            println!(" range {} .. {} ({} missing)", min, max, data.len() - finite.len());
        }
    }

    let profile = ProfileReader::open(&file_path, None)?;
    println!("\nPass segments:");
    for node in [
        OrbitNode::All,
        OrbitNode::Ascending,
        OrbitNode::DescendingNorth,
        OrbitNode::DescendingSouth,
    ] {
        match profile.clone().with_node(node) {
            Ok(segment) => println!(
                "  {:<4} {:>6} samples  {} .. {}",
                node.tag(),
                segment.len(),
                segment.start_time()?,
                segment.end_time()?
            ),
            Err(_) => println!("  {:<4} {:>6} samples", node.tag(), 0),
        }
    }

    Ok(())
}
