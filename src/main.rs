use anyhow::Result;
use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use itm_gis::{is_gis_file, is_shapefile_component, parse_gis_file};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input GIS file (DXF/GeoJSON/KML/KMZ/GPX/ZIP) or a directory of them
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Number of worker threads (default: CPU core count)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Pretty-print the GeoJSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .expect("Failed to build thread pool");
    }

    fs::create_dir_all(&args.output)?;

    if args.input.is_file() {
        if !is_gis_file(&file_name(&args.input)) {
            error!("Unsupported file type: {:?}", args.input);
            anyhow::bail!("Input file must be .dxf, .geojson, .json, .kml, .kmz, .gpx or .zip");
        }
        process_file(&args.input, &args)?;
    } else if args.input.is_dir() {
        info!("Processing directory: {:?}", args.input);
        process_directory(&args.input, &args)?;
    } else {
        error!("Invalid input path: {:?}", args.input);
        anyhow::bail!("Input path must be a file or directory");
    }

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn process_file(path: &Path, args: &Args) -> Result<()> {
    info!("Processing file: {:?}", path);

    let bytes = fs::read(path)?;
    let layer = parse_gis_file(&file_name(path), &bytes)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer");
    let output_path = args.output.join(format!("{stem}.geojson"));

    let json = if args.pretty {
        serde_json::to_string_pretty(&layer.geojson)?
    } else {
        serde_json::to_string(&layer.geojson)?
    };
    fs::write(&output_path, json)?;

    info!(
        "Written {:?}: {} features, bbox {:?}",
        output_path, layer.feature_count, layer.bbox
    );
    Ok(())
}

fn process_directory(dir: &Path, args: &Args) -> Result<()> {
    use rayon::prelude::*;

    let input_files = collect_input_files(dir)?;
    info!("Found {} GIS files", input_files.len());

    let results: Vec<Result<()>> = input_files
        .par_iter()
        .map(|path| process_file(path, args))
        .collect();

    let mut errors = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            errors.push(format!("{}: {}", input_files[i].display(), e));
        }
    }

    if !errors.is_empty() {
        error!("Failed to process {} files:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} files failed to process", errors.len());
    }

    Ok(())
}

fn collect_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            files.extend(collect_input_files(&path)?);
            continue;
        }

        let name = file_name(&path);
        // Bare shapefile members are only readable through a ZIP bundle.
        if is_gis_file(&name) && !is_shapefile_component(&name) {
            files.push(path);
        }
    }

    Ok(files)
}
