//! CLI for vectile - inspect and recompress MVT tile buffers
//!
//! This is a thin wrapper around the vectile-core library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vectile_core::compression::{self, Format};
use vectile_core::decode;
use vectile_core::Value;

#[derive(Parser, Debug)]
#[command(name = "vectile", about = "Inspect and recompress MVT tile buffers", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print layer and feature statistics for a tile buffer
    Info {
        /// Tile buffer (raw, zlib or gzip compressed)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Also list every feature
        #[arg(long)]
        features: bool,
    },

    /// Compress a raw tile buffer
    Compress {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Use gzip framing instead of zlib
        #[arg(long)]
        gzip: bool,
    },

    /// Decompress a zlib or gzip compressed tile buffer
    Decompress {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Info { file, features } => info(&file, features),
        Command::Compress {
            input,
            output,
            gzip,
        } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let format = if gzip { Format::Gzip } else { Format::Zlib };
            let compressed = compression::compress_with(&data, format)
                .context("Failed to compress buffer")?;
            std::fs::write(&output, &compressed)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                compressed.len()
            );
            Ok(())
        }
        Command::Decompress { input, output } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let raw = compression::decompress(&data).context("Failed to decompress buffer")?;
            std::fs::write(&output, &raw)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                raw.len()
            );
            Ok(())
        }
    }
}

fn info(file: &PathBuf, list_features: bool) -> Result<()> {
    let mut data =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    if compression::is_compressed(&data) {
        log::debug!("compressed buffer, inflating");
        data = compression::decompress(&data).context("Failed to decompress buffer")?;
    }

    let reader = decode::parse(&data).context("Failed to parse tile buffer")?;
    println!("{}: {} layers", file.display(), reader.layers_size());

    for layer in reader.layers() {
        println!(
            "  layer {:?}: version {}, extent {}, {} features",
            layer.name(),
            layer.version(),
            layer.extent(),
            layer.features_size()
        );

        if !list_features {
            continue;
        }
        for (index, feature) in layer.features().enumerate() {
            match feature {
                Ok(feature) => {
                    let kind = if feature.raster.is_some() {
                        "raster".to_string()
                    } else {
                        match &feature.geometry {
                            Some(g) => geometry_kind(g).to_string(),
                            None => "empty".to_string(),
                        }
                    };
                    let attrs: Vec<String> = feature
                        .attributes
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, format_value(v)))
                        .collect();
                    println!(
                        "    feature {} id={:?} {} [{}]",
                        index,
                        feature.id,
                        kind,
                        attrs.join(", ")
                    );
                }
                Err(e) => println!("    feature {}: decode error: {}", index, e),
            }
        }
    }

    Ok(())
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "point",
        geo::Geometry::MultiPoint(_) => "multipoint",
        geo::Geometry::LineString(_) => "linestring",
        geo::Geometry::MultiLineString(_) => "multilinestring",
        geo::Geometry::Polygon(_) => "polygon",
        geo::Geometry::MultiPolygon(_) => "multipolygon",
        _ => "other",
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Double(d) => d.to_string(),
        Value::String(s) => format!("{:?}", s),
    }
}
