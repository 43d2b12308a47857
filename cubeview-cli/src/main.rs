//! cubeview CLI.
//!
//! Offline tools around the viewer client: inspect dataset headers, print
//! tone-mapping curves, decode captured server messages and validate
//! viewer configuration files.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};

use cubeview_core::{ColourTable, Dataset, FluxCurve};
use cubeview_protocol::{DatasetHeader, Request, Response};
use cubeview_session::ViewerConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] cubeview_core::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] cubeview_protocol::Error),

    #[error("Configuration error: {0}")]
    Session(#[from] cubeview_session::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Tools for the cubeview FITS cube client.
#[derive(Parser)]
#[command(name = "cubeview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a dataset header JSON file
    Inspect {
        /// Header JSON as sent by the server
        header: PathBuf,
    },

    /// Print the tone-mapping curve of a dataset
    Curve {
        /// Header JSON as sent by the server
        header: PathBuf,

        /// Override the flux curve named in the header
        #[arg(short, long)]
        flux: Option<String>,

        /// Colour table used for the RGB column
        #[arg(short, long, default_value = "greyscale")]
        colourmap: String,

        /// Number of sample points between black and white
        #[arg(short, long, default_value = "11")]
        samples: usize,
    },

    /// Decode a captured binary server message
    Decode {
        /// File holding one binary frame
        input: PathBuf,
    },

    /// Parse request strings, one per line, and print them normalised
    Request {
        /// File with captured request lines
        input: PathBuf,
    },

    /// Validate a viewer configuration file and print the effective values
    CheckConfig {
        /// Configuration JSON (missing fields take defaults)
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let header = DatasetHeader::from_file(path)?;
    log::info!("read header for {} from {}", header.dataset_id, path.display());
    Ok(header.to_dataset()?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { header } => {
            let dataset = load_dataset(&header)?;
            let stats = &dataset.stats;

            println!("Dataset: {}", dataset.id);
            println!(
                "Size: {} x {} x {} ({} polarisation(s))",
                dataset.width, dataset.height, dataset.depth, dataset.polarisation
            );
            match dataset.frequency_range() {
                Some((lo, hi)) => println!("Frequency range: {:.6} - {:.6} GHz", lo / 1e9, hi / 1e9),
                None => println!("Frequency range: n/a"),
            }
            if dataset.calibration.restfrq > 0.0 {
                println!("Rest frequency: {:.6} GHz", dataset.calibration.restfrq / 1e9);
            }
            println!("Flux curve: {}", dataset.curve);
            if dataset.is_calibrated() {
                println!("Pixel range: {} - {}", stats.min, stats.max);
                println!(
                    "Black / median / white: {} / {} / {}",
                    stats.black, stats.median, stats.white
                );
                println!(
                    "Sensitivity: {} (ratio {})",
                    stats.sensitivity, stats.ratio_sensitivity
                );
            } else {
                println!("Statistics: not yet computed");
            }
            println!("Histogram bins: {}", dataset.histogram.len());
            println!(
                "Spectra: {} mean, {} integrated",
                dataset.mean_spectrum.len(),
                dataset.integrated_spectrum.len()
            );
        }

        Commands::Curve {
            header,
            flux,
            colourmap,
            samples,
        } => {
            let mut dataset = load_dataset(&header)?;
            if let Some(name) = flux {
                dataset.curve = name.parse::<FluxCurve>()?;
            }
            if samples < 2 {
                return Err(CliError::Usage("need at least 2 samples".into()));
            }
            let table: ColourTable = colourmap.parse()?;
            let lut = table.lut();
            let mapper = dataset.tone_mapper()?;
            let (black, white) = (dataset.stats.black, dataset.stats.white);

            println!("{} curve, {} colour table", dataset.curve, table);
            println!("{:>16} | {:>8} | {:>4} | {:>11}", "Value", "Level", "Luma", "RGB");
            println!("{:-<50}", "");
            let step = (white - black) / (samples - 1) as f64;
            for i in 0..samples {
                let value = black + step * i as f64;
                let luma = mapper.luma(value);
                let [r, g, b] = lut.rgb(luma);
                println!(
                    "{:>16.6} | {:>8.4} | {:>4} | {:>3} {:>3} {:>3}",
                    value,
                    mapper.flux_to_pixel(value),
                    luma,
                    r,
                    g,
                    b
                );
            }
        }

        Commands::Decode { input } => {
            let bytes = std::fs::read(&input)?;
            let response = Response::decode(&bytes)?;

            println!("File: {} ({} bytes)", input.display(), bytes.len());
            println!("Type: {}", response.message_type());
            println!("Sequence: {}", response.seq_id());
            println!("Timestamp: {} ms", response.timestamp());
            if let Some(elapsed) = response.elapsed_ms() {
                println!("Server time: {} ms", elapsed);
            }
            match &response {
                Response::Spectrum(m) => println!("Spectrum: {} channels", m.spectrum.len()),
                Response::Viewport(m) => println!(
                    "Viewport: {} {}x{}, {} frame(s), {} alpha bytes",
                    m.identifier,
                    m.width,
                    m.height,
                    m.image.len(),
                    m.alpha.len()
                ),
                Response::Image(m) => println!(
                    "Image: {} {}x{}, {} coded bytes, {} alpha bytes",
                    m.identifier,
                    m.width,
                    m.height,
                    m.image.len(),
                    m.alpha.len()
                ),
                Response::FullSpectrumRefresh(m) => println!(
                    "Spectra: {} mean, {} integrated",
                    m.mean_spectrum.len(),
                    m.integrated_spectrum.len()
                ),
                Response::HistogramRefresh(m) => {
                    println!("Histogram: {} bins over {} - {}", m.hist.len(), m.pmin, m.pmax);
                    println!(
                        "Black / median / white: {} / {} / {}",
                        m.black, m.median, m.white
                    );
                }
                Response::Video(m) => println!("Video frame: {} coded bytes", m.frame.len()),
                Response::Csv(m) => println!("CSV: {} lines", m.csv.lines().count()),
            }
        }

        Commands::Request { input } => {
            let text = std::fs::read_to_string(&input)?;
            let mut parsed = 0usize;
            let mut rejected = 0usize;
            for (number, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Request>() {
                    Ok(request) => {
                        parsed += 1;
                        println!("{}", request);
                    }
                    Err(e) => {
                        rejected += 1;
                        log::warn!("line {}: {}", number + 1, e);
                    }
                }
            }
            eprintln!("{} request(s) parsed, {} rejected", parsed, rejected);
        }

        Commands::CheckConfig { config } => {
            let config = ViewerConfig::from_file(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
