//! # Kompressor - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Merge tra file di configurazione e flag CLI (i flag vincono)
//! - Verifica dei compressori necessari prima di avviare il batch
//! - Stampa della tabella o del JSON, errori su stderr
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (WARN, oppure DEBUG con --verbose; `RUST_LOG` vince)
//! 3. Carica la configurazione e applica i flag
//! 4. Espande le directory nelle immagini che contengono
//! 5. Controlla che jpegoptim/pngquant/cwebp necessari siano installati
//! 6. Esegue il batch e stampa il report
//!
//! ## Esempio di utilizzo:
//! ```bash
//! kompressor photos/ -o small -q 60 -d -SMALL -x 1920 1080
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use kompressor::error::CompressError;
use kompressor::file_manager::FileManager;
use kompressor::image_processor::ImageProcessor;
use kompressor::progress::ProgressManager;
use kompressor::report;
use kompressor::transform::ResizeFilter;
use kompressor::{BatchOrchestrator, CompressionEngine, Config, ImageFormat, ImageResult};

#[derive(Parser)]
#[command(name = "kompressor")]
#[command(about = "Compress JPEG, PNG and WebP images with jpegoptim, pngquant and cwebp")]
#[command(version)]
struct Args {
    /// Images, or directories of images, to compress
    #[arg(required_unless_present_any = ["check_tools", "save_config"])]
    sources: Vec<PathBuf>,

    /// Output directory, created if missing [default: kompressor]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compression quality (1-100) [default: 80]
    #[arg(short, long)]
    quality: Option<u8>,

    /// Suffix appended to the names of compressed images
    #[arg(short = 'd', long, allow_hyphen_values = true)]
    destination_suffix: Option<String>,

    /// Suffix appended to the names of the originals, renamed in place
    #[arg(short = 's', long, allow_hyphen_values = true)]
    source_suffix: Option<String>,

    /// Convert to this format before compressing
    #[arg(short, long, value_enum)]
    convert: Option<ImageFormat>,

    /// Shrink to fit within WIDTH x HEIGHT, keeping the aspect ratio
    #[arg(short = 'x', long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    dimensions: Option<Vec<u32>>,

    /// Resampling filter used when resizing
    #[arg(long, value_enum)]
    resize_filter: Option<ResizeFilter>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Number of parallel workers [default: available cores]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Kill an external compressor after SECS seconds
    #[arg(long, value_name = "SECS")]
    tool_timeout: Option<u64>,

    /// Give up on one image after SECS seconds
    #[arg(long, value_name = "SECS")]
    image_timeout: Option<u64>,

    /// Configuration file [default: <config dir>/kompressor/config.json]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the configuration file
    #[arg(long)]
    save_config: bool,

    /// List the external compressors and exit
    #[arg(long)]
    check_tools: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags given on the command line override the configuration file
    fn apply(&self, config: &mut Config) {
        if let Some(ref output) = self.output {
            config.output_dir = output.clone();
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(ref suffix) = self.destination_suffix {
            config.destination_suffix = suffix.clone();
        }
        if let Some(ref suffix) = self.source_suffix {
            config.source_suffix = suffix.clone();
        }
        if self.convert.is_some() {
            config.convert = self.convert;
        }
        if let Some([width, height]) = self.dimensions.as_deref() {
            config.dimensions = (*width, *height);
        }
        if let Some(filter) = self.resize_filter {
            config.resize_filter = filter;
        }
        if self.json {
            config.json_output = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.tool_timeout.is_some() {
            config.tool_timeout_secs = self.tool_timeout;
        }
        if self.image_timeout.is_some() {
            config.image_timeout_secs = self.image_timeout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the report
    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.clone().or_else(Config::default_config_path);
    let mut config = match config_path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    if args.save_config {
        let path = config_path
            .ok_or_else(|| anyhow::anyhow!("No configuration directory on this platform"))?;
        config.save_to_file(&path).await?;
        info!("Configuration saved to {}", path.display());
    }

    let engine = CompressionEngine::from_config(&config);

    if args.check_tools {
        print!("{}", engine.processor().available_tools_report());
        return Ok(ExitCode::SUCCESS);
    }
    if args.sources.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let sources = FileManager::expand_sources(&args.sources);
    if sources.is_empty() {
        warn!("No images found");
        return Ok(ExitCode::SUCCESS);
    }

    // Check dependencies
    let formats = ImageProcessor::required_formats(&sources, config.convert);
    engine.processor().check_dependencies(formats)?;

    let progress = if config.json_output {
        ProgressManager::hidden()
    } else {
        ProgressManager::new(sources.len() as u64)
    };

    let (stop_sender, stop_receiver) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing images already started");
            let _ = stop_sender.send(());
        }
    });

    let report = BatchOrchestrator::new(engine, config.workers)
        .with_per_image_timeout(config.image_timeout())
        .with_cancellation(stop_receiver)
        .with_progress(progress.clone())
        .run(config.requests(&sources))
        .await;
    progress.clear();

    let results: Vec<ImageResult> = report.successes().cloned().collect();
    if config.json_output {
        println!("{}", report::render_json(&results)?);
    } else {
        print!("{}", report::render_table(&results));
        println!("{}", report.stats().format_summary());
    }

    for (source, failure) in report.failures() {
        eprintln!("{}", report::failure_line(source, failure));
        if let CompressError::ToolExecutionFailed { output, .. } = failure {
            if !output.is_empty() {
                debug!("{} output:\n{}", source.display(), output);
            }
        }
    }
    if let Some(ref fatal) = report.fatal {
        error!("Batch aborted: {}", fatal);
        eprintln!("error: {}", fatal);
    }
    for source in &report.not_started {
        eprintln!("{}: not started", source.display());
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
