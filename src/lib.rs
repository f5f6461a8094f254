//! Skywarden - bird-of-prey detection and species classification.
//!
//! A YOLOv8 segmentation model finds birds in a frame. Confident instances are
//! cropped, optionally masked to their outline, and handed to a species
//! classifier whose labels are resolved to readable names.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod inference;
pub mod labels;
pub mod output;
pub mod pipeline;
pub mod species;
pub mod vision;

use clap::{CommandFactory, Parser};
use cli::{Cli, Command, ConfigAction, DetectArgs};
use config::{
    Config, LabelsConfig, SpeciesBackendKind, config_file_path, load_config_file,
    load_default_config, save_config, save_default_config, validate_config,
};
use detector::SegmentationDetector;
use labels::{LabelResolver, LabelSources};
use output::{FrameRecord, progress, write_record};
use pipeline::{collect_input_images, load_frame};
use species::ClassifierRegistry;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

pub use error::{Error, Result};

/// Main entry point for the skywarden CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.detect.verbose, cli.detect.quiet);

    let config_path = cli.detect.config.clone();
    let config = match &config_path {
        Some(path) => load_config_file(path)?,
        None => load_default_config()?,
    };
    let config = apply_overrides(config, &cli.detect);

    if let Some(command) = cli.command {
        return handle_command(command, &config, config_path.as_deref());
    }

    if cli.inputs.is_empty() {
        Cli::command().print_help()?;
        return Ok(());
    }

    validate_config(&config)?;

    detect_images(&cli.inputs, &cli.detect, &config)
}

/// Fold command-line overrides into the loaded configuration.
fn apply_overrides(mut config: Config, args: &DetectArgs) -> Config {
    if let Some(path) = &args.model_path {
        config.detector.model_path.clone_from(path);
    }
    if let Some(confidence) = args.confidence {
        config.detector.confidence_threshold = confidence;
    }
    if let Some(nms) = args.nms {
        config.detector.nms_threshold = nms;
    }
    if let Some(device) = args.device {
        config.inference.device = device;
    }
    if let Some(verbosity) = args.verbosity {
        config.detector.verbosity = verbosity;
    }
    config
}

/// Run detection over every image found under `inputs`.
///
/// Each frame is written to stdout as one JSON line. A frame that fails to
/// decode is logged and skipped; the run continues with the next image.
fn detect_images(inputs: &[PathBuf], args: &DetectArgs, config: &Config) -> Result<()> {
    let total_start = Instant::now();

    let files = collect_input_images(inputs)?;
    if files.is_empty() {
        return Err(Error::NoInputImages);
    }
    info!("Found {} image(s) to process", files.len());

    if config
        .species
        .as_ref()
        .is_some_and(|species| species.backend == SpeciesBackendKind::External)
    {
        warn!("External species classifiers must be registered by the embedding application");
    }

    let mut detector = SegmentationDetector::load(config, &ClassifierRegistry::new())?;
    info!(
        "Detector ready on {} (species stage: {})",
        detector.device(),
        if detector.has_species_backend() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let pb = progress::create_image_progress(files.len(), !args.quiet && !args.no_progress);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut frames_done = 0usize;
    let mut detections_total = 0usize;
    let mut errors = 0usize;

    for path in &files {
        progress::set_progress_message(pb.as_ref(), &file_label(path));

        match load_frame(path) {
            Ok(frame) => {
                let analysis = detector.analyze(&frame);
                detections_total += analysis.detections.len();
                write_record(&mut out, &FrameRecord::new(path, &analysis, args.candidates))?;
                frames_done += 1;
            }
            Err(e) => {
                error!("{e}");
                errors += 1;
            }
        }

        progress::inc_progress(pb.as_ref());
    }

    out.flush()?;
    progress::finish_progress(pb, "Done");

    info!(
        "Processed {} image(s), {} detection(s), {} error(s) in {:.2}s",
        frames_done,
        detections_total,
        errors,
        total_start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT is silenced by default; its CUDA fallback chatter is expected on CPU hosts.
    let filter_str = if quiet {
        "warn,ort=off"
    } else {
        match verbose {
            0 => "info,ort=off",
            1 => "debug,ort=warn",
            2 => "trace,ort=info",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    // stdout carries the JSON records.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_command(command: Command, config: &Config, config_path: Option<&Path>) -> Result<()> {
    match command {
        Command::Devices => {
            handle_devices_command(config);
            Ok(())
        }
        Command::Labels {
            raw,
            id_map,
            metadata,
            namespace,
        } => {
            handle_labels_command(&raw, id_map, metadata, namespace, config);
            Ok(())
        }
        Command::Config { action } => handle_config_command(action, config_path),
    }
}

fn handle_devices_command(config: &Config) {
    use inference::{PlatformProbe, cuda_detection, select_device_with};

    let probe = PlatformProbe::detect();

    println!("Accelerator probe:");
    println!();
    match &probe.embedded_board {
        Some(board) => println!("  Embedded board:    {board}"),
        None => println!("  Embedded board:    none"),
    }
    println!(
        "  CUDA runtime:      {}",
        if cuda_detection::is_cuda_available() {
            "found"
        } else {
            "not found"
        }
    );
    println!("  Discrete devices:  {}", probe.discrete_accelerators);
    println!();

    let requested = config.inference.device;
    let device = select_device_with(Some(requested), &probe);
    println!(
        "Requested '{}' -> using {}",
        String::from(requested),
        device
    );
}

fn handle_labels_command(
    raw: &[String],
    id_map: Option<PathBuf>,
    metadata: Vec<PathBuf>,
    namespace: Option<String>,
    config: &Config,
) {
    let mut labels: LabelsConfig = config.labels.clone();
    if id_map.is_some() {
        labels.id_map = id_map;
    }
    if !metadata.is_empty() {
        labels.metadata = metadata;
    }
    if let Some(namespace) = namespace {
        labels.namespace = namespace;
    }

    let base_dir = config.species.as_ref().and_then(|species| species.model_dir());

    let resolver = LabelResolver::build(&LabelSources::discover(base_dir, &labels));
    for label in raw {
        println!("{label} -> {}", resolver.format(label));
    }
}

fn handle_config_command(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };

    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let config = Config::default();
                let saved_path = match config_path {
                    Some(path) => {
                        save_config(&config, path)?;
                        path.to_path_buf()
                    }
                    None => save_default_config(&config)?,
                };
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!("  Set [detector] model_path and, optionally, a [species] section.");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config_file(&path)?;
            let text = toml::to_string_pretty(&config)
                .map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{text}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
