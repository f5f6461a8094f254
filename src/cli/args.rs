//! CLI argument definitions.

use super::validators::{parse_confidence, parse_device};
use crate::config::Verbosity;
use crate::inference::DeviceHint;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Bird-of-prey detection and species classification on still images.
#[derive(Debug, Parser)]
#[command(name = "skywarden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Image files or directories to analyze.
    pub inputs: Vec<PathBuf>,

    /// Common options for detection.
    #[command(flatten)]
    pub detect: DetectArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show accelerator probing results and the device that would be used.
    Devices,
    /// Resolve raw classifier labels to display names.
    Labels {
        /// Raw labels as emitted by a species classifier.
        #[arg(required = true)]
        raw: Vec<String>,
        /// ID→name table (overrides config).
        #[arg(long)]
        id_map: Option<PathBuf>,
        /// Dataset metadata file with class names (repeatable).
        #[arg(long)]
        metadata: Vec<PathBuf>,
        /// Placeholder namespace for unmapped ids.
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Arguments shared by detection runs and subcommands.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Configuration file (default: platform config path).
    #[arg(long, global = true, env = "SKYWARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the segmentation ONNX model (overrides config).
    #[arg(short, long, env = "SKYWARDEN_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "SKYWARDEN_CONFIDENCE")]
    pub confidence: Option<f32>,

    /// Non-maximum suppression IoU threshold (0.0-1.0).
    #[arg(long, value_parser = parse_confidence)]
    pub nms: Option<f32>,

    /// Inference device: auto, cpu, cuda, cuda:N.
    #[arg(short, long, value_parser = parse_device, env = "SKYWARDEN_DEVICE")]
    pub device: Option<DeviceHint>,

    /// Per-frame log detail: minimal, standard, detailed.
    #[arg(long)]
    pub verbosity: Option<Verbosity>,

    /// Include ranked species candidates in the output.
    #[arg(long)]
    pub candidates: bool,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: full trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
