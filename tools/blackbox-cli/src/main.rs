//! Blackbox CLI: rolling screen recorder.
//!
//! Usage:
//!   blackbox record [OPTIONS]     Record back-to-back segments until Ctrl+C
//!   blackbox monitors             List capturable monitors
//!   blackbox prune <DIR> --keep N Apply the retention cap to a directory
//!   blackbox check                Check system capabilities
//!   blackbox config [--write]     Show or persist the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use blackbox_common::config::{AppConfig, VideoCodec};

mod commands;

#[derive(Parser)]
#[command(
    name = "blackbox",
    about = "Rolling screen recorder that keeps only the newest segments",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/blackbox/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record fixed-length segments until Ctrl+C
    Record {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Zero-based monitor index (see `blackbox monitors`)
        #[arg(short, long)]
        monitor: Option<usize>,

        /// Target FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Segment length in seconds
        #[arg(short = 'd', long)]
        segment_secs: Option<u64>,

        /// Video codec: xvid|h264|mjpeg
        #[arg(short, long)]
        codec: Option<VideoCodec>,

        /// Number of files to keep in the output directory
        #[arg(short, long)]
        keep: Option<usize>,

        /// Per-frame capture timeout in milliseconds (0 disables)
        #[arg(long)]
        capture_timeout_ms: Option<u64>,

        /// Capture backend
        #[arg(long, default_value = "x11grab")]
        backend: String,

        /// Encoder
        #[arg(long, default_value = "ffmpeg")]
        encoder: String,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List monitors available for recording
    Monitors {
        /// Capture backend
        #[arg(long, default_value = "x11grab")]
        backend: String,
    },

    /// Delete the oldest files in a directory down to a cap
    Prune {
        /// Directory to prune (defaults to the configured output directory)
        dir: Option<PathBuf>,

        /// Number of files to keep
        #[arg(short, long)]
        keep: Option<usize>,

        /// Order by file name instead of modification time
        #[arg(long)]
        by_name: bool,
    },

    /// Check system capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = app.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    blackbox_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            output,
            monitor,
            fps,
            segment_secs,
            codec,
            keep,
            capture_timeout_ms,
            backend,
            encoder,
            json,
        } => {
            let mut recording = app.recording.clone();
            if let Some(output) = output {
                recording.output_dir = output;
            }
            if let Some(monitor) = monitor {
                recording.monitor_index = monitor;
            }
            if let Some(fps) = fps {
                recording.fps = fps;
            }
            if let Some(secs) = segment_secs {
                recording.segment_duration_secs = secs;
            }
            if let Some(codec) = codec {
                recording.codec = codec;
            }
            if let Some(keep) = keep {
                recording.retention_cap = keep;
            }
            if let Some(timeout) = capture_timeout_ms {
                recording.capture_timeout_ms = timeout;
            }
            commands::record::run(recording, &backend, &encoder, json).await
        }
        Commands::Monitors { backend } => commands::monitors::run(&backend),
        Commands::Prune { dir, keep, by_name } => commands::prune::run(
            dir.unwrap_or_else(|| app.recording.output_dir.clone()),
            keep.unwrap_or(app.recording.retention_cap),
            by_name,
        ),
        Commands::Check => commands::check::run(),
        Commands::Config { write } => commands::config::run(&app, cli.config.as_deref(), write),
    }
}
