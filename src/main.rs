// igal: browse the media files next to a target file, newest first.
// Stills: image crate decode, neighbors prefetched on background threads
// Animations: ffmpeg transcode into .igal_cache, played as video
// Usage: igal [OPTIONS] <FILE> | igal <scan|classify|transcode> ...

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("GIT_HASH");

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use igal::Config;

#[derive(Parser, Debug)]
#[command(
    name = "igal",
    about = "Image gallery: open a file, browse its directory",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Image, animation or video to open
    target: Option<PathBuf>,

    /// Transcoder binary (default: ffmpeg from PATH)
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Seconds before a hung transcode is killed
    #[arg(long, value_name = "SECS", global = true)]
    transcode_timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a directory's media files in browsing order
    Scan { dir: PathBuf },
    /// Print the media kind of each file
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Transcode an animation into the cache and print the playable path
    Transcode { file: PathBuf },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("igal=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("igal=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Cli) -> Config {
    let mut config = Config::load();
    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg = ffmpeg.clone();
    }
    if let Some(secs) = args.transcode_timeout {
        config.transcode_timeout_secs = secs;
    }
    config
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if args.command.is_none() && args.target.is_none() {
        eprintln!("No target argument provided!");
        return ExitCode::from(1);
    }

    init_tracing(args.debug);
    debug!("igal {} ({})", VERSION, GIT_HASH);
    let config = Arc::new(load_config(&args));

    // ── CLI subcommands (non-interactive, exit after) ───────────────────
    let result = match &args.command {
        Some(Commands::Scan { dir }) => cli::scan(&config, dir),
        Some(Commands::Classify { files }) => cli::classify(config, files),
        Some(Commands::Transcode { file }) => cli::transcode(config, file),
        None => match &args.target {
            Some(target) => cli::session(config, target),
            None => Ok(()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("igal: {:#}", e);
            ExitCode::from(cli::exit_status(&e))
        }
    }
}
