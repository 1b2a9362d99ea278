//! ManRad - Manga page narration pipeline
//!
//! Turns a folder of comic pages into a narrated vertical scroll video:
//! text bubbles are detected and ordered, read by a vision model, voiced
//! by a speech service, and the pages scroll in step with the narration.

mod config;
mod error;
mod layout;
mod media;
mod pipeline;
mod scroll;
mod services;
mod storage;
mod vision;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{AppConfig, CONFIG_FILENAME};
use crate::pipeline::Pipeline;

/// ManRad - narrated scroll videos from comic pages
#[derive(Parser, Debug)]
#[command(name = "manrad")]
#[command(about = "Narrated scroll videos from comic pages")]
struct Args {
    /// Configuration file (default: ./manrad.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory holding the pipeline folders
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Scale source pages to the render width
    Resize,
    /// Detect, group and crop text bubbles, then merge the gap maps
    Detect,
    /// Merge per-page gap maps
    Merge,
    /// Read bubble text with the vision model
    Texts,
    /// Synthesize narration clips
    Speech,
    /// Fit clips to the minimum duration and merge durations
    Durations,
    /// Concatenate clips into the soundtrack
    Audio,
    /// Render the scroll video and mux the soundtrack
    Scroll,
    /// Every stage in order
    Run,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::Config { action } = &args.command {
        return run_config(action, args.config.as_deref(), &args.workdir);
    }

    let config = config::load_or_default(args.config.as_deref(), &args.workdir)?;
    let pipeline = Pipeline::new(config, &args.workdir)?;
    info!("ManRad working in {:?}", pipeline.dirs().root);

    match args.command {
        Command::Config { .. } => {}
        Command::Resize => {
            pipeline.resize()?;
        }
        Command::Detect => {
            pipeline.detect()?;
        }
        Command::Merge => {
            let total = pipeline.merge()?;
            info!("Total scroll height {}", total);
        }
        Command::Texts => {
            pipeline.texts()?;
        }
        Command::Speech => {
            pipeline.speech()?;
        }
        Command::Durations => {
            pipeline.durations()?;
        }
        Command::Audio => {
            pipeline.audio()?;
        }
        Command::Scroll => {
            pipeline.scroll()?;
        }
        Command::Run => pipeline.run_all()?,
    }

    info!("ManRad done");
    Ok(())
}

fn run_config(action: &ConfigAction, explicit: Option<&Path>, workdir: &Path) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| workdir.join(CONFIG_FILENAME));
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to replace it)", path);
            }
            config::save_config(&AppConfig::default(), &path)?;
            info!("Wrote default configuration to {:?}", path);
        }
        ConfigAction::Show => {
            let config = config::load_or_default(explicit, workdir)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
