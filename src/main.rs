#![warn(clippy::all, rust_2018_idioms)]
use std::path::PathBuf;
use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use log4rs::config::Deserializers;
use scroll_ledger::action::{list_frame_paths, remove_dropped_frames, save_outputs};
use scroll_ledger::event::{EventLevel, PipelineEvent, emit_event, get_events};
use scroll_ledger::{Pipeline, PipelineConfig};

/// Stitches scrolled screenshots into one image and reads the transactions on it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Directory with the captured `*.png` frames, oldest first by file name.
    frames_dir: PathBuf,

    #[arg(long, default_value = "output/stitched.png")]
    output: PathBuf,

    #[arg(long, default_value = "output/ocr-latest.json")]
    items: PathBuf,

    /// Writes `ocr_threshold.png` and `ocr_result.png` here.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// JSON pipeline configuration. Missing fields use the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deletes frames the stitcher dropped as duplicates.
    #[arg(long)]
    remove_dropped: bool,

    /// Prints every pipeline event as a `LOG: {json}` line.
    #[arg(long)]
    print_events: bool,

    /// Year for booking dates shown without one. Defaults to the current year.
    #[arg(long)]
    year: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;
    let cli = Cli::parse();

    let result = run(&cli).await;
    if let Err(e) = &result {
        error!("pipeline failed: {e:#}");
        emit_event(PipelineEvent::new(EventLevel::Error, None, format!("{e:#}")));
    }

    if cli.print_events {
        for event in get_events() {
            println!("{}", event.to_log_line());
        }
    }

    result
}

async fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let mut pipeline = Pipeline::new(config);
    if let Some(dir) = &cli.debug_dir {
        pipeline = pipeline.with_debug_dir(dir);
    }
    if let Some(year) = cli.year {
        pipeline = pipeline.with_year(year);
    }

    let paths = list_frame_paths(&cli.frames_dir)?;
    let output = pipeline.run_paths(&paths).await?;

    save_outputs(&output, &cli.output, &cli.items)?;

    if cli.remove_dropped {
        let removed = remove_dropped_frames(&output.dropped)?;
        info!("removed {removed} dropped frames");
    }

    info!(
        "done: {} items, {} warnings",
        output.result.items.len(),
        output.warnings.len()
    );
    Ok(())
}

const LOG_CONFIG_DIR: &str = "config";
const LOG_CONFIG: &str = "config/log4rs.yaml";

fn init_logger() -> Result<()> {
    fs::create_dir_all(LOG_CONFIG_DIR).context("Config directory creation failed")?;
    if !Path::new(&LOG_CONFIG).exists() {
        fs::write(LOG_CONFIG, include_str!("../config/log4rs.yaml"))
            .context("Config file creation failed")?;
    }

    log4rs::init_file(LOG_CONFIG, Deserializers::default()).context("Logger init failed")
}
