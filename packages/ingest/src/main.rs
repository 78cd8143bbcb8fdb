#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for the four-stage GIS layer ingestion pipeline.
//!
//! `gis_pipeline_ingest <layer> [entities...]` processes the given layer
//! for specific entities (literals or glob patterns) or, with no entities,
//! for everything the catalog knows about.

use std::path::Path;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use gis_pipeline_ingest::{DatabaseCatalog, PipelineConfig, process_layer, queue};
use gis_pipeline_journal::{Journal, format_runtime};
use gis_pipeline_naming::LAYERS;
use gis_pipeline_runner::CommandRunner;

#[derive(Parser)]
#[command(
    name = "gis_pipeline_ingest",
    about = "Four-stage geospatial data processing pipeline"
)]
struct Cli {
    /// The layer to process (e.g. "zoning", "flu")
    layer: String,

    /// Optional entity IDs or glob patterns. If omitted, all entities for
    /// the layer will be processed.
    entities: Vec<String>,

    /// Run in test mode, skipping actual subprocess execution
    #[arg(long)]
    test_mode: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Show all logs in the console instead of per-entity log files
    #[arg(long)]
    no_log_isolation: bool,

    /// Skip the download phase
    #[arg(long)]
    no_download: bool,

    /// Skip the metadata extraction phase
    #[arg(long)]
    no_metadata: bool,

    /// Skip the processing phase
    #[arg(long)]
    no_processing: bool,

    /// Skip the upload phase
    #[arg(long)]
    no_upload: bool,

    /// Skip status journal generation
    #[arg(long)]
    no_summary: bool,

    /// Continue processing even when the source reports no new data
    #[arg(long)]
    process_anyway: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();

    let config = PipelineConfig {
        test_mode: cli.test_mode,
        debug: cli.debug,
        isolate_logs: !cli.no_log_isolation,
        run_download: !cli.no_download,
        run_metadata: !cli.no_metadata,
        run_processing: !cli.no_processing,
        run_upload: !cli.no_upload,
        generate_summary: !cli.no_summary,
        process_anyway: cli.process_anyway,
    };

    log::info!(
        "Script started at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if config.test_mode {
        log::warn!("--- RUNNING IN TEST MODE ---");
    }

    let started = Instant::now();
    let result = run(&cli, &config).await;
    log::info!(
        "Script finished at {}. Total runtime: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        format_runtime(started.elapsed().as_secs())
    );

    if let Err(e) = result {
        log::error!("A critical error occurred: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !LAYERS.contains(&cli.layer.as_str()) {
        return Err(format!(
            "unknown layer '{}' (expected one of: {})",
            cli.layer,
            LAYERS.join(", ")
        )
        .into());
    }

    let db = gis_pipeline_catalog::db::connect_from_env().await?;

    let queue = queue::set_queue(db.as_ref(), &cli.layer, &cli.entities).await?;
    if queue.is_empty() {
        log::info!("No entities to process.");
        return Ok(());
    }

    let journal = config
        .generate_summary
        .then(|| Journal::new(Path::new("."), &cli.layer));
    if let Some(journal) = &journal {
        journal.initialize(&queue)?;
    }

    let catalog = DatabaseCatalog::new(db.as_ref());
    let runner = CommandRunner::new(config.test_mode);
    let results = process_layer(
        &catalog,
        &runner,
        config,
        &cli.layer,
        &queue,
        journal.as_ref(),
    )
    .await;

    if let Some(journal) = &journal
        && !results.is_empty()
        && let Err(e) = journal.finalize(&results)
    {
        log::error!("Could not write summary file: {e}");
    }

    Ok(())
}
