#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Four-stage ingestion pipeline for Florida county/city GIS layers.
//!
//! For each queued entity the coordinator runs Download -> Metadata ->
//! Processing -> Upload, sequentially and in order: entities share work
//! directories, the journal is a single CSV, and every stage's side
//! effects must be visible to the next. A no-new-data signal short-circuits
//! the entity but still refreshes the catalog's publish date, which is how
//! "we checked today and nothing changed" stays distinguishable from "we
//! never looked".
//!
//! The coordinator reaches the outside world through two seams: catalog
//! reads go through [`CatalogSource`] and subprocesses through
//! [`Execute`], so the end-to-end scenarios below run against fixtures.

pub mod download;
pub mod entity_log;
pub mod processing;
pub mod queue;
pub mod upload;
pub mod workdir;

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use gis_pipeline_catalog::CatalogError;
use gis_pipeline_catalog_models::{CatalogRow, FormatKind};
use gis_pipeline_journal::{EntityResult, EntityStatus, Journal, Stage, StageStatus};
use gis_pipeline_metadata::MetadataRecord;
use gis_pipeline_runner::Execute;
use switchy_database::Database;

use crate::entity_log::EntityLog;

/// Journal message for an NND detected by the metadata-equality check.
pub const NND_METADATA_MESSAGE: &str = "Metadata check: data date unchanged";

/// Skip reason for an NND detected by the metadata-equality check.
pub const SKIP_DATE_UNCHANGED: &str = "No new data available (data date unchanged)";

/// Read access to the data catalog; the seam between the coordinator and
/// the database so rehearsals and tests can run against fixtures.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the catalog row for (layer, county, city), all in internal
    /// form. `Ok(None)` means no row exists.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the lookup fails.
    async fn fetch_row(
        &self,
        layer: &str,
        county: &str,
        city: &str,
    ) -> Result<Option<CatalogRow>, CatalogError>;
}

/// Production catalog source backed by the SQL catalog table.
pub struct DatabaseCatalog<'a> {
    db: &'a dyn Database,
}

impl<'a> DatabaseCatalog<'a> {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogSource for DatabaseCatalog<'_> {
    async fn fetch_row(
        &self,
        layer: &str,
        county: &str,
        city: &str,
    ) -> Result<Option<CatalogRow>, CatalogError> {
        gis_pipeline_catalog::gateway::fetch_row(self.db, layer, county, city).await
    }
}

/// Operator-facing pipeline configuration, threaded explicitly through the
/// coordinator and stages.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// Suppress all subprocess execution; commands log and succeed.
    pub test_mode: bool,
    /// Verbose console logging.
    pub debug: bool,
    /// Write per-entity log files instead of flooding the console.
    pub isolate_logs: bool,
    /// Run the download stage.
    pub run_download: bool,
    /// Run the metadata stage.
    pub run_metadata: bool,
    /// Run the processing stage.
    pub run_processing: bool,
    /// Run the catalog update stage.
    pub run_upload: bool,
    /// Maintain the status journal.
    pub generate_summary: bool,
    /// Keep going when the source reports no new data.
    pub process_anyway: bool,
    /// Root of the per-layer data trees.
    pub data_root: PathBuf,
    /// Directory holding `download_tools/` and `processing_tools/`.
    pub tools_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            debug: false,
            isolate_logs: true,
            run_download: true,
            run_metadata: true,
            run_processing: true,
            run_upload: true,
            generate_summary: true,
            process_anyway: false,
            data_root: PathBuf::from(workdir::DEFAULT_DATA_ROOT),
            tools_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl PipelineConfig {
    /// Absolute path of a tool shipped alongside the pipeline. Subprocesses
    /// run with the entity work directory as cwd, so relative tool paths
    /// would not survive.
    #[must_use]
    pub fn tool_path(&self, relative: &str) -> PathBuf {
        self.tools_root.join(relative)
    }
}

/// Errors crossing stage boundaries. All variants carry the layer and
/// entity for context; `Skip` is control flow (no new data), not failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The download stage failed.
    #[error("[{layer}/{entity}] Download failed: {message}")]
    Download {
        /// Layer being processed.
        layer: String,
        /// Entity being processed.
        entity: String,
        /// What went wrong.
        message: String,
    },

    /// The processing stage failed.
    #[error("[{layer}/{entity}] Processing failed: {message}")]
    Processing {
        /// Layer being processed.
        layer: String,
        /// Entity being processed.
        entity: String,
        /// What went wrong.
        message: String,
    },

    /// The catalog update stage failed.
    #[error("[{layer}/{entity}] Upload failed: {message}")]
    Upload {
        /// Layer being processed.
        layer: String,
        /// Entity being processed.
        entity: String,
        /// What went wrong.
        message: String,
    },

    /// The entity should be skipped; not a failure.
    #[error("[{layer}/{entity}] {reason}")]
    Skip {
        /// Layer being processed.
        layer: String,
        /// Entity being processed.
        entity: String,
        /// Why the entity is being skipped.
        reason: String,
    },

    /// Invalid configuration (unknown layer, bad entity literal, missing
    /// catalog row). Fatal when raised during queue construction.
    #[error("configuration error: {message}")]
    Config {
        /// What is misconfigured.
        message: String,
    },
}

/// Everything a stage needs to act on one entity.
pub struct EntityContext<'a> {
    /// Pipeline configuration.
    pub config: &'a PipelineConfig,
    /// Subprocess executor honoring test mode.
    pub runner: &'a dyn Execute,
    /// Internal layer identifier.
    pub layer: &'a str,
    /// Internal entity identifier.
    pub entity: &'a str,
    /// Internal county identifier.
    pub county: String,
    /// Internal city identifier (may be empty).
    pub city: String,
    /// Canonical work directory for this entity.
    pub work_dir: PathBuf,
    /// Per-entity log sink.
    pub log: EntityLog,
}

impl EntityContext<'_> {
    /// A download-stage error for this entity.
    #[must_use]
    pub fn download_error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Download {
            layer: self.layer.to_string(),
            entity: self.entity.to_string(),
            message: message.into(),
        }
    }

    /// A processing-stage error for this entity.
    #[must_use]
    pub fn processing_error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Processing {
            layer: self.layer.to_string(),
            entity: self.entity.to_string(),
            message: message.into(),
        }
    }

    /// An upload-stage error for this entity.
    #[must_use]
    pub fn upload_error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Upload {
            layer: self.layer.to_string(),
            entity: self.entity.to_string(),
            message: message.into(),
        }
    }

    /// A skip signal for this entity.
    #[must_use]
    pub fn skip(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::Skip {
            layer: self.layer.to_string(),
            entity: self.entity.to_string(),
            reason: reason.into(),
        }
    }
}

/// Records a stage transition in the journal, if one is active. Journal
/// I/O failures are logged, never fatal to the entity.
pub fn record_stage(
    journal: Option<&Journal>,
    entity: &str,
    stage: Stage,
    status: StageStatus,
    error: Option<&str>,
    data_date: Option<&str>,
) {
    if let Some(journal) = journal
        && let Err(e) = journal.update_stage(entity, stage, status, error, data_date)
    {
        log::error!("Could not update journal for {entity}: {e}");
    }
}

/// Outcome of one entity inside the coordinator.
enum EntityOutcome {
    Success {
        data_date: Option<String>,
        warning: Option<String>,
    },
    Skipped {
        warning: String,
    },
}

/// Runs the four-stage pipeline for every entity in the queue, strictly in
/// order, and returns one result per entity. Failures never abort the run;
/// they are recorded and the queue continues.
pub async fn process_layer(
    catalog: &dyn CatalogSource,
    executor: &dyn Execute,
    config: &PipelineConfig,
    layer: &str,
    queue: &[String],
    journal: Option<&Journal>,
) -> Vec<EntityResult> {
    if config.run_download {
        log::info!(
            "Starting processing for layer '{layer}' with {} entities",
            queue.len()
        );
    } else {
        log::info!("Starting processing for layer '{layer}' (download disabled)");
    }

    let mut results = Vec::with_capacity(queue.len());

    for entity in queue {
        let start = Instant::now();
        let outcome = process_entity(catalog, executor, config, layer, entity, journal).await;
        let runtime_seconds = start.elapsed().as_secs();

        let result = match outcome {
            Ok(EntityOutcome::Success { data_date, warning }) => {
                log::info!("--- Successfully processed entity: {entity} ---");
                EntityResult {
                    entity: entity.clone(),
                    status: EntityStatus::Success,
                    data_date,
                    runtime_seconds,
                    warning,
                    error: None,
                }
            }
            Ok(EntityOutcome::Skipped { warning }) => EntityResult {
                entity: entity.clone(),
                status: EntityStatus::Skipped,
                data_date: None,
                runtime_seconds,
                warning: Some(warning),
                error: None,
            },
            Err(PipelineError::Skip { reason, .. }) => {
                log::info!("Skipping entity {entity} for layer {layer}: {reason}");
                EntityResult {
                    entity: entity.clone(),
                    status: EntityStatus::Skipped,
                    data_date: None,
                    runtime_seconds,
                    warning: Some(reason),
                    error: None,
                }
            }
            Err(e) => {
                log::error!("Failed to process entity {entity} for layer {layer}: {e}");
                EntityResult {
                    entity: entity.clone(),
                    status: EntityStatus::Failure,
                    data_date: None,
                    runtime_seconds,
                    warning: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let successful = results
        .iter()
        .filter(|r| r.status == EntityStatus::Success)
        .count();
    log::info!("{successful}/{} entities processed successfully", results.len());

    results
}

/// Runs all stages for one entity.
async fn process_entity(
    catalog: &dyn CatalogSource,
    executor: &dyn Execute,
    config: &PipelineConfig,
    layer: &str,
    entity: &str,
    journal: Option<&Journal>,
) -> Result<EntityOutcome, PipelineError> {
    let (work_dir, county, city) = workdir::resolve_work_dir(&config.data_root, layer, entity)?;
    let log = EntityLog::create(&work_dir, entity, config.isolate_logs);
    let ctx = EntityContext {
        config,
        runner: executor,
        layer,
        entity,
        county,
        city,
        work_dir,
        log,
    };

    log::info!("--- Processing entity: {entity} ---");

    let row = catalog
        .fetch_row(layer, &ctx.county, &ctx.city)
        .await
        .map_err(|e| PipelineError::Config {
            message: format!("Catalog lookup failed for {layer}/{entity}: {e}"),
        })?
        .ok_or_else(|| PipelineError::Config {
            message: format!("Catalog row not found for {layer}/{entity}"),
        })?;

    let kind = row.format_kind();
    if !kind.is_admitted() {
        let reason = format!("Format '{}' is excluded from pipeline", row.format_token());
        log::info!("Skipping entity {entity}: {reason}");
        return Ok(EntityOutcome::Skipped {
            warning: format!("Format excluded: {reason}"),
        });
    }

    // Stage 1: Download.
    let raw_zip = match download::run(&ctx, &row, journal).await {
        Err(PipelineError::Skip { reason, .. }) => {
            return handle_no_new_data(&ctx, &row, reason).await;
        }
        other => other?,
    };

    // Stage 2: Metadata.
    let metadata = match layer_metadata(&ctx, &row, journal).await {
        Err(PipelineError::Skip { reason, .. }) => {
            record_stage(
                journal,
                entity,
                Stage::Download,
                StageStatus::NoNewData,
                Some(NND_METADATA_MESSAGE),
                None,
            );
            return handle_no_new_data(&ctx, &row, reason).await;
        }
        other => other?,
    };

    // Stage 3: Processing.
    processing::run(&ctx, &row, journal).await?;

    // Stage 4: Upload.
    upload::run(&ctx, &row, &metadata, raw_zip.as_deref(), journal).await?;

    let warning = if metadata.defaulted_today {
        let message = "data_date defaulted to current day";
        ctx.log.warn(message);
        Some(message.to_string())
    } else {
        None
    };

    Ok(EntityOutcome::Success {
        data_date: metadata.data_date_string(),
        warning,
    })
}

/// Handles the NND short-circuit: refresh the catalog publish date
/// best-effort (without touching the journal's stage columns) and convert
/// the skip into a non-failure outcome.
async fn handle_no_new_data(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    reason: String,
) -> Result<EntityOutcome, PipelineError> {
    let empty = MetadataRecord::empty(Local::now().date_naive());
    match upload::run(ctx, row, &empty, None, None).await {
        Ok(()) => log::info!("Updated publish date for {} (no-new-data case)", ctx.entity),
        Err(e) => log::warn!("Failed to update publish date for {}: {e}", ctx.entity),
    }

    Ok(EntityOutcome::Skipped { warning: reason })
}

/// Stage 2: extract provenance metadata from the downloaded artifacts and
/// detect metadata-level NND for geospatial formats.
async fn layer_metadata(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    journal: Option<&Journal>,
) -> Result<MetadataRecord, PipelineError> {
    let today = Local::now().date_naive();

    if !ctx.config.run_metadata {
        ctx.log
            .debug("Skipping metadata extraction (disabled in config)");
        return Ok(MetadataRecord::empty(today));
    }

    if row.format_kind() == FormatKind::DocumentOnly {
        let record = gis_pipeline_metadata::extract_document_metadata(&ctx.work_dir, today);
        ctx.log.debug(&format!(
            "Document metadata extracted: file:{}, date:{}",
            record.shp.as_deref().unwrap_or("unknown"),
            record.data_date_string().as_deref().unwrap_or("unknown"),
        ));
        return Ok(record);
    }

    let record =
        gis_pipeline_metadata::extract_shapefile_metadata(ctx.runner, &ctx.work_dir, today).await;
    ctx.log.debug(&format!(
        "Metadata extracted: EPSG:{}, data_date:{}, fields:{}",
        record.epsg.as_deref().unwrap_or("unknown"),
        record.data_date_string().as_deref().unwrap_or("unknown"),
        record.field_names.as_deref().unwrap_or("[]"),
    ));

    if let Some(journal) = journal
        && let Some(new_date) = record.data_date_string()
        && journal.existing_data_date(ctx.entity).as_deref() == Some(new_date.as_str())
    {
        return Err(ctx.skip(SKIP_DATE_UNCHANGED));
    }

    Ok(record)
}
