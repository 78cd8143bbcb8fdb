//! Stage 4: catalog update.
//!
//! Builds the dynamic UPDATE for this entity's catalog row and executes it
//! through `psql`. The publish date is always written; data fields only
//! when the run produced them. The NND path reuses this stage with an
//! empty metadata record so the catalog still shows the source was checked
//! today.

use chrono::Local;
use gis_pipeline_catalog::update::CatalogUpdate;
use gis_pipeline_catalog_models::{CatalogRow, FormatKind};
use gis_pipeline_journal::{Journal, Stage, StageStatus};
use gis_pipeline_metadata::MetadataRecord;
use gis_pipeline_runner::{Execute, excerpt};

use crate::{EntityContext, PipelineError, record_stage};

/// Runs the catalog update stage.
///
/// # Errors
///
/// Returns [`PipelineError::Upload`] if `psql` cannot run or exits
/// nonzero.
pub async fn run(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    metadata: &MetadataRecord,
    raw_zip: Option<&str>,
    journal: Option<&Journal>,
) -> Result<(), PipelineError> {
    if !ctx.config.run_upload {
        ctx.log.debug("Skipping upload (disabled in config)");
        return Ok(());
    }

    let publish_date = Local::now().date_naive();
    let update = build_update(ctx, row, metadata, raw_zip, publish_date);

    ctx.log.debug(&format!("Catalog update SQL: {}", update.sql()));

    let failure = match ctx.runner.execute(&update.psql_argv(), &ctx.work_dir).await {
        Ok(output) if output.success() => None,
        Ok(output) => Some(format!(
            "Upload failed: psql exited {}: {}",
            output.exit_code,
            excerpt(&output.combined())
        )),
        Err(e) => Some(format!("Upload failed: {e}")),
    };

    if let Some(message) = failure {
        record_stage(
            journal,
            ctx.entity,
            Stage::Upload,
            StageStatus::Failed,
            Some(&message),
            None,
        );
        return Err(ctx.upload_error(message));
    }

    // The journal's data date reflects content, never the publish date;
    // an entity without an extractable date keeps its column empty.
    let data_date = metadata.data_date_string();
    record_stage(
        journal,
        ctx.entity,
        Stage::Upload,
        StageStatus::Success,
        None,
        data_date.as_deref(),
    );
    ctx.log.debug("Catalog metadata updated");

    Ok(())
}

/// Assembles the catalog update from the metadata record. The raw-zip
/// column only applies to non-ArcGIS formats (AGS extracts produce
/// GeoJSON, not archives).
fn build_update(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    metadata: &MetadataRecord,
    raw_zip: Option<&str>,
    publish_date: chrono::NaiveDate,
) -> CatalogUpdate {
    let raw_zip = if row.format_kind() == FormatKind::ArcGisService {
        None
    } else {
        raw_zip.map(ToString::to_string)
    };

    CatalogUpdate {
        layer: ctx.layer.to_string(),
        county: ctx.county.clone(),
        city: ctx.city.clone(),
        publish_date,
        data_date: metadata.data_date_string(),
        epsg: metadata.epsg.clone(),
        raw_file: metadata.shp.clone(),
        field_names: metadata.field_names.clone(),
        raw_zip,
    }
}
