//! Stage 3: processing.
//!
//! Runs catalog-supplied pre-processing commands and then the
//! layer-specific update script that loads the downloaded data into
//! PostGIS. Document formats skip this stage entirely, as do layers
//! without an update script.

use gis_pipeline_catalog_models::{CatalogRow, comments};
use gis_pipeline_journal::{Journal, Stage, StageStatus};
use gis_pipeline_runner::{Execute, excerpt};

use crate::{EntityContext, PipelineError, record_stage};

/// Commands that consume artifacts the download stage produces; skipped
/// when download is disabled because their inputs may not exist.
const DOWNLOAD_DEPENDENT_COMMANDS: &[&str] =
    &["unzip", "mv", "zip", "zip_rename_date.sh", "ogr2ogr"];

/// Runs the processing stage.
///
/// # Errors
///
/// Returns [`PipelineError::Processing`] if a pre-processing command or
/// the update script exits nonzero.
pub async fn run(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    journal: Option<&Journal>,
) -> Result<(), PipelineError> {
    if !ctx.config.run_processing {
        let reason = "Processing disabled in config";
        ctx.log.debug(reason);
        record_stage(
            journal,
            ctx.entity,
            Stage::Processing,
            StageStatus::Skipped,
            Some(reason),
            None,
        );
        return Ok(());
    }

    if !row.format_kind().runs_processing() {
        let reason = format!("Format '{}' skips processing stage", row.format_token());
        ctx.log.info(&reason);
        record_stage(
            journal,
            ctx.entity,
            Stage::Processing,
            StageStatus::Skipped,
            Some(&reason),
            None,
        );
        return Ok(());
    }

    run_pre_processing(ctx, row, journal).await?;

    // Layer-specific update script; zoning has a newer generation that
    // takes precedence when present.
    let script = if ctx.layer == "zoning"
        && ctx
            .config
            .tool_path("processing_tools/update_zoning2.py")
            .is_file()
    {
        ctx.config.tool_path("processing_tools/update_zoning2.py")
    } else {
        ctx.config
            .tool_path(&format!("processing_tools/update_{}.py", ctx.layer))
    };

    if !ctx.runner.is_simulated() && !script.is_file() {
        let reason = format!("No update script found for layer '{}'", ctx.layer);
        ctx.log.info(&reason);
        record_stage(
            journal,
            ctx.entity,
            Stage::Processing,
            StageStatus::Skipped,
            Some(&reason),
            None,
        );
        return Ok(());
    }

    let script_name = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    ctx.log.info(&format!("Running update script: {script_name}"));

    let argv = vec![
        "python3".to_string(),
        script.display().to_string(),
        ctx.county.clone(),
        ctx.city.clone(),
    ];

    let failure = match ctx.runner.execute(&argv, &ctx.work_dir).await {
        Ok(output) if output.success() => None,
        Ok(output) => Some(format!(
            "Update script {script_name} failed with exit code {}: {}",
            output.exit_code,
            excerpt(&output.combined())
        )),
        Err(e) => Some(format!("Update script {script_name} failed: {e}")),
    };

    if let Some(message) = failure {
        record_stage(
            journal,
            ctx.entity,
            Stage::Processing,
            StageStatus::Failed,
            Some(&message),
            None,
        );
        return Err(ctx.processing_error(message));
    }

    record_stage(
        journal,
        ctx.entity,
        Stage::Processing,
        StageStatus::Success,
        None,
        None,
    );
    Ok(())
}

/// Runs the catalog's `processing_comments` commands in order. Each
/// command string is whitespace-split into an argv.
async fn run_pre_processing(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    journal: Option<&Journal>,
) -> Result<(), PipelineError> {
    let commands = comments::parse_processing_comments(row.processing_comments.as_deref());
    if commands.is_empty() {
        return Ok(());
    }

    ctx.log.debug(&format!(
        "Running {} pre-processing commands",
        commands.len()
    ));

    for command in &commands {
        let argv: Vec<String> = command.split_whitespace().map(ToString::to_string).collect();
        let Some(program) = argv.first() else {
            continue;
        };

        if !ctx.config.run_download && depends_on_download(program) {
            ctx.log.debug(&format!(
                "Skipping download-dependent command (download disabled): {command}"
            ));
            continue;
        }

        let failure = match ctx.runner.execute(&argv, &ctx.work_dir).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(format!(
                "Processing command failed with exit code {}: {command}: {}",
                output.exit_code,
                excerpt(&output.combined())
            )),
            Err(e) => Some(format!("Processing command failed: {command}: {e}")),
        };

        if let Some(message) = failure {
            record_stage(
                journal,
                ctx.entity,
                Stage::Processing,
                StageStatus::Failed,
                Some(&message),
                None,
            );
            return Err(ctx.processing_error(message));
        }
    }

    Ok(())
}

/// Whether a command's program consumes download-stage artifacts.
fn depends_on_download(program: &str) -> bool {
    let basename = std::path::Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    DOWNLOAD_DEPENDENT_COMMANDS.contains(&basename.as_str())
}
