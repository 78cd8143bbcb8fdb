//! Stage 1: download.
//!
//! Chooses a downloader by catalog format, snapshots the work directory,
//! invokes the tool, interprets its exit code and stdout for the
//! no-new-data and deprecated-URL signals, runs any catalog-supplied
//! source-comment commands, and validates that the download actually
//! changed something. ArcGIS extracts additionally must yield a non-empty
//! GeoJSON, because a dead service "succeeds" with zero features and would
//! otherwise flow silently through the rest of the pipeline.

use std::path::Path;

use gis_pipeline_catalog_models::{CatalogRow, FormatKind, comments};
use gis_pipeline_journal::{Journal, Stage, StageStatus};
use gis_pipeline_metadata::files;
use gis_pipeline_runner::{DownloadOutcome, Execute, classify_download, excerpt};

use crate::{EntityContext, PipelineError, record_stage};

/// Journal message for an NND reported by the download tool.
pub const NND_DOWNLOAD_MESSAGE: &str = "Download command: no new data";

/// Skip reason for an NND reported by the download tool.
pub const SKIP_NO_NEW_DATA: &str = "No new data available from server";

/// Minimum plausible size for a GeoJSON with content.
const MIN_GEOJSON_BYTES: u64 = 100;

/// Runs the download stage. Returns the basename of the newest zip in the
/// work directory (for the catalog's raw-archive column), if any.
///
/// # Errors
///
/// Returns [`PipelineError::Skip`] on a no-new-data signal and
/// [`PipelineError::Download`] on failure.
pub async fn run(
    ctx: &EntityContext<'_>,
    row: &CatalogRow,
    journal: Option<&Journal>,
) -> Result<Option<String>, PipelineError> {
    if !ctx.config.run_download {
        ctx.log.debug("Skipping download (disabled in config)");
        return Ok(None);
    }

    let kind = row.format_kind();
    let is_ags = kind == FormatKind::ArcGisService;

    let argv = if is_ags {
        let table_name = row
            .table_name
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ctx.download_error("Missing table_name for AGS download"))?;
        ctx.log.info(&format!(
            "Running AGS download (table: {table_name})"
        ));
        vec![
            "python3".to_string(),
            ctx.config
                .tool_path("download_tools/ags_extract_data2.py")
                .display()
                .to_string(),
            table_name.to_string(),
            "delete".to_string(),
            "15".to_string(),
        ]
    } else {
        let url = row
            .download_url()
            .ok_or_else(|| ctx.download_error("Missing resource/url for file download"))?;
        ctx.log.info(&format!(
            "Running file download (format: {}, url: {url})",
            row.format_token()
        ));
        vec![
            "python3".to_string(),
            ctx.config
                .tool_path("download_tools/download_data.py")
                .display()
                .to_string(),
            url.to_string(),
        ]
    };

    let before = files::directory_state(&ctx.work_dir);

    let output = ctx
        .runner
        .execute(&argv, &ctx.work_dir)
        .await
        .map_err(|e| {
            record_stage(
                journal,
                ctx.entity,
                Stage::Download,
                StageStatus::Failed,
                Some(&e.to_string()),
                None,
            );
            ctx.download_error(e.to_string())
        })?;

    match classify_download(&output, !is_ags) {
        DownloadOutcome::Success => {}
        DownloadOutcome::NoNewData { reason } => {
            if ctx.config.process_anyway {
                ctx.log.warn(&format!(
                    "{reason} - no new data available, continuing due to process-anyway"
                ));
            } else {
                ctx.log
                    .info(&format!("{reason} - no new data available - skipping entity"));
                record_stage(
                    journal,
                    ctx.entity,
                    Stage::Download,
                    StageStatus::NoNewData,
                    Some(NND_DOWNLOAD_MESSAGE),
                    None,
                );
                return Err(ctx.skip(SKIP_NO_NEW_DATA));
            }
        }
        DownloadOutcome::Deprecated { reason } => {
            ctx.log.error(&format!(
                "Deprecated/inaccessible URL detected: {reason}"
            ));
            record_stage(
                journal,
                ctx.entity,
                Stage::Download,
                StageStatus::Failed,
                Some(&reason),
                None,
            );
            return Err(ctx.download_error(reason));
        }
        DownloadOutcome::Failed { reason } => {
            let message = format!("Download {reason}: {}", excerpt(&output.combined()));
            ctx.log.error(&message);
            record_stage(
                journal,
                ctx.entity,
                Stage::Download,
                StageStatus::Failed,
                Some(&message),
                None,
            );
            return Err(ctx.download_error(message));
        }
    }

    run_source_comments(ctx, row).await;

    if ctx.runner.is_simulated() {
        ctx.log.info("[TEST MODE] Skipping download validation");
        record_stage(
            journal,
            ctx.entity,
            Stage::Download,
            StageStatus::Success,
            None,
            None,
        );
        return Ok(None);
    }

    if let Err(message) = validate_changes(ctx, &before) {
        record_stage(
            journal,
            ctx.entity,
            Stage::Download,
            StageStatus::Failed,
            Some(&message),
            None,
        );
        return Err(ctx.download_error(message));
    }

    if is_ags {
        // table_name was validated above.
        let table_name = row.table_name.as_deref().unwrap_or_default();
        if let Err(message) = validate_geojson(&ctx.work_dir, table_name) {
            record_stage(
                journal,
                ctx.entity,
                Stage::Download,
                StageStatus::Failed,
                Some(&message),
                None,
            );
            return Err(ctx.download_error(message));
        }
    }

    ctx.log.debug("Download validation passed");
    record_stage(
        journal,
        ctx.entity,
        Stage::Download,
        StageStatus::Success,
        None,
        None,
    );

    let zip = files::find_newest_zip(&ctx.work_dir);
    if let Some(zip) = &zip {
        ctx.log.debug(&format!("Detected newest zip file: {zip}"));
    }
    Ok(zip)
}

/// Runs `source_comments` commands in the work directory. These are
/// best-effort pre-metadata cleanup; failures warn and continue.
async fn run_source_comments(ctx: &EntityContext<'_>, row: &CatalogRow) {
    let commands = comments::parse_source_comments(row.source_comments.as_deref());
    let total = commands.len();

    for (i, command) in commands.iter().enumerate() {
        ctx.log.debug(&format!(
            "Running source comment command {}/{total}: {command}",
            i + 1
        ));

        let argv = shell_argv(command);
        match ctx.runner.execute(&argv, &ctx.work_dir).await {
            Ok(output) if output.success() => {}
            Ok(output) => ctx.log.warn(&format!(
                "Source comment command failed: {command}: {}",
                excerpt(&output.stderr)
            )),
            Err(e) => ctx
                .log
                .warn(&format!("Failed to execute source comment command '{command}': {e}")),
        }
    }
}

/// Maps a free-form catalog command to an argv: Python scripts run under
/// `python3`, everything else goes through the shell.
#[must_use]
pub fn shell_argv(command: &str) -> Vec<String> {
    if command.trim_end().ends_with(".py") {
        vec!["python3".to_string(), command.trim().to_string()]
    } else {
        vec![
            "bash".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]
    }
}

/// Confirms the downloader changed at least one file (unless the operator
/// asked to process anyway).
fn validate_changes(
    ctx: &EntityContext<'_>,
    before: &std::collections::BTreeMap<String, std::time::SystemTime>,
) -> Result<(), String> {
    let after = files::directory_state(&ctx.work_dir);
    let changed = files::changed_files(before, &after);

    if changed.is_empty() {
        if ctx.config.process_anyway {
            ctx.log
                .warn("No files changed during download, continuing due to process-anyway");
            return Ok(());
        }
        return Err("No files changed during download".to_string());
    }

    let mut shown = changed.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if changed.len() > 3 {
        shown.push_str(&format!(" and {} more", changed.len() - 3));
    }
    ctx.log
        .debug(&format!("Download validation passed - changed files: {shown}"));
    Ok(())
}

/// Validates an AGS extract: `<table_name>.geojson` must exist, parse, be
/// a `FeatureCollection`, and contain at least one feature.
fn validate_geojson(work_dir: &Path, table_name: &str) -> Result<(), String> {
    let path = work_dir.join(format!("{table_name}.geojson"));

    if !path.is_file() {
        return Err(format!(
            "Expected GeoJSON file not found: {table_name}.geojson"
        ));
    }

    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if size < MIN_GEOJSON_BYTES {
        return Err(format!(
            "GeoJSON file appears empty or corrupted (size: {size} bytes)"
        ));
    }

    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("Could not read GeoJSON file: {e}"))?;
    let data: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| format!("GeoJSON file is corrupted (JSON decode error): {e}"))?;

    if data.get("type").and_then(serde_json::Value::as_str) != Some("FeatureCollection") {
        return Err("GeoJSON file has invalid structure (not a FeatureCollection)".to_string());
    }

    let Some(features) = data.get("features").and_then(serde_json::Value::as_array) else {
        return Err("GeoJSON file has invalid features array".to_string());
    };

    if features.is_empty() {
        return Err(
            "GeoJSON file contains no features (likely deprecated or inaccessible URL)".to_string(),
        );
    }

    Ok(())
}
