#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The per-layer status journal.
//!
//! One CSV per layer (`<layer>_summary.csv`) acts as a living progress
//! document: a row per entity with per-stage statuses, updated after every
//! stage transition, plus a trailing `LAST UPDATED:` summary row. Rows for
//! entities outside the current queue are preserved verbatim across runs,
//! so the file accumulates the full history of the layer.
//!
//! Every mutation rewrites the whole file through a temp-file-and-rename,
//! so an interrupt can never leave a torn CSV on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use gis_pipeline_naming::split_entity;
use serde::{Deserialize, Serialize};

/// Errors that can occur while reading or writing the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// CSV encoding/decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entity identifier could not be split into county/city.
    #[error("Naming error: {0}")]
    Naming(#[from] gis_pipeline_naming::NamingError),
}

/// The pipeline stages tracked by the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching data from the source.
    Download,
    /// Pre-processing commands plus the layer update script.
    Processing,
    /// The catalog UPDATE.
    Upload,
}

/// Status values a stage column can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage completed.
    Success,
    /// The stage ran and failed.
    Failed,
    /// The stage was intentionally not run.
    Skipped,
    /// No new data was available (download column only).
    NoNewData,
}

impl StageStatus {
    /// The CSV cell text for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::NoNewData => "NND",
        }
    }
}

/// Terminal status of one entity's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    /// All stages completed.
    Success,
    /// The entity was skipped (NND or excluded format).
    Skipped,
    /// Some stage failed.
    Failure,
}

/// The outcome of processing one entity, consumed by [`Journal::finalize`].
#[derive(Debug, Clone)]
pub struct EntityResult {
    /// Internal entity identifier.
    pub entity: String,
    /// Terminal status.
    pub status: EntityStatus,
    /// Resolved data date (`YYYY-MM-DD`), if any.
    pub data_date: Option<String>,
    /// Wall-clock runtime in whole seconds.
    pub runtime_seconds: u64,
    /// Non-fatal warning (skip reason, defaulted data date, ...).
    pub warning: Option<String>,
    /// Failure message.
    pub error: Option<String>,
}

/// One entity row of the journal CSV.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalRow {
    /// Internal county identifier.
    pub county: String,
    /// Internal city identifier (may be empty).
    pub city: String,
    /// Last recorded data date.
    pub data_date: String,
    /// Download stage status.
    pub download_status: String,
    /// Processing stage status.
    pub processing_status: String,
    /// Upload stage status.
    pub upload_status: String,
    /// Failure/skip explanation; empty on success.
    pub error_message: String,
    /// When this row last changed (`M/D/YY H:MM AM/PM`).
    pub timestamp: String,
}

/// First cell of the trailing summary row.
const SUMMARY_MARKER: &str = "LAST UPDATED:";

/// Layers whose summary row spreads the date and time across the `city`
/// and `data_date` columns.
const WIDE_SUMMARY_LAYERS: &[&str] = &["flu", "zoning"];

/// Owns one layer's journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    layer: String,
    started: Instant,
}

impl Journal {
    /// Creates a journal for `layer`, stored as `<layer>_summary.csv`
    /// inside `dir`. The pipeline runtime shown in the summary row is
    /// measured from this call.
    #[must_use]
    pub fn new(dir: &Path, layer: &str) -> Self {
        Self {
            path: dir.join(format!("{layer}_summary.csv")),
            layer: layer.to_string(),
            started: Instant::now(),
        }
    }

    /// The journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensures a row exists for every queued entity and clears its four
    /// status/error columns for the new run. Rows for other entities are
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] on CSV or filesystem failure, or if an
    /// entity cannot be split.
    pub fn initialize(&self, queue: &[String]) -> Result<(), JournalError> {
        let mut rows = self.load()?;

        for entity in queue {
            let (county, city) = split_entity(entity)?;
            let row = find_or_insert(&mut rows, &county, &city);
            row.download_status.clear();
            row.processing_status.clear();
            row.upload_status.clear();
            row.error_message.clear();
        }

        self.save(&rows)
    }

    /// Records a stage transition for one entity and persists the file.
    ///
    /// An NND download clears the downstream status columns but keeps the
    /// supplied message so the source of the NND signal stays visible. A
    /// successful upload with a `data_date` records it on the row.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] on CSV or filesystem failure, or if the
    /// entity cannot be split.
    pub fn update_stage(
        &self,
        entity: &str,
        stage: Stage,
        status: StageStatus,
        error: Option<&str>,
        data_date: Option<&str>,
    ) -> Result<(), JournalError> {
        let (county, city) = split_entity(entity)?;
        let mut rows = self.load()?;
        let row = find_or_insert(&mut rows, &county, &city);

        match stage {
            Stage::Download => {
                row.download_status = status.as_str().to_string();
                if status == StageStatus::NoNewData {
                    row.processing_status.clear();
                    row.upload_status.clear();
                }
            }
            Stage::Processing => {
                row.processing_status = status.as_str().to_string();
            }
            Stage::Upload => {
                row.upload_status = status.as_str().to_string();
                if status == StageStatus::Success
                    && let Some(date) = data_date
                {
                    row.data_date = date.to_string();
                }
            }
        }

        match status {
            StageStatus::Success => row.error_message.clear(),
            StageStatus::Failed | StageStatus::NoNewData | StageStatus::Skipped => {
                if let Some(message) = error {
                    row.error_message = message.to_string();
                }
            }
        }

        row.timestamp = now_stamp();
        self.save(&rows)
    }

    /// The previously recorded data date for an entity, used for the
    /// metadata-equality NND check. Read failures simply yield `None`.
    #[must_use]
    pub fn existing_data_date(&self, entity: &str) -> Option<String> {
        let (county, city) = split_entity(entity).ok()?;
        let rows = self.load().ok()?;
        rows.iter()
            .find(|r| r.county == county && r.city == city)
            .map(|r| r.data_date.clone())
            .filter(|d| !d.is_empty())
    }

    /// Merges run results into the journal and rewrites the summary row.
    /// Historical rows for entities outside this run are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] on CSV or filesystem failure.
    pub fn finalize(&self, results: &[EntityResult]) -> Result<(), JournalError> {
        let mut rows = self.load()?;

        for result in results {
            let Ok((county, city)) = split_entity(&result.entity) else {
                log::warn!("Skipping result for unparseable entity '{}'", result.entity);
                continue;
            };
            let row = find_or_insert(&mut rows, &county, &city);
            apply_result(row, result);
            row.timestamp = now_stamp();
        }

        self.save(&rows)?;
        log::info!(
            "Summary file updated: {} ({} entities)",
            self.path.display(),
            rows.len()
        );
        Ok(())
    }

    /// Loads entity rows, ignoring any summary row. A missing file yields
    /// an empty list.
    fn load(&self) -> Result<Vec<JournalRow>, JournalError> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize::<JournalRow>() {
            let row = row?;
            if row.county.starts_with(SUMMARY_MARKER) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Sorts rows by (county, city), appends the summary row, and writes
    /// atomically via a temp sibling plus rename.
    fn save(&self, rows: &[JournalRow]) -> Result<(), JournalError> {
        let mut sorted: Vec<JournalRow> = rows.to_vec();
        sorted.sort_by(|a, b| (a.county.as_str(), a.city.as_str()).cmp(&(b.county.as_str(), b.city.as_str())));

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            for row in &sorted {
                writer.serialize(row)?;
            }
            writer.serialize(self.summary_row(&sorted))?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Builds the trailing summary row from the current rows.
    fn summary_row(&self, rows: &[JournalRow]) -> JournalRow {
        let ratio = |select: fn(&JournalRow) -> &str| {
            let success = rows.iter().filter(|r| select(r) == "SUCCESS").count();
            let total = rows
                .iter()
                .filter(|r| matches!(select(r), "SUCCESS" | "FAILED"))
                .count();
            format!("{success}/{total}")
        };

        let now = Local::now();
        let (city, data_date) = if WIDE_SUMMARY_LAYERS.contains(&self.layer.as_str()) {
            (
                now.format("%m/%d/%y").to_string(),
                now.format("%I:%M %p").to_string(),
            )
        } else {
            (String::new(), now_stamp())
        };

        JournalRow {
            county: SUMMARY_MARKER.to_string(),
            city,
            data_date,
            download_status: ratio(|r| r.download_status.as_str()),
            processing_status: ratio(|r| r.processing_status.as_str()),
            upload_status: ratio(|r| r.upload_status.as_str()),
            error_message: String::new(),
            timestamp: format_runtime(self.started.elapsed().as_secs()),
        }
    }
}

/// Applies one entity result to its row, classifying failures to a stage
/// when no stage recorded its own status.
fn apply_result(row: &mut JournalRow, result: &EntityResult) {
    let message = result
        .error
        .clone()
        .or_else(|| result.warning.clone())
        .unwrap_or_default();

    match result.status {
        EntityStatus::Skipped if is_nnd_message(&message) => {
            row.download_status = StageStatus::NoNewData.as_str().to_string();
            row.processing_status.clear();
            row.upload_status.clear();
            // error_message stays: update_stage already recorded the NND
            // source and this pass must not erase it.
        }
        EntityStatus::Skipped => {
            row.download_status = StageStatus::Skipped.as_str().to_string();
            row.processing_status = StageStatus::Skipped.as_str().to_string();
            row.upload_status = StageStatus::Skipped.as_str().to_string();
            row.error_message = message;
        }
        EntityStatus::Success => {
            row.download_status = StageStatus::Success.as_str().to_string();
            row.processing_status = StageStatus::Success.as_str().to_string();
            row.upload_status = StageStatus::Success.as_str().to_string();
            row.error_message.clear();
            if let Some(date) = &result.data_date {
                row.data_date.clone_from(date);
            }
        }
        EntityStatus::Failure => {
            let (download, processing, upload) = classify_failure_stage(&message);
            row.download_status = download.to_string();
            row.processing_status = processing.to_string();
            row.upload_status = upload.to_string();
            row.error_message = message;
        }
    }
}

/// Whether a skip message describes a no-new-data outcome.
fn is_nnd_message(message: &str) -> bool {
    message.contains("No new data available") || message.contains("data date unchanged")
}

/// Assigns a failed stage from the error message when no stage set its own
/// status. Keyword-based and fallible; earlier stages win ties.
#[must_use]
pub fn classify_failure_stage(error: &str) -> (&'static str, &'static str, &'static str) {
    let error_lower = error.to_lowercase();
    let contains_any =
        |terms: &[&str]| terms.iter().any(|term| error_lower.contains(term));

    if contains_any(&[
        "download",
        "ags_extract",
        "download_data",
        "connection",
        "url",
        "http",
    ]) {
        return ("FAILED", "", "");
    }

    if contains_any(&["processing", "update_", "ogr2ogr", "shapefile", "geometry"]) {
        return ("SUCCESS", "FAILED", "");
    }

    if contains_any(&["upload", "psql", "database", "catalog"]) {
        return ("SUCCESS", "SUCCESS", "FAILED");
    }

    ("FAILED", "", "")
}

/// Formats a runtime as `Xhr Ymin Zsec`, dropping leading zero units.
#[must_use]
pub fn format_runtime(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}sec");
    }

    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;
    if minutes < 60 {
        return format!("{minutes}min {remaining_seconds}sec");
    }

    let hours = minutes / 60;
    let remaining_minutes = minutes % 60;
    format!("{hours}hr {remaining_minutes}min {remaining_seconds}sec")
}

fn now_stamp() -> String {
    Local::now().format("%m/%d/%y %I:%M %p").to_string()
}

fn find_or_insert<'a>(
    rows: &'a mut Vec<JournalRow>,
    county: &str,
    city: &str,
) -> &'a mut JournalRow {
    if let Some(index) = rows
        .iter()
        .position(|r| r.county == county && r.city == city)
    {
        return &mut rows[index];
    }

    rows.push(JournalRow {
        county: county.to_string(),
        city: city.to_string(),
        ..JournalRow::default()
    });
    let last = rows.len() - 1;
    &mut rows[last]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(journal: &Journal) -> Vec<JournalRow> {
        let mut reader = csv::Reader::from_path(journal.path()).unwrap();
        reader
            .deserialize::<JournalRow>()
            .map(Result::unwrap)
            .collect()
    }

    fn entity_rows(rows: &[JournalRow]) -> Vec<&JournalRow> {
        rows.iter()
            .filter(|r| !r.county.starts_with(SUMMARY_MARKER))
            .collect()
    }

    #[test]
    fn initialize_creates_sorted_rows_with_summary() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal
            .initialize(&[
                "duval_unified".to_string(),
                "alachua_gainesville".to_string(),
                "broward".to_string(),
            ])
            .unwrap();

        let rows = read_all(&journal);
        let entities = entity_rows(&rows);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].county, "alachua");
        assert_eq!(entities[1].county, "broward");
        assert_eq!(entities[2].county, "duval");

        let summary = rows.last().unwrap();
        assert!(summary.county.starts_with(SUMMARY_MARKER));
        assert_eq!(summary.download_status, "0/0");
    }

    #[test]
    fn initialize_clears_statuses_but_keeps_other_entities() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal.initialize(&["alachua_gainesville".to_string()]).unwrap();
        journal
            .update_stage(
                "alachua_gainesville",
                Stage::Download,
                StageStatus::Failed,
                Some("download blew up"),
                None,
            )
            .unwrap();
        journal.initialize(&["broward".to_string()]).unwrap();

        let rows = read_all(&journal);
        let entities = entity_rows(&rows);
        assert_eq!(entities.len(), 2);

        // alachua was not re-queued: its failure survives.
        let alachua = entities.iter().find(|r| r.county == "alachua").unwrap();
        assert_eq!(alachua.download_status, "FAILED");

        // broward was queued: fresh empty columns.
        let broward = entities.iter().find(|r| r.county == "broward").unwrap();
        assert!(broward.download_status.is_empty());
        assert!(broward.error_message.is_empty());
    }

    #[test]
    fn nnd_download_clears_downstream_and_keeps_message() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "flu");

        journal.initialize(&["duval_unified".to_string()]).unwrap();
        journal
            .update_stage(
                "duval_unified",
                Stage::Processing,
                StageStatus::Success,
                None,
                None,
            )
            .unwrap();
        journal
            .update_stage(
                "duval_unified",
                Stage::Download,
                StageStatus::NoNewData,
                Some("Download command: no new data"),
                None,
            )
            .unwrap();

        let rows = read_all(&journal);
        let row = &entity_rows(&rows)[0];
        assert_eq!(row.download_status, "NND");
        assert!(row.processing_status.is_empty());
        assert!(row.upload_status.is_empty());
        assert_eq!(row.error_message, "Download command: no new data");
    }

    #[test]
    fn successful_upload_records_data_date_and_clears_error() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal.initialize(&["alachua_gainesville".to_string()]).unwrap();
        journal
            .update_stage(
                "alachua_gainesville",
                Stage::Upload,
                StageStatus::Success,
                None,
                Some("2024-01-15"),
            )
            .unwrap();

        let rows = read_all(&journal);
        let row = &entity_rows(&rows)[0];
        assert_eq!(row.upload_status, "SUCCESS");
        assert_eq!(row.data_date, "2024-01-15");
        assert!(row.error_message.is_empty());

        assert_eq!(
            journal.existing_data_date("alachua_gainesville").as_deref(),
            Some("2024-01-15")
        );
    }

    #[test]
    fn finalize_preserves_history_and_appends_one_summary() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal.initialize(&["alachua_gainesville".to_string()]).unwrap();
        journal
            .update_stage(
                "lake_tavares",
                Stage::Download,
                StageStatus::Success,
                None,
                None,
            )
            .unwrap();

        journal
            .finalize(&[EntityResult {
                entity: "alachua_gainesville".to_string(),
                status: EntityStatus::Success,
                data_date: Some("2024-01-15".to_string()),
                runtime_seconds: 12,
                warning: None,
                error: None,
            }])
            .unwrap();

        let rows = read_all(&journal);
        let summaries: Vec<_> = rows
            .iter()
            .filter(|r| r.county.starts_with(SUMMARY_MARKER))
            .collect();
        assert_eq!(summaries.len(), 1);
        assert!(
            rows.last().unwrap().county.starts_with(SUMMARY_MARKER),
            "summary row must come last"
        );

        let entities = entity_rows(&rows);
        assert_eq!(entities.len(), 2, "historical lake_tavares row preserved");

        let alachua = entities.iter().find(|r| r.county == "alachua").unwrap();
        assert_eq!(alachua.download_status, "SUCCESS");
        assert_eq!(alachua.processing_status, "SUCCESS");
        assert_eq!(alachua.upload_status, "SUCCESS");
        assert_eq!(alachua.data_date, "2024-01-15");
    }

    #[test]
    fn finalize_classifies_unattributed_failures() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal.initialize(&["marion_ocala".to_string()]).unwrap();
        journal
            .finalize(&[EntityResult {
                entity: "marion_ocala".to_string(),
                status: EntityStatus::Failure,
                data_date: None,
                runtime_seconds: 3,
                warning: None,
                error: Some("ogr2ogr reprojection failed".to_string()),
            }])
            .unwrap();

        let rows = read_all(&journal);
        let row = &entity_rows(&rows)[0];
        assert_eq!(row.download_status, "SUCCESS");
        assert_eq!(row.processing_status, "FAILED");
        assert!(row.upload_status.is_empty());
        assert_eq!(row.error_message, "ogr2ogr reprojection failed");
    }

    #[test]
    fn rows_stay_sorted_after_out_of_order_updates() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "streets");

        for entity in ["polk_lakeland", "baker", "orange_orlando"] {
            journal
                .update_stage(entity, Stage::Download, StageStatus::Success, None, None)
                .unwrap();
        }

        let rows = read_all(&journal);
        let entities = entity_rows(&rows);
        let keys: Vec<(String, String)> = entities
            .iter()
            .map(|r| (r.county.clone(), r.city.clone()))
            .collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        assert_eq!(keys, sorted_keys);
    }

    #[test]
    fn classifier_assigns_stages_by_keyword() {
        assert_eq!(
            classify_failure_stage("HTTP 500 from server"),
            ("FAILED", "", "")
        );
        assert_eq!(
            classify_failure_stage("update_zoning2.py exited 1"),
            ("SUCCESS", "FAILED", "")
        );
        assert_eq!(
            classify_failure_stage("psql: connection refused"),
            ("FAILED", "", ""),
            "connection keyword attributes to download first"
        );
        assert_eq!(
            classify_failure_stage("psql exited 2"),
            ("SUCCESS", "SUCCESS", "FAILED")
        );
        assert_eq!(
            classify_failure_stage("something inscrutable"),
            ("FAILED", "", "")
        );
    }

    #[test]
    fn runtime_formatting_drops_zero_units() {
        assert_eq!(format_runtime(42), "42sec");
        assert_eq!(format_runtime(125), "2min 5sec");
        assert_eq!(format_runtime(3725), "1hr 2min 5sec");
    }

    #[test]
    fn summary_ratios_count_success_and_failed_only() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path(), "zoning");

        journal
            .initialize(&[
                "alachua_gainesville".to_string(),
                "broward".to_string(),
                "duval_unified".to_string(),
            ])
            .unwrap();
        journal
            .update_stage(
                "alachua_gainesville",
                Stage::Download,
                StageStatus::Success,
                None,
                None,
            )
            .unwrap();
        journal
            .update_stage(
                "broward",
                Stage::Download,
                StageStatus::Failed,
                Some("boom"),
                None,
            )
            .unwrap();
        journal
            .update_stage(
                "duval_unified",
                Stage::Download,
                StageStatus::NoNewData,
                Some("Download command: no new data"),
                None,
            )
            .unwrap();

        let rows = read_all(&journal);
        let summary = rows.last().unwrap();
        assert_eq!(summary.download_status, "1/2", "NND excluded from ratio");
    }
}
