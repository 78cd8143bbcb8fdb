#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Provenance metadata extraction for downloaded GIS artifacts.
//!
//! For geospatial formats the primary artifact is the newest shapefile in
//! the work directory: `ogrinfo` supplies the spatial reference, the DBF
//! header supplies the schema, and the data date comes from the tiered
//! ladder in [`dates`]. Document formats (PDF sources) get a conservative
//! subset — largest file, filename/mtime date only.
//!
//! Extraction degrades instead of failing: a missing `ogrinfo`, an
//! unmapped SRS name, or an unreadable DBF each cost one field, not the
//! entity.

pub mod dates;
pub mod dbf;
pub mod files;
pub mod ogrinfo;

use std::path::Path;

use chrono::NaiveDate;
use gis_pipeline_runner::Execute;

use crate::dbf::DbfTable;

/// Metadata extracted from a downloaded artifact. Every field is optional;
/// the catalog update stage only writes what is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Base filename of the primary artifact.
    pub shp: Option<String>,
    /// EPSG code resolved from the SRS name.
    pub epsg: Option<String>,
    /// Resolved data date, never later than today.
    pub data_date: Option<NaiveDate>,
    /// JSON-encoded ordered list of attribute names.
    pub field_names: Option<String>,
    /// When this record was produced; always the run date.
    pub update_date: NaiveDate,
    /// True when the date ladder rejected every candidate and fell back to
    /// today. Surfaced as a warning in the journal.
    pub defaulted_today: bool,
}

impl MetadataRecord {
    /// A record with no extracted values, stamped with today's date.
    #[must_use]
    pub const fn empty(today: NaiveDate) -> Self {
        Self {
            shp: None,
            epsg: None,
            data_date: None,
            field_names: None,
            update_date: today,
            defaulted_today: false,
        }
    }

    /// Whether any value was extracted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.shp.is_none()
            && self.epsg.is_none()
            && self.data_date.is_none()
            && self.field_names.is_none()
    }

    /// The data date formatted as `YYYY-MM-DD`.
    #[must_use]
    pub fn data_date_string(&self) -> Option<String> {
        self.data_date.map(|d| d.format("%Y-%m-%d").to_string())
    }
}

/// Extracts metadata for a geospatial entity from the newest shapefile in
/// `work_dir`. Returns an empty record if no shapefile exists (an empty
/// work directory is not an error — download may be disabled).
pub async fn extract_shapefile_metadata(
    runner: &dyn Execute,
    work_dir: &Path,
    today: NaiveDate,
) -> MetadataRecord {
    let mut record = MetadataRecord::empty(today);

    let Some(shp_path) = files::find_newest_shapefile(work_dir) else {
        log::warn!(
            "No shapefile found in {} for metadata extraction",
            work_dir.display()
        );
        return record;
    };

    record.shp = shp_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let ogr_stdout = ogrinfo::summary(runner, &shp_path).await;

    if let Some(stdout) = ogr_stdout.as_deref() {
        if let Some((kind, name)) = ogrinfo::parse_srs_name(stdout) {
            if let Some(epsg) = ogrinfo::epsg_for_srs_name(&name) {
                log::debug!("Mapped {kind} name '{name}' to EPSG:{epsg}");
                record.epsg = Some(epsg.to_string());
            } else {
                log::warn!("SRS name '{name}' not in lookup table; unable to map to EPSG");
            }
        } else {
            log::debug!("No SRS definition found in ogrinfo output");
        }
    }

    let dbf_path = shp_path.with_extension("dbf");
    let dbf = match DbfTable::read_header(&dbf_path) {
        Ok(table) => Some(table),
        Err(e) => {
            log::debug!("DBF header read failed ({e}); falling back to ogrinfo parsing");
            None
        }
    };

    let field_names = dbf.as_ref().map_or_else(
        || {
            ogr_stdout
                .as_deref()
                .map(ogrinfo::parse_field_names)
                .unwrap_or_default()
        },
        DbfTable::field_names,
    );
    record.field_names = Some(
        serde_json::to_string(&field_names).unwrap_or_else(|_| "[]".to_string()),
    );

    let resolution =
        dates::resolve_shapefile_date(&shp_path, ogr_stdout.as_deref(), dbf.as_ref(), today);

    // The ladder already bounds candidates at today; clamp anyway so a
    // future regression cannot publish a future date.
    record.data_date = Some(resolution.date.min(today));
    record.defaulted_today = resolution.defaulted_today;

    record
}

/// Extracts metadata for a metadata-only (document) entity from the largest
/// file in `work_dir`. PDF files get the conservative filename/mtime
/// ladder; anything else takes its mtime as the data date.
#[must_use]
pub fn extract_document_metadata(work_dir: &Path, today: NaiveDate) -> MetadataRecord {
    let mut record = MetadataRecord::empty(today);

    let Some(path) = files::find_largest_file(work_dir) else {
        return record;
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_pdf = name.to_lowercase().ends_with(".pdf");

    record.data_date = if is_pdf {
        dates::document_date(&path, today)
    } else {
        std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(|modified| chrono::DateTime::<chrono::Local>::from(modified).date_naive())
            .map(|d| d.min(today))
    };

    record.shp = Some(name);
    record.field_names = Some("[]".to_string());

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_pipeline_runner::CommandRunner;
    use std::fs;

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    #[tokio::test]
    async fn empty_work_dir_yields_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(true);

        let record = extract_shapefile_metadata(&runner, dir.path(), today()).await;
        assert!(record.is_empty());
        assert!(record.data_date.is_none());
        assert_eq!(record.update_date, today());
    }

    #[tokio::test]
    async fn shapefile_record_carries_name_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zoning.shp"), b"stub").unwrap();
        fs::write(dir.path().join("zoning_20230601.zip"), b"zip").unwrap();

        // Test-mode runner: ogrinfo is skipped and returns empty stdout,
        // so schema falls back to the (absent) DBF and stays empty.
        let runner = CommandRunner::new(true);
        let record = extract_shapefile_metadata(&runner, dir.path(), today()).await;

        assert_eq!(record.shp.as_deref(), Some("zoning.shp"));
        assert_eq!(record.field_names.as_deref(), Some("[]"));
        assert_eq!(
            record.data_date,
            NaiveDate::from_ymd_opt(2023, 6, 1),
            "zip filename date should win over rejected fresh mtime"
        );
        assert!(!record.defaulted_today);
    }

    #[tokio::test]
    async fn shapefile_without_any_candidate_defaults_to_today() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bare.shp"), b"stub").unwrap();

        let runner = CommandRunner::new(true);
        let record = extract_shapefile_metadata(&runner, dir.path(), today()).await;

        assert_eq!(record.data_date, Some(today()));
        assert!(record.defaulted_today);
    }

    #[test]
    fn fresh_undated_document_omits_data_date() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("flood_map.pdf"), b"%PDF-1.4").unwrap();

        let record = extract_document_metadata(dir.path(), today());
        assert_eq!(record.shp.as_deref(), Some("flood_map.pdf"));
        assert!(record.data_date.is_none(), "no lie about freshness");
        assert_eq!(record.field_names.as_deref(), Some("[]"));
    }

    #[test]
    fn dated_document_keeps_its_filename_date() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("flood_map_2022-07-04.pdf"), b"%PDF-1.4").unwrap();

        let record = extract_document_metadata(dir.path(), today());
        assert_eq!(record.data_date, NaiveDate::from_ymd_opt(2022, 7, 4));
    }

    #[test]
    fn non_pdf_document_uses_mtime() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("parcels.xlsx"), vec![0u8; 128]).unwrap();

        let record = extract_document_metadata(dir.path(), today());
        assert_eq!(record.data_date, Some(today()));
    }

    #[test]
    fn empty_directory_document_record_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let record = extract_document_metadata(dir.path(), today());
        assert!(record.is_empty());
    }
}
