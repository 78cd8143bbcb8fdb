//! Data-date resolution.
//!
//! The *data date* is the logical revision date of a dataset's content,
//! distinct from when we processed it. No single source is reliable, so
//! candidates are gathered from a ladder of sources with trust levels and
//! the latest accepted candidate wins. Medium- and low-trust candidates
//! equal to today are rejected — they almost always reflect an auto-touched
//! file, and accepting them would make stale data look fresh.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::dbf::DbfTable;

/// No dataset in the catalog predates this; anything earlier is noise.
pub const MIN_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2015, 1, 1) {
    Some(d) => d,
    None => panic!("valid min date"),
};

/// Attribute columns that carry revision dates, in preference order.
const DATE_COLUMNS: &[&str] = &[
    "update_dt",
    "updated",
    "last_edit",
    "lastupdate",
    "edit_date",
    "date_upd",
    "datadate",
    "effective",
    "rev_date",
    "eff_date",
    "effdate",
    "date_eff",
];

static ISO_OR_COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})|(\d{8})").expect("valid regex"));

static FILENAME_YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[-_](\d{2})[-_](\d{2})").expect("valid regex"));

static FILENAME_MDY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[-_](\d{2})[-_](\d{4})").expect("valid regex"));

static FILENAME_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})").expect("valid regex"));

static COMPACT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{8})").expect("valid regex"));

/// How much a date source is believed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Sidecar metadata and attribute-table columns.
    High,
    /// DBF bookkeeping dates.
    Medium,
    /// Filename digits and file mtimes.
    Low,
}

/// Outcome of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateResolution {
    /// The chosen date, never later than today.
    pub date: NaiveDate,
    /// True when every candidate was rejected and today was substituted.
    pub defaulted_today: bool,
}

/// Whether a candidate passes the acceptance rule for its trust level.
#[must_use]
pub fn accept(candidate: NaiveDate, trust: Trust, today: NaiveDate) -> bool {
    if candidate < MIN_DATE || candidate > today {
        return false;
    }
    if trust != Trust::High && candidate == today {
        return false;
    }
    true
}

/// Parses a date from `YYYY-MM-DD` (possibly with a trailing time) or
/// `YYYYMMDD`.
#[must_use]
pub fn parse_datestr(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    let head: String = s.chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d").ok()
}

/// Resolves the data date for a shapefile by walking the ladder:
///
/// 1. sidecar metadata XML (high)
/// 2. attribute-table date columns (high)
/// 3. `DBF_DATE_LAST_UPDATE` from ogrinfo (medium)
/// 4. DBF header date bytes (medium)
/// 5. `YYYYMMDD` digits in a sibling zip filename (low)
/// 6. shapefile mtime (low)
///
/// The latest accepted candidate wins; if nothing is accepted the result
/// defaults to today with `defaulted_today` set.
#[must_use]
pub fn resolve_shapefile_date(
    shp_path: &Path,
    ogr_stdout: Option<&str>,
    dbf: Option<&DbfTable>,
    today: NaiveDate,
) -> DateResolution {
    let mut accepted: Vec<NaiveDate> = Vec::new();
    let mut note = |source: &str, candidate: Option<NaiveDate>, trust: Trust| {
        if let Some(candidate) = candidate {
            let ok = accept(candidate, trust, today);
            log::debug!(
                "[data_date] source={source} candidate={candidate} trust={trust:?} accepted={ok}"
            );
            if ok {
                accepted.push(candidate);
            }
        }
    };

    // (1) sidecar XML
    note("sidecar_xml", sidecar_xml_date(shp_path), Trust::High);

    // (2) attribute-table date columns
    if let Some(dbf) = dbf {
        let dbf_path = shp_path.with_extension("dbf");
        note(
            "attribute_column",
            attribute_column_date(dbf, &dbf_path),
            Trust::High,
        );
    }

    // (3) DBF_DATE_LAST_UPDATE
    if let Some(stdout) = ogr_stdout {
        note(
            "dbf_last_update",
            crate::ogrinfo::parse_dbf_last_update(stdout),
            Trust::Medium,
        );
    }

    // (4) DBF header date bytes
    if let Some(dbf) = dbf {
        note("dbf_header", dbf.last_update, Trust::Medium);
    }

    // (5) sibling zip filename digits
    note("zip_filename", sibling_zip_date(shp_path), Trust::Low);

    // (6) shapefile mtime
    note("file_mtime", file_mtime_date(shp_path), Trust::Low);

    accepted.into_iter().max().map_or(
        DateResolution {
            date: today,
            defaulted_today: true,
        },
        |date| DateResolution {
            date,
            defaulted_today: false,
        },
    )
}

/// First `YYYY-MM-DD` or `YYYYMMDD` found in a sidecar metadata XML next to
/// the shapefile (`<name>.shp.xml`, `<name>.xml`, `<name>_metadata.xml`).
fn sidecar_xml_date(shp_path: &Path) -> Option<NaiveDate> {
    let stem = shp_path.with_extension("");
    let candidates: [PathBuf; 3] = [
        PathBuf::from(format!("{}.xml", shp_path.display())),
        stem.with_extension("xml"),
        PathBuf::from(format!("{}_metadata.xml", stem.display())),
    ];

    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&candidate) else {
            log::debug!("Failed reading sidecar metadata {}", candidate.display());
            continue;
        };
        if let Some(m) = ISO_OR_COMPACT.find(&text)
            && let Some(date) = parse_datestr(m.as_str())
        {
            return Some(date);
        }
    }
    None
}

/// Maximum parseable value of the first known date column present in the
/// attribute table.
fn attribute_column_date(dbf: &DbfTable, dbf_path: &Path) -> Option<NaiveDate> {
    let field_names: Vec<String> = dbf
        .fields
        .iter()
        .map(|f| f.name.to_lowercase())
        .collect();

    for column in DATE_COLUMNS {
        if !field_names.iter().any(|n| n == column) {
            continue;
        }
        let values = match dbf.read_column(dbf_path, column) {
            Ok(values) => values,
            Err(e) => {
                log::debug!("Error scanning attribute table for date: {e}");
                return None;
            }
        };
        let latest = values.iter().filter_map(|v| parse_datestr(v)).max();
        if latest.is_some() {
            return latest;
        }
    }
    None
}

/// First 8-digit run in any sibling `.zip` filename that parses as a date.
fn sibling_zip_date(shp_path: &Path) -> Option<NaiveDate> {
    let parent = shp_path.parent()?;
    let entries = std::fs::read_dir(parent).ok()?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_lowercase().ends_with(".zip") {
            continue;
        }
        if let Some(c) = COMPACT_DATE.captures(&name)
            && let Some(date) = parse_datestr(&c[1])
        {
            return Some(date);
        }
    }
    None
}

/// The file's modification time as a local date.
fn file_mtime_date(path: &Path) -> Option<NaiveDate> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(chrono::DateTime::<chrono::Local>::from(modified).date_naive())
}

/// Whether a document date is plausible: between ten years and one week
/// old. A fresher date usually means the file was just touched, not that
/// the content is new.
#[must_use]
pub fn is_reasonable_document_date(date: NaiveDate, today: NaiveDate) -> bool {
    let ten_years_ago = today - Days::new(3650);
    let one_week_ago = today - Days::new(7);
    ten_years_ago <= date && date <= one_week_ago
}

/// Extracts a date from a document filename: `YYYY-MM-DD`/`YYYY_MM_DD`,
/// then `MM-DD-YYYY`/`MM_DD_YYYY`, then a bare `YYYY` (taken as January
/// 1st).
#[must_use]
pub fn filename_date(path: &Path) -> Option<NaiveDate> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())?;

    if let Some(c) = FILENAME_YMD.captures(&stem)
        && let Some(date) = ymd(&c[1], &c[2], &c[3])
    {
        return Some(date);
    }
    if let Some(c) = FILENAME_MDY.captures(&stem)
        && let Some(date) = ymd(&c[3], &c[1], &c[2])
    {
        return Some(date);
    }
    if let Some(c) = FILENAME_YEAR.captures(&stem)
        && let Some(date) = ymd(&c[1], "01", "01")
    {
        return Some(date);
    }
    None
}

/// Conservative data date for a document: a reasonable filename date, then
/// a reasonable mtime, otherwise nothing. Never reports "fresh" for a file
/// whose only evidence of freshness is a recent touch.
#[must_use]
pub fn document_date(path: &Path, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(date) = filename_date(path)
        && is_reasonable_document_date(date, today)
    {
        return Some(date);
    }

    if let Some(date) = file_mtime_date(path)
        && is_reasonable_document_date(date, today)
    {
        return Some(date);
    }

    log::warn!(
        "No reasonable data date found for document: {}",
        path.display()
    );
    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    #[test]
    fn acceptance_enforces_bounds() {
        let today = date(2024, 3, 9);
        assert!(!accept(date(2014, 12, 31), Trust::High, today));
        assert!(!accept(date(2024, 3, 10), Trust::High, today));
        assert!(accept(date(2015, 1, 1), Trust::Low, today));
        assert!(accept(date(2024, 3, 8), Trust::Low, today));
    }

    #[test]
    fn medium_and_low_trust_reject_today() {
        let today = date(2024, 3, 9);
        assert!(accept(today, Trust::High, today));
        assert!(!accept(today, Trust::Medium, today));
        assert!(!accept(today, Trust::Low, today));
    }

    #[test]
    fn parses_both_date_encodings() {
        assert_eq!(parse_datestr("2024-01-15"), Some(date(2024, 1, 15)));
        assert_eq!(parse_datestr("20240115"), Some(date(2024, 1, 15)));
        assert_eq!(
            parse_datestr("2024-01-15 00:00:00"),
            Some(date(2024, 1, 15))
        );
        assert_eq!(parse_datestr("not a date"), None);
    }

    #[test]
    fn ladder_picks_latest_accepted_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("zoning.shp");
        fs::write(&shp, b"stub").unwrap();
        fs::write(
            dir.path().join("zoning.shp.xml"),
            "<metadata><pubdate>2023-06-01</pubdate></metadata>",
        )
        .unwrap();
        fs::write(dir.path().join("zoning_20240115.zip"), b"zip").unwrap();

        let resolution = resolve_shapefile_date(&shp, None, None, today());
        assert_eq!(resolution.date, date(2024, 1, 15));
        assert!(!resolution.defaulted_today);
    }

    #[test]
    fn ladder_defaults_to_today_when_nothing_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("bare.shp");
        fs::write(&shp, b"stub").unwrap();

        // The only candidate is the fresh mtime, which low trust rejects.
        let resolution = resolve_shapefile_date(&shp, None, None, today());
        assert_eq!(resolution.date, today());
        assert!(resolution.defaulted_today);
    }

    #[test]
    fn ladder_uses_ogrinfo_dbf_date() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("flu.shp");
        fs::write(&shp, b"stub").unwrap();

        let stdout = "Metadata:\n  DBF_DATE_LAST_UPDATE=2023-11-20\n";
        let resolution = resolve_shapefile_date(&shp, Some(stdout), None, today());
        assert_eq!(resolution.date, date(2023, 11, 20));
    }

    #[test]
    fn filename_dates_parse_in_pattern_order() {
        assert_eq!(
            filename_date(Path::new("zoning_2024-01-15.pdf")),
            Some(date(2024, 1, 15))
        );
        assert_eq!(
            filename_date(Path::new("zoning_2024_01_15.pdf")),
            Some(date(2024, 1, 15))
        );
        assert_eq!(
            filename_date(Path::new("report_03_09_2022.pdf")),
            Some(date(2022, 3, 9))
        );
        assert_eq!(
            filename_date(Path::new("budget_2019.pdf")),
            Some(date(2019, 1, 1))
        );
        assert_eq!(filename_date(Path::new("notes.pdf")), None);
    }

    #[test]
    fn reasonable_window_is_ten_years_to_one_week() {
        let today = date(2024, 3, 9);
        assert!(is_reasonable_document_date(date(2023, 3, 9), today));
        assert!(!is_reasonable_document_date(date(2024, 3, 8), today));
        assert!(!is_reasonable_document_date(date(2010, 1, 1), today));
    }

    #[test]
    fn fresh_document_without_filename_date_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("flood_map.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        // mtime is now, which is inside the one-week exclusion window.
        assert_eq!(document_date(&pdf, today()), None);
    }

    #[test]
    fn document_with_dated_filename_uses_it() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("flood_map_2022-07-04.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        assert_eq!(document_date(&pdf, today()), Some(date(2022, 7, 4)));
    }
}
