//! `ogrinfo` invocation and output parsing.
//!
//! All regexes over ogrinfo output live here, each exercised against
//! fixture output in the tests below. Both WKT1 (`PROJCS`/`GEOGCS`) and
//! WKT2 (`PROJCRS`/`GEOGCRS`) spellings are accepted.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use gis_pipeline_runner::Execute;
use regex::Regex;

/// SRS names as they appear in WKT, canonicalized, mapped to EPSG codes.
/// Extend as new sources surface new spellings.
const NAME_TO_EPSG: &[(&str, &str)] = &[
    // Geographic WGS84
    ("gcs_wgs_1984", "4326"),
    ("wgs_84", "4326"),
    // Web Mercator / Pseudo-Mercator
    ("wgs_84_pseudo_mercator", "3857"),
    // Florida State Plane (NAD83 1983)
    ("nad_1983_stateplane_florida_east_fips_0901_feet", "2236"),
    ("nad_1983_stateplane_florida_west_fips_0902_feet", "2237"),
    ("nad_1983_stateplane_florida_north_fips_0903_feet", "2238"),
    // Florida State Plane (NAD83 HARN)
    ("nad83_harn_florida_east_ftus", "2881"),
    ("nad83_harn_florida_west_ftus", "2882"),
    // Florida State Plane (NAD83 2011)
    ("nad_1983_2011_stateplane_florida_west_fips_0902_ft_us", "6443"),
    // Florida State Plane (NAD83, WKT2 naming)
    ("nad83_florida_east_ftus", "2236"),
    ("nad83_florida_west_ftus", "2237"),
    ("nad83_florida_north_ftus", "2238"),
];

static SRS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(PROJCS|GEOGCS|PROJCRS|GEOGCRS)\["([^"]+)""#).expect("valid regex")
});

static DBF_LAST_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DBF_DATE_LAST_UPDATE=([0-9]{4}-[0-9]{2}-[0-9]{2})").expect("valid regex")
});

static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Za-z_][A-Za-z0-9_]*):\s+(?:Integer64|Integer|Real|String|Date(?:Time)?|Time|Binary)")
        .expect("valid regex")
});

/// Runs `ogrinfo -ro -al -so` on a shapefile and returns its stdout.
///
/// A missing `ogrinfo` binary or nonzero exit is logged and yields `None`;
/// metadata extraction degrades rather than failing the entity.
pub async fn summary(runner: &dyn Execute, shp_path: &Path) -> Option<String> {
    let work_dir = shp_path.parent().unwrap_or_else(|| Path::new("."));
    let argv = vec![
        "ogrinfo".to_string(),
        "-ro".to_string(),
        "-al".to_string(),
        "-so".to_string(),
        shp_path.display().to_string(),
    ];

    match runner.execute(&argv, work_dir).await {
        Ok(output) if output.success() => Some(output.stdout),
        Ok(output) => {
            log::warn!(
                "ogrinfo failed while reading {}: exit {}",
                shp_path.display(),
                output.exit_code
            );
            None
        }
        Err(e) => {
            log::warn!("ogrinfo failed while reading {}: {e}", shp_path.display());
            None
        }
    }
}

/// Extracts the first SRS keyword and quoted name from ogrinfo output.
#[must_use]
pub fn parse_srs_name(stdout: &str) -> Option<(String, String)> {
    SRS_NAME
        .captures(stdout)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

/// Maps an SRS name to an EPSG code via the curated table. The name is
/// canonicalized (lowercase, non-alphanumeric runs to underscores) before
/// lookup.
#[must_use]
pub fn epsg_for_srs_name(srs_name: &str) -> Option<&'static str> {
    let canonical = canonicalize(srs_name);
    NAME_TO_EPSG
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, epsg)| *epsg)
}

/// Extracts the `DBF_DATE_LAST_UPDATE` value from ogrinfo output.
#[must_use]
pub fn parse_dbf_last_update(stdout: &str) -> Option<NaiveDate> {
    DBF_LAST_UPDATE
        .captures(stdout)
        .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
}

/// Extracts attribute field names from ogrinfo's layer summary, used when
/// the DBF header cannot be read directly. Matches the `NAME: Type (w.p)`
/// lines ogrinfo prints after the geometry summary.
#[must_use]
pub fn parse_field_names(stdout: &str) -> Vec<String> {
    FIELD_LINE
        .captures_iter(stdout)
        .map(|c| c[1].to_string())
        .collect()
}

fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}
