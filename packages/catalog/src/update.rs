//! Dynamic catalog UPDATE statements.
//!
//! `publish_date` is always set — it records that the pipeline observed the
//! source today, even when nothing else changed (the NND case). Every other
//! column joins the SET clause only when the run actually produced a value,
//! in fixed declaration order, so partial runs make idempotent partial
//! updates.

use chrono::NaiveDate;
use gis_pipeline_naming::{NameKind, format_name};

/// One catalog row update, addressed by internal-form identifiers.
#[derive(Debug, Clone)]
pub struct CatalogUpdate {
    /// Internal layer identifier.
    pub layer: String,
    /// Internal county identifier.
    pub county: String,
    /// Internal city identifier (may be empty).
    pub city: String,
    /// The run date; always written.
    pub publish_date: NaiveDate,
    /// Resolved data date (`YYYY-MM-DD`), if any.
    pub data_date: Option<String>,
    /// Resolved EPSG code, if any.
    pub epsg: Option<String>,
    /// Primary artifact base filename, if any.
    pub raw_file: Option<String>,
    /// JSON-encoded attribute names, if any.
    pub field_names: Option<String>,
    /// Newest zip archive basename; callers populate this only for
    /// non-ArcGIS formats.
    pub raw_zip: Option<String>,
}

impl CatalogUpdate {
    /// Creates an update that only refreshes `publish_date` (the NND path).
    #[must_use]
    pub fn publish_only(layer: &str, county: &str, city: &str, publish_date: NaiveDate) -> Self {
        Self {
            layer: layer.to_string(),
            county: county.to_string(),
            city: city.to_string(),
            publish_date,
            data_date: None,
            epsg: None,
            raw_file: None,
            field_names: None,
            raw_zip: None,
        }
    }

    /// Renders the UPDATE statement. Identifier values are converted to
    /// external form for the WHERE clause.
    #[must_use]
    pub fn sql(&self) -> String {
        let mut set_clauses = vec![format!(
            "publish_date = '{}'",
            self.publish_date.format("%Y-%m-%d")
        )];

        for (column, value) in [
            ("data_date", &self.data_date),
            ("srs_epsg", &self.epsg),
            ("sys_raw_file", &self.raw_file),
            ("field_names", &self.field_names),
            ("sys_raw_file_zip", &self.raw_zip),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                set_clauses.push(format!("{column} = '{}'", escape(value)));
            }
        }

        format!(
            "UPDATE m_gis_data_catalog_main SET {} WHERE layer_subgroup = '{}' AND county = '{}' AND city = '{}';",
            set_clauses.join(", "),
            escape(&format_name(&self.layer, NameKind::Layer, true)),
            escape(&format_name(&self.county, NameKind::County, true)),
            escape(&format_name(&self.city, NameKind::City, true)),
        )
    }

    /// The `psql` invocation that executes this update.
    #[must_use]
    pub fn psql_argv(&self) -> Vec<String> {
        vec![
            "psql".to_string(),
            "-d".to_string(),
            "gisdev".to_string(),
            "-U".to_string(),
            "postgres".to_string(),
            "-c".to_string(),
            self.sql(),
        ]
    }
}

/// Doubles single quotes for SQL string literals.
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}
