#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog row types shared across the GIS pipeline.
//!
//! A [`CatalogRow`] is a read-only snapshot of one `m_gis_data_catalog_main`
//! record. The free-form `format` column is classified once into a
//! [`FormatKind`], which every downstream stage pattern-matches instead of
//! re-comparing format strings.

pub mod comments;

/// How a catalog row's data is acquired and treated by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// An ArcGIS REST service, extracted via the AGS tool
    /// (`ags`, `arcgis`, `esri`, `ags_extract`).
    ArcGisService,
    /// A direct file download, usually a zipped shapefile
    /// (`shp`, `zip`, `url`).
    ArchiveUrl,
    /// A document source that only yields provenance metadata (`pdf`).
    DocumentOnly,
    /// Anything else; the entity is not admitted to the pipeline.
    Excluded,
}

impl FormatKind {
    /// Classifies a raw catalog `format` value. Comparison is
    /// case-insensitive; `None` and empty strings are [`Self::Excluded`].
    #[must_use]
    pub fn classify(format: Option<&str>) -> Self {
        match format.unwrap_or("").to_lowercase().as_str() {
            "ags" | "arcgis" | "esri" | "ags_extract" => Self::ArcGisService,
            "shp" | "zip" | "url" => Self::ArchiveUrl,
            "pdf" => Self::DocumentOnly,
            _ => Self::Excluded,
        }
    }

    /// Whether the entity enters the pipeline at all.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        !matches!(self, Self::Excluded)
    }

    /// Whether the processing stage runs for this format.
    #[must_use]
    pub const fn runs_processing(self) -> bool {
        matches!(self, Self::ArcGisService | Self::ArchiveUrl)
    }
}

/// One row of the GIS data catalog, keyed by (layer, county, city).
///
/// All fields mirror nullable SQL columns; the pipeline treats missing and
/// empty values identically.
#[derive(Debug, Clone, Default)]
pub struct CatalogRow {
    /// Lowercased source format token (`ags`, `zip`, `pdf`, ...).
    pub format: Option<String>,
    /// Primary resource URL or handle for the downloader.
    pub resource: Option<String>,
    /// Fallback source URL column.
    pub src_url_file: Option<String>,
    /// Table identifier the AGS extractor uses to select its own config.
    pub table_name: Option<String>,
    /// Commands run between download and metadata extraction.
    pub source_comments: Option<String>,
    /// Commands run before the layer update script.
    pub processing_comments: Option<String>,
}

impl CatalogRow {
    /// The classified format of this row.
    #[must_use]
    pub fn format_kind(&self) -> FormatKind {
        FormatKind::classify(self.format.as_deref())
    }

    /// The lowercased raw format token, for log and skip messages.
    #[must_use]
    pub fn format_token(&self) -> String {
        self.format.as_deref().unwrap_or("").to_lowercase()
    }

    /// The download URL: `resource` with `src_url_file` as fallback.
    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        non_empty(self.resource.as_deref()).or_else(|| non_empty(self.src_url_file.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
