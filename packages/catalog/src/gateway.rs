//! Read-only catalog queries.
//!
//! The catalog stores external-form identifiers (`Miami-Dade`, `Future
//! Land Use`); both lookups convert from the pipeline's internal form
//! before querying and back after.

use gis_pipeline_catalog_models::CatalogRow;
use gis_pipeline_naming::{NameKind, entity_from_parts, format_name};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::CatalogError;

/// Fetches the catalog row for (layer, county, city), all in internal form.
///
/// Returns `Ok(None)` when no row exists; callers decide whether that is
/// fatal (a queued entity without a catalog row is configuration drift).
///
/// # Errors
///
/// Returns [`CatalogError`] if the query fails.
pub async fn fetch_row(
    db: &dyn Database,
    layer: &str,
    county: &str,
    city: &str,
) -> Result<Option<CatalogRow>, CatalogError> {
    let layer_external = format_name(layer, NameKind::Layer, true);
    let county_external = format_name(county, NameKind::County, true);
    let city_external = format_name(city, NameKind::City, true);

    let rows = db
        .query_raw_params(
            "SELECT format, resource, src_url_file, table_name,
                    source_comments, processing_comments
             FROM m_gis_data_catalog_main
             WHERE lower(layer_subgroup) = $1
               AND lower(county) = $2
               AND lower(city) = $3
             LIMIT 1",
            &[
                DatabaseValue::String(layer_external.to_lowercase()),
                DatabaseValue::String(county_external.to_lowercase()),
                DatabaseValue::String(city_external.to_lowercase()),
            ],
        )
        .await?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let format: Option<String> = row.to_value("format").unwrap_or(None);
    let resource: Option<String> = row.to_value("resource").unwrap_or(None);
    let src_url_file: Option<String> = row.to_value("src_url_file").unwrap_or(None);
    let table_name: Option<String> = row.to_value("table_name").unwrap_or(None);
    let source_comments: Option<String> = row.to_value("source_comments").unwrap_or(None);
    let processing_comments: Option<String> = row.to_value("processing_comments").unwrap_or(None);

    Ok(Some(CatalogRow {
        format,
        resource,
        src_url_file,
        table_name,
        source_comments,
        processing_comments,
    }))
}

/// Fetches the entity universe for a layer: every catalog row whose status
/// is not `DELETE`, as internal entity identifiers, deduplicated in query
/// order.
///
/// # Errors
///
/// Returns [`CatalogError`] if the query fails.
pub async fn fetch_entities(db: &dyn Database, layer: &str) -> Result<Vec<String>, CatalogError> {
    let layer_external = format_name(layer, NameKind::Layer, true);

    let rows = db
        .query_raw_params(
            "SELECT county, city FROM m_gis_data_catalog_main
             WHERE status IS DISTINCT FROM 'DELETE'
               AND lower(layer_subgroup) = $1",
            &[DatabaseValue::String(layer_external.to_lowercase())],
        )
        .await?;

    let mut entities = Vec::with_capacity(rows.len());
    for row in &rows {
        let county: Option<String> = row.to_value("county").unwrap_or(None);
        let city: Option<String> = row.to_value("city").unwrap_or(None);

        let Some(county) = county.filter(|c| !c.trim().is_empty()) else {
            log::warn!("Catalog row for layer '{layer}' has no county; skipping");
            continue;
        };

        let entity = entity_from_parts(&county, city.as_deref());
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }

    Ok(entities)
}
