//! Work-directory resolution.
//!
//! Each (layer, entity) maps to a canonical directory under the data root
//! where the downloader deposits files and every later stage operates.
//! Templates live in data, not code; a small override table handles
//! irregular entities and takes precedence over templates.

use std::path::{Path, PathBuf};

use gis_pipeline_naming::split_entity;

use crate::PipelineError;

/// Default root of the layer data trees.
pub const DEFAULT_DATA_ROOT: &str = "/srv/datascrub";

/// Per-layer path templates relative to the data root. `{county}` and
/// `{city}` are substituted with the internal-form identifiers.
const WORK_DIR_TEMPLATES: &[(&str, &str)] = &[
    (
        "zoning",
        "08_Land_Use_and_Zoning/zoning/florida/county/{county}/current/source_data/{city}",
    ),
    (
        "flu",
        "08_Land_Use_and_Zoning/future_land_use/florida/county/{county}/current/source_data/{city}",
    ),
];

/// Fallback template for layers without a dedicated tree.
const GENERIC_TEMPLATE: &str = "{layer}/{county}/{city}";

/// Hard-coded overrides for irregular entities: (layer, entity) maps to
/// (path, county, city). Duval's "unified" zoning is the consolidated
/// Jacksonville city-county government.
const WORK_DIR_OVERRIDES: &[(&str, &str, &str, &str, &str)] = &[(
    "zoning",
    "duval_unified",
    "08_Land_Use_and_Zoning/zoning/florida/county/duval/current/source_data/jacksonville",
    "duval",
    "jacksonville",
)];

/// Resolves the work directory plus county/city parts for an entity.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if the entity does not start with a
/// known county.
pub fn resolve_work_dir(
    data_root: &Path,
    layer: &str,
    entity: &str,
) -> Result<(PathBuf, String, String), PipelineError> {
    if let Some((_, _, path, county, city)) = WORK_DIR_OVERRIDES
        .iter()
        .find(|(l, e, _, _, _)| *l == layer && *e == entity)
    {
        return Ok((
            data_root.join(path),
            (*county).to_string(),
            (*city).to_string(),
        ));
    }

    let template = WORK_DIR_TEMPLATES
        .iter()
        .find(|(l, _)| *l == layer)
        .map_or(GENERIC_TEMPLATE, |(_, t)| *t);

    let (county, city) = if template.contains("{city}") {
        split_entity(entity).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })?
    } else {
        (entity.to_string(), String::new())
    };

    let rendered = template
        .replace("{layer}", layer)
        .replace("{county}", &county)
        .replace("{city}", &city);

    Ok((data_root.join(rendered), county, city))
}
