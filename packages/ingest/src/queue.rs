//! Processing-queue construction.
//!
//! The queue is the catalog-derived entity universe filtered through the
//! operator's patterns: literals are validated, wildcards expand against
//! the universe, duplicates collapse to their first occurrence, and
//! blacklisted entities are removed last.

use gis_pipeline_naming::COUNTIES;
use switchy_database::Database;

use crate::PipelineError;

/// Entities that must never be processed, regardless of catalog state.
const SKIP_ENTITIES: &[&str] = &["hillsborough_temple_terrace", "charlotte_punta_gorda"];

/// Builds the processing queue for `layer` from the catalog universe.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if the universe is empty with no
/// patterns supplied, if a literal pattern is unknown, or on a catalog
/// query failure.
pub async fn set_queue(
    db: &dyn Database,
    layer: &str,
    patterns: &[String],
) -> Result<Vec<String>, PipelineError> {
    log::info!(
        "Setting queue for layer '{layer}' and entities '{}'",
        if patterns.is_empty() {
            "all".to_string()
        } else {
            patterns.join(", ")
        }
    );

    let universe = gis_pipeline_catalog::gateway::fetch_entities(db, layer)
        .await
        .map_err(|e| PipelineError::Config {
            message: format!("entity universe query failed: {e}"),
        })?;

    build_queue(&universe, patterns)
}

/// Pure queue construction over a known universe.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] for an empty universe without
/// patterns, an invalid literal, or a malformed wildcard pattern.
pub fn build_queue(universe: &[String], patterns: &[String]) -> Result<Vec<String>, PipelineError> {
    if universe.is_empty() && patterns.is_empty() {
        return Err(PipelineError::Config {
            message: "no entities found in catalog and none supplied; cannot determine processing queue"
                .to_string(),
        });
    }

    let expanded = if patterns.is_empty() {
        let mut queue: Vec<String> = universe.to_vec();
        queue.sort();
        log::info!("No entities specified, queuing all {} entities", queue.len());
        queue
    } else {
        let invalid: Vec<&String> = patterns
            .iter()
            .filter(|p| {
                !is_wildcard(p)
                    && !universe.contains(p)
                    && !COUNTIES.contains(&p.as_str())
            })
            .collect();
        if !invalid.is_empty() {
            return Err(PipelineError::Config {
                message: format!("invalid entity/ies specified: {invalid:?}"),
            });
        }

        let mut sorted_universe: Vec<&String> = universe.iter().collect();
        sorted_universe.sort();

        let mut expanded = Vec::new();
        for pattern in patterns {
            if is_wildcard(pattern) {
                let matcher =
                    glob::Pattern::new(pattern).map_err(|e| PipelineError::Config {
                        message: format!("invalid pattern '{pattern}': {e}"),
                    })?;
                let matches: Vec<String> = sorted_universe
                    .iter()
                    .filter(|e| matcher.matches(e))
                    .map(|e| (*e).clone())
                    .collect();
                if matches.is_empty() {
                    log::warn!("Pattern '{pattern}' matched no entities; skipping");
                } else {
                    log::info!(
                        "Pattern '{pattern}' expanded to {} entities: {matches:?}",
                        matches.len()
                    );
                    expanded.extend(matches);
                }
            } else {
                expanded.push(pattern.clone());
            }
        }
        expanded
    };

    // Deduplicate preserving first occurrence.
    let mut queue = Vec::with_capacity(expanded.len());
    for entity in expanded {
        if !queue.contains(&entity) {
            queue.push(entity);
        }
    }

    let skipped: Vec<&String> = queue
        .iter()
        .filter(|e| SKIP_ENTITIES.contains(&e.as_str()))
        .collect();
    if !skipped.is_empty() {
        log::info!("Skipped {} blacklisted entities: {skipped:?}", skipped.len());
    }
    queue.retain(|e| !SKIP_ENTITIES.contains(&e.as_str()));

    Ok(queue)
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}
