#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Identifier formatting for the GIS pipeline.
//!
//! The catalog stores *external* (human-readable) identifiers such as
//! `Miami-Dade`, `St. Lucie`, or `Future Land Use`, while the pipeline
//! operates on *internal* identifiers (`miami_dade`, `st_lucie`, `flu`).
//! [`format_name`] converts between the two forms; [`split_entity`] breaks
//! an entity identifier into its county and city parts.

use thiserror::Error;

/// Errors produced by identifier parsing.
#[derive(Debug, Error)]
pub enum NamingError {
    /// An entity string did not start with any known county.
    #[error("unable to parse county/city from entity '{entity}'")]
    UnknownCounty {
        /// The entity identifier that failed to parse.
        entity: String,
    },
}

/// What kind of identifier is being formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A layer identifier (`zoning`, `flu`, ...).
    Layer,
    /// A county identifier (`miami_dade`, `alachua`, ...).
    County,
    /// A city identifier (`gainesville`, `howey_in_the_hills`, ...).
    City,
}

/// Internal layer identifiers handled by the pipeline.
pub const LAYERS: &[&str] = &[
    "zoning",
    "flu",
    "flood_zones",
    "parcel_geo",
    "streets",
    "addr_pnts",
    "subdiv",
    "bldg_ftpr",
];

/// Florida counties in internal form. Multi-word counties keep their
/// underscores; [`split_entity`] matches the longest prefix first.
pub const COUNTIES: &[&str] = &[
    "miami_dade",
    "broward",
    "palm_beach",
    "hillsborough",
    "orange",
    "pinellas",
    "duval",
    "lee",
    "polk",
    "brevard",
    "volusia",
    "pasco",
    "seminole",
    "sarasota",
    "manatee",
    "collier",
    "osceola",
    "marion",
    "lake",
    "st_lucie",
    "escambia",
    "leon",
    "alachua",
    "st_johns",
    "clay",
    "okaloosa",
    "hernando",
    "bay",
    "charlotte",
    "santa_rosa",
    "martin",
    "indian_river",
    "citrus",
    "sumter",
    "flagler",
    "highlands",
    "nassau",
    "monroe",
    "putnam",
    "walton",
    "columbia",
    "gadsden",
    "suwannee",
    "jackson",
    "hendry",
    "okeechobee",
    "levy",
    "desoto",
    "wakulla",
    "baker",
    "bradford",
    "hardee",
    "washington",
    "taylor",
    "gilchrist",
    "gulf",
    "union",
    "hamilton",
    "jefferson",
    "lafayette",
    "liberty",
    "madison",
    "glades",
    "calhoun",
    "dixie",
    "franklin",
];

/// Layer abbreviations: internal -> external.
const LAYER_NAMES: &[(&str, &str)] = &[
    ("flu", "Future Land Use"),
    ("addr_pnts", "Address Points"),
    ("bldg_ftpr", "Building Footprints"),
    ("parcel_geo", "Parcel Geometry"),
    ("flood_zones", "Flood Zones"),
    ("subdiv", "Subdivisions"),
    ("streets", "Streets"),
    ("zoning", "Zoning"),
];

/// Irregular county spellings: internal -> external.
const COUNTY_NAMES: &[(&str, &str)] = &[
    ("miami_dade", "Miami-Dade"),
    ("desoto", "DeSoto"),
    ("st_johns", "St. Johns"),
    ("st_lucie", "St. Lucie"),
    ("santa_rosa", "Santa Rosa"),
    ("indian_river", "Indian River"),
    ("palm_beach", "Palm Beach"),
];

/// City tokens that denote a whole-county scope rather than a real city.
const SCOPE_TOKENS: &[&str] = &["unincorporated", "incorporated", "unified", "countywide"];

/// Words left lowercase in external form unless they lead the name.
const STOP_WORDS: &[&str] = &["of", "and", "in", "the", "on", "at", "by", "for", "with"];

/// Abbreviations that take a period in external form.
const ABBREVIATIONS: &[(&str, &str)] = &[("st", "St."), ("ft", "Ft."), ("mt", "Mt.")];

/// Converts a name between internal and external form.
///
/// `external = true` yields the human-readable catalog spelling;
/// `external = false` yields the lowercase underscore-delimited internal
/// spelling. The function is total: unknown names fall back to generic
/// case conversion.
#[must_use]
pub fn format_name(name: &str, kind: NameKind, external: bool) -> String {
    let name = name.trim();
    if name.is_empty() {
        return String::new();
    }

    let lower = name.to_lowercase();

    if external {
        match kind {
            NameKind::Layer => LAYER_NAMES
                .iter()
                .find(|(internal, _)| *internal == lower)
                .map_or_else(|| title_case(name), |(_, ext)| (*ext).to_string()),
            NameKind::County => COUNTY_NAMES
                .iter()
                .find(|(internal, _)| *internal == lower)
                .map_or_else(|| to_external(name), |(_, ext)| (*ext).to_string()),
            NameKind::City => {
                if SCOPE_TOKENS.contains(&lower.as_str()) {
                    title_case(&lower)
                } else {
                    to_external(name)
                }
            }
        }
    } else {
        match kind {
            NameKind::Layer => LAYER_NAMES
                .iter()
                .find(|(_, ext)| ext.to_lowercase() == lower)
                .map_or_else(
                    || lower.replace([' ', '-'], "_"),
                    |(internal, _)| (*internal).to_string(),
                ),
            NameKind::County => COUNTY_NAMES
                .iter()
                .find(|(_, ext)| ext.to_lowercase() == lower)
                .map_or_else(|| to_internal(name), |(internal, _)| (*internal).to_string()),
            NameKind::City => to_internal(name),
        }
    }
}

/// Splits an entity identifier into `(county, city)`.
///
/// Counties are matched longest-first so that `st_lucie_port_st_lucie`
/// resolves to county `st_lucie` rather than a hypothetical `st`. A bare
/// county yields an empty city.
///
/// # Errors
///
/// Returns [`NamingError::UnknownCounty`] if no county prefixes the entity.
pub fn split_entity(entity: &str) -> Result<(String, String), NamingError> {
    let mut counties: Vec<&str> = COUNTIES.to_vec();
    counties.sort_by_key(|c| std::cmp::Reverse(c.len()));

    for county in counties {
        if entity == county {
            return Ok(((*county).to_string(), String::new()));
        }
        let prefix = format!("{county}_");
        if let Some(city) = entity.strip_prefix(&prefix) {
            return Ok(((*county).to_string(), city.to_string()));
        }
    }

    Err(NamingError::UnknownCounty {
        entity: entity.to_string(),
    })
}

/// Joins internal county/city parts back into an entity identifier.
#[must_use]
pub fn join_entity(county: &str, city: &str) -> String {
    if city.is_empty() {
        county.to_string()
    } else {
        format!("{county}_{city}")
    }
}

/// Builds an internal entity identifier from raw catalog county/city values.
#[must_use]
pub fn entity_from_parts(county: &str, city: Option<&str>) -> String {
    let county_internal = format_name(county, NameKind::County, false);
    let city_internal = city.map_or_else(String::new, |c| format_name(c, NameKind::City, false));
    join_entity(&county_internal, &city_internal)
}

/// Internal -> external generic conversion: underscores to spaces, title
/// case with stop words, `st`/`ft`/`mt` abbreviated, and compound place
/// names (`howey_in_the_hills`) hyphenated.
fn to_external(name: &str) -> String {
    let spaced = name.replace('_', " ");

    let words: Vec<String> = spaced
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let word_lower = word.to_lowercase();
            if let Some((_, abbrev)) = ABBREVIATIONS.iter().find(|(short, _)| *short == word_lower)
            {
                (*abbrev).to_string()
            } else if i == 0 || !STOP_WORDS.contains(&word_lower.as_str()) {
                capitalize(word)
            } else {
                word_lower
            }
        })
        .collect();

    let result = words.join(" ");

    let result_lower = result.to_lowercase();
    if ["in the", "on the", "by the"]
        .iter()
        .any(|phrase| result_lower.contains(phrase))
    {
        result.replace(' ', "-")
    } else {
        result
    }
}

/// External -> internal generic conversion: lowercase, strip abbreviation
/// periods, non-alphanumeric runs to single underscores, trimmed.
fn to_internal(name: &str) -> String {
    let mut result = name.to_lowercase();
    result = result
        .replace("st.", "st")
        .replace("ft.", "ft")
        .replace("mt.", "mt");

    let mut out = String::with_capacity(result.len());
    let mut last_was_sep = false;
    for ch in result.chars() {
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

/// Uppercases the first character and lowercases the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
    })
}

/// Title-cases every alphabetic run (used for unknown layers and the
/// county-scope city tokens).
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn county_special_cases_round_trip() {
        for (internal, external) in COUNTY_NAMES {
            assert_eq!(
                format_name(internal, NameKind::County, true),
                *external,
                "{internal} external form"
            );
            assert_eq!(
                format_name(external, NameKind::County, false),
                *internal,
                "{external} internal form"
            );
        }
    }

    #[test]
    fn all_counties_round_trip() {
        for county in COUNTIES {
            let external = format_name(county, NameKind::County, true);
            assert_eq!(
                format_name(&external, NameKind::County, false),
                *county,
                "round trip through '{external}'"
            );
        }
    }

    #[test]
    fn all_layers_round_trip() {
        for layer in LAYERS {
            let external = format_name(layer, NameKind::Layer, true);
            assert_eq!(format_name(&external, NameKind::Layer, false), *layer);
        }
    }

    #[test]
    fn layer_abbreviations_expand() {
        assert_eq!(format_name("flu", NameKind::Layer, true), "Future Land Use");
        assert_eq!(
            format_name("addr_pnts", NameKind::Layer, true),
            "Address Points"
        );
        assert_eq!(
            format_name("Future Land Use", NameKind::Layer, false),
            "flu"
        );
    }

    #[test]
    fn compound_city_names_hyphenate() {
        assert_eq!(
            format_name("howey_in_the_hills", NameKind::City, true),
            "Howey-in-the-Hills"
        );
        assert_eq!(
            format_name("Howey-in-the-Hills", NameKind::City, false),
            "howey_in_the_hills"
        );
    }

    #[test]
    fn city_abbreviations_take_periods() {
        assert_eq!(format_name("st_cloud", NameKind::City, true), "St. Cloud");
        assert_eq!(
            format_name("ft_lauderdale", NameKind::City, true),
            "Ft. Lauderdale"
        );
        assert_eq!(format_name("St. Cloud", NameKind::City, false), "st_cloud");
    }

    #[test]
    fn scope_tokens_title_case() {
        assert_eq!(
            format_name("unincorporated", NameKind::City, true),
            "Unincorporated"
        );
        assert_eq!(format_name("unified", NameKind::City, true), "Unified");
    }

    #[test]
    fn stop_words_stay_lowercase() {
        assert_eq!(
            format_name("lake_of_the_woods", NameKind::City, true),
            "Lake of the Woods"
        );
    }

    #[test]
    fn empty_name_is_empty() {
        assert_eq!(format_name("", NameKind::City, true), "");
        assert_eq!(format_name("   ", NameKind::County, false), "");
    }

    #[test]
    fn splits_simple_entity() {
        let (county, city) = split_entity("alachua_gainesville").unwrap();
        assert_eq!(county, "alachua");
        assert_eq!(city, "gainesville");
    }

    #[test]
    fn splits_multi_word_county() {
        let (county, city) = split_entity("miami_dade_homestead").unwrap();
        assert_eq!(county, "miami_dade");
        assert_eq!(city, "homestead");

        let (county, city) = split_entity("st_lucie_port_st_lucie").unwrap();
        assert_eq!(county, "st_lucie");
        assert_eq!(city, "port_st_lucie");
    }

    #[test]
    fn splits_bare_county() {
        let (county, city) = split_entity("santa_rosa").unwrap();
        assert_eq!(county, "santa_rosa");
        assert_eq!(city, "");
    }

    #[test]
    fn split_rejects_unknown_county() {
        assert!(split_entity("atlantis_lost_city").is_err());
    }

    #[test]
    fn split_round_trips_joined_entities() {
        for county in COUNTIES {
            let entity = join_entity(county, "springfield");
            let (c, city) = split_entity(&entity).unwrap();
            assert_eq!(c, *county);
            assert_eq!(city, "springfield");
        }
    }

    #[test]
    fn entity_from_catalog_parts() {
        assert_eq!(
            entity_from_parts("Miami-Dade", Some("Homestead")),
            "miami_dade_homestead"
        );
        assert_eq!(entity_from_parts("Alachua", None), "alachua");
        assert_eq!(entity_from_parts("Duval", Some("")), "duval");
    }
}
