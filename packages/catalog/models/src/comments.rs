//! Parsing for operator-supplied command lists stored in catalog rows.
//!
//! Both `source_comments` and `processing_comments` hold a list of shell
//! commands in one of several historical encodings. The canonical form is
//! bracketed (`[cmd1] [cmd2]`); JSON arrays and the legacy separators are
//! still accepted.

use std::sync::LazyLock;

use regex::Regex;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid regex"));

/// Extracts commands from bracketed or JSON-array text. Returns `None` if
/// neither encoding matches.
fn parse_structured(text: &str) -> Option<Vec<String>> {
    let commands: Vec<String> = BRACKETED
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if !commands.is_empty() {
        return Some(commands);
    }

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(text) {
        let commands: Vec<String> = items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|c| !c.is_empty())
            .collect();
        return Some(commands);
    }

    None
}

/// Parses a `processing_comments` value: bracketed, then JSON array, then
/// the legacy semicolon/newline separators.
#[must_use]
pub fn parse_processing_comments(text: Option<&str>) -> Vec<String> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Vec::new();
    };

    if let Some(commands) = parse_structured(text) {
        return commands;
    }

    text.split(['\n', ';'])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses a `source_comments` value: bracketed, then JSON array, then the
/// legacy pipe separator.
#[must_use]
pub fn parse_source_comments(text: Option<&str>) -> Vec<String> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Vec::new();
    };

    if let Some(commands) = parse_structured(text) {
        return commands;
    }

    text.split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_commands() {
        let commands = parse_processing_comments(Some("[unzip -o data.zip] [mv a.shp b.shp]"));
        assert_eq!(commands, vec!["unzip -o data.zip", "mv a.shp b.shp"]);
    }

    #[test]
    fn parses_json_array() {
        let commands = parse_processing_comments(Some(r#"["unzip -o data.zip", "ogr2ogr out in"]"#));
        assert_eq!(commands, vec!["unzip -o data.zip", "ogr2ogr out in"]);
    }

    #[test]
    fn parses_legacy_semicolons_and_newlines() {
        let commands = parse_processing_comments(Some("unzip -o data.zip; mv a b\nzip out a"));
        assert_eq!(commands, vec!["unzip -o data.zip", "mv a b", "zip out a"]);
    }

    #[test]
    fn source_comments_fall_back_to_pipes() {
        let commands = parse_source_comments(Some("rm -f stale.shp | unzip -o data.zip"));
        assert_eq!(commands, vec!["rm -f stale.shp", "unzip -o data.zip"]);
    }

    #[test]
    fn empty_and_missing_yield_nothing() {
        assert!(parse_processing_comments(None).is_empty());
        assert!(parse_processing_comments(Some("   ")).is_empty());
        assert!(parse_source_comments(None).is_empty());
    }

    #[test]
    fn bracketed_encoding_round_trips() {
        let original = vec![
            "unzip -o data.zip".to_string(),
            "zip_rename_date.sh".to_string(),
            "ogr2ogr -f GeoJSON out.geojson in.shp".to_string(),
        ];
        let text = original
            .iter()
            .map(|c| format!("[{c}]"))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(parse_processing_comments(Some(&text)), original);
        assert_eq!(parse_source_comments(Some(&text)), original);
    }
}
