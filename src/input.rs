//! Species description input
//!
//! Accepts the tab-separated output of the description extractor (header
//! row with `description` and optional `coreid` / `type` columns) or a JSON
//! array of `{"id": ..., "description": ...}` objects.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One species description, optionally with its taxon id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    #[serde(default, alias = "coreid")]
    pub id: Option<String>,
    pub description: String,
}

impl Species {
    pub fn new(id: Option<&str>, description: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            description: description.to_string(),
        }
    }

    /// Id used when a species must be named (tabulation)
    pub fn label(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("sp{}", index + 1))
    }
}

/// Load descriptions, keeping only rows of `desc_type` when given
pub fn load(path: &Path, desc_type: Option<&str>) -> Result<Vec<Species>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read description file {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let species = if is_json {
        if desc_type.is_some() {
            log::warn!("--desctype is ignored for JSON input");
        }
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        parse_tsv(&content, desc_type).with_context(|| format!("Failed to parse {}", path.display()))?
    };

    log::info!("Loaded {} descriptions from {}", species.len(), path.display());
    Ok(species)
}

fn parse_tsv(content: &str, desc_type: Option<&str>) -> Result<Vec<Species>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header = reader.headers().context("Failed to read header row")?.clone();
    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let desc_col = column("description").ok_or_else(|| eyre::eyre!("Missing 'description' column in header"))?;
    let id_col = column("coreid");
    let type_col = column("type");

    if desc_type.is_some() && type_col.is_none() {
        eyre::bail!("--desctype given but the file has no 'type' column");
    }

    let mut species = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed row {}", index + 1))?;
        let Some(description) = record.get(desc_col) else {
            log::warn!("Skipping row {}: only {} fields", index + 1, record.len());
            continue;
        };

        if let (Some(wanted), Some(col)) = (desc_type, type_col)
            && record.get(col).map(str::trim) != Some(wanted)
        {
            continue;
        }

        let id = id_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|s| !s.is_empty());

        species.push(Species::new(id, description.trim()));
    }

    Ok(species)
}

/// Apply the start offset and optional count limit
pub fn slice(species: Vec<Species>, start: usize, limit: Option<usize>) -> Vec<Species> {
    let iter = species.into_iter().skip(start);
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TSV: &str = "coreid\ttype\tdescription\n\
                       wfo-1\tmorphology\tShrub to 2 m.\n\
                       wfo-1\tdistribution\tEast Africa.\n\
                       wfo-2\tmorphology\tTree; leaves ovate.\n";

    #[test]
    fn test_parse_tsv_filters_type() {
        let species = parse_tsv(TSV, Some("morphology")).unwrap();
        assert_eq!(species.len(), 2);
        assert_eq!(species[0], Species::new(Some("wfo-1"), "Shrub to 2 m."));
        assert_eq!(species[1].id.as_deref(), Some("wfo-2"));
    }

    #[test]
    fn test_parse_tsv_without_filter() {
        assert_eq!(parse_tsv(TSV, None).unwrap().len(), 3);
    }

    #[test]
    fn test_parse_tsv_unquotes_fields() {
        let tsv = "coreid\ttype\tdescription\n\
                   wfo-1\tmorphology\t\"Leaves 2\"\" long, \"\"ovate\"\".\"\n";
        let species = parse_tsv(tsv, None).unwrap();
        assert_eq!(species.len(), 1);
        assert_eq!(species[0].description, r#"Leaves 2" long, "ovate"."#);
    }

    #[test]
    fn test_parse_tsv_keeps_multiline_field() {
        let tsv = "coreid\tdescription\nwfo-1\t\"Shrub.\nLeaves ovate.\"\nwfo-2\tTree.\n";
        let species = parse_tsv(tsv, None).unwrap();
        assert_eq!(species.len(), 2);
        assert_eq!(species[0].description, "Shrub.\nLeaves ovate.");
        assert_eq!(species[1], Species::new(Some("wfo-2"), "Tree."));
    }

    #[test]
    fn test_parse_tsv_requires_description_column() {
        assert!(parse_tsv("coreid\ttext\n1\tfoo\n", None).is_err());
        assert!(parse_tsv("", None).is_err());
    }

    #[test]
    fn test_parse_tsv_desctype_without_type_column() {
        assert!(parse_tsv("description\nfoo\n", Some("morphology")).is_err());
    }

    #[test]
    fn test_load_json() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("descs.json");
        fs::write(&path, r#"[{"id": "a", "description": "Herb."}, {"description": "Tree."}]"#).unwrap();

        let species = load(&path, None).unwrap();
        assert_eq!(species.len(), 2);
        assert_eq!(species[1].id, None);
        assert_eq!(species[1].label(1), "sp2");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load(Path::new("/nonexistent/descs.tsv"), None).is_err());
    }

    #[test]
    fn test_slice() {
        let species: Vec<Species> = (0..5).map(|i| Species::new(None, &i.to_string())).collect();
        let sliced = slice(species.clone(), 1, Some(2));
        assert_eq!(sliced.iter().map(|s| s.description.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(slice(species, 3, None).len(), 2);
    }
}
