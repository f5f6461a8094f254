//! On-disk label sources: ID→name tables and dataset class lists.

use crate::config::LabelsConfig;
use crate::constants::labels::{ID_MAP_CANDIDATES, METADATA_CANDIDATES};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered label sources for one resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSources {
    /// ID→name tables, highest precedence first.
    pub id_tables: Vec<PathBuf>,
    /// Dataset metadata class lists, in order.
    pub metadata: Vec<PathBuf>,
    /// Namespace for placeholder names.
    pub namespace: String,
}

impl LabelSources {
    /// Collect sources from configuration and from well-known file names
    /// in `base_dir` (usually the species model's directory).
    ///
    /// Explicitly configured paths are always listed so a missing file gets
    /// reported; well-known candidates are listed only when they exist.
    pub fn discover(base_dir: Option<&Path>, config: &LabelsConfig) -> Self {
        let mut id_tables: Vec<PathBuf> = config.id_map.iter().cloned().collect();
        let mut metadata = config.metadata.clone();

        if let Some(dir) = base_dir {
            push_existing(&mut id_tables, dir, ID_MAP_CANDIDATES);
            push_existing(&mut metadata, dir, METADATA_CANDIDATES);
        }

        debug!(
            "Label sources: {} ID table(s), {} metadata file(s)",
            id_tables.len(),
            metadata.len()
        );

        Self {
            id_tables,
            metadata,
            namespace: config.namespace.clone(),
        }
    }
}

fn push_existing(list: &mut Vec<PathBuf>, dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        if path.is_file() && !list.contains(&path) {
            list.push(path);
        }
    }
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
}

fn parse_error(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::LabelSourceParse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::LabelSourceRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read an ID→name table as `(id, name)` pairs in file order.
///
/// `.json` files hold one object mapping ids to names (or to objects with a
/// `name` field). Anything else is read as CSV, or TSV when the extension is
/// `.tsv` or the first line contains a tab; the first row is skipped when
/// its id column is not numeric.
pub fn read_id_table(path: &Path) -> Result<Vec<(String, String)>> {
    let text = read_text(path)?;

    if has_extension(path, &["json"]) {
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| parse_error(path, e))?;
        let object = value
            .as_object()
            .ok_or_else(|| parse_error(path, "expected a JSON object of id to name"))?;

        return Ok(object
            .iter()
            .filter_map(|(id, entry)| {
                let name = match entry {
                    serde_json::Value::String(name) => Some(name.as_str()),
                    serde_json::Value::Object(fields) => {
                        fields.get("name").and_then(serde_json::Value::as_str)
                    }
                    _ => None,
                }?;
                Some((id.trim().to_string(), name.trim().to_string()))
            })
            .collect());
    }

    let tab_separated =
        has_extension(path, &["tsv"]) || text.lines().next().is_some_and(|l| l.contains('\t'));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(if tab_separated { b'\t' } else { b',' })
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| parse_error(path, e))?;
        let (Some(id), Some(name)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if index == 0 && !super::is_numeric(id) {
            debug!("Skipping header row in {}", path.display());
            continue;
        }
        if !id.is_empty() && !name.is_empty() {
            rows.push((id.to_string(), name.to_string()));
        }
    }
    Ok(rows)
}

/// Read a dataset class list as `(index, name)` pairs.
///
/// `.yaml`/`.yml` and `.json` files carry a `names` key holding a list or an
/// index→name map (a bare JSON list is accepted too). Any other file is
/// plain text with one class per non-empty line.
pub fn read_class_list(path: &Path) -> Result<Vec<(usize, String)>> {
    let text = read_text(path)?;

    if has_extension(path, &["yaml", "yml"]) {
        let value: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|e| parse_error(path, e))?;
        return yaml_names(&value).ok_or_else(|| parse_error(path, "no 'names' list or map"));
    }

    if has_extension(path, &["json"]) {
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| parse_error(path, e))?;
        return json_names(&value).ok_or_else(|| parse_error(path, "no 'names' list or map"));
    }

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .enumerate()
        .collect())
}

fn yaml_names(value: &serde_yaml::Value) -> Option<Vec<(usize, String)>> {
    use serde_yaml::Value;

    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    match value.get("names")? {
        Value::Sequence(items) => Some(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| scalar(v).map(|name| (i, name)))
                .collect(),
        ),
        Value::Mapping(map) => Some(
            map.iter()
                .filter_map(|(k, v)| {
                    let index = match k {
                        Value::Number(n) => usize::try_from(n.as_u64()?).ok(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    }?;
                    Some((index, scalar(v)?))
                })
                .collect(),
        ),
        _ => None,
    }
}

fn json_names(value: &serde_json::Value) -> Option<Vec<(usize, String)>> {
    use serde_json::Value;

    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    let names = match value {
        Value::Array(_) => value,
        _ => value.get("names")?,
    };

    match names {
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| scalar(v).map(|name| (i, name)))
                .collect(),
        ),
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(k, v)| Some((k.trim().parse().ok()?, scalar(v)?)))
                .collect(),
        ),
        _ => None,
    }
}
