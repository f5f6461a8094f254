//! Label resolution: raw classifier output to display names.
//!
//! Species classifiers often emit opaque numeric taxonomy ids, padded or not.
//! The resolver merges ID tables and dataset class lists into one lookup
//! table at load time and formats raw labels through it.
//!
//! Precedence: ID tables win for numeric keys. Dataset class lists only fill
//! keys that are still absent, and a class list entry that is itself a
//! numeric id is named through the ID tables.

mod sources;

pub use sources::{LabelSources, read_class_list, read_id_table};

use crate::constants::labels::{MAX_CLASS_INDEX, PADDED_WIDTH};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Whether `label` is a non-empty run of ASCII digits.
pub fn is_numeric(label: &str) -> bool {
    !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric id without leading zeros (`"0"` for all zeros).
fn canonical(id: &str) -> &str {
    let stripped = id.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

/// Every key form a numeric id is stored under: as given, canonical and
/// zero-padded. Non-numeric keys have a single form.
pub fn key_forms(key: &str) -> Vec<String> {
    if !is_numeric(key) {
        return vec![key.to_string()];
    }

    let canonical = canonical(key);
    let mut forms = vec![key.to_string()];
    for form in [
        canonical.to_string(),
        format!("{canonical:0>width$}", width = PADDED_WIDTH),
    ] {
        if !forms.contains(&form) {
            forms.push(form);
        }
    }
    forms
}

/// Names by class index from `(index, name)` pairs.
///
/// Gaps are filled with the index itself. Indices at or above
/// [`MAX_CLASS_INDEX`] are dropped with a warning.
pub fn dense_class_names(entries: Vec<(usize, String)>) -> Vec<String> {
    let (kept, dropped): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(index, _)| *index < MAX_CLASS_INDEX);
    if let Some((index, _)) = dropped.first() {
        warn!(
            "Ignoring {} class name(s) with out-of-range index (first: {index})",
            dropped.len()
        );
    }

    let len = kept.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
    let mut names: Vec<String> = (0..len).map(|i| i.to_string()).collect();
    for (index, name) in kept {
        names[index] = name;
    }
    names
}

fn display_form(name: &str) -> String {
    name.trim().replace('_', " ")
}

/// Immutable key → display-name table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: HashMap<String, String>,
}

impl LabelMap {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every form of `key` to `name`, keeping existing entries.
    pub fn insert_if_absent(&mut self, key: &str, name: &str) {
        let name = display_form(name);
        for form in key_forms(key.trim()) {
            self.entries.entry(form).or_insert_with(|| name.clone());
        }
    }

    /// Look up an exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of stored keys (all forms counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add_id_table(&mut self, rows: &[(String, String)]) {
        for (id, name) in rows {
            self.insert_if_absent(id, name);
        }
    }

    fn add_class_list(&mut self, classes: &[(usize, String)]) {
        for (index, name) in classes {
            let index = index.to_string();
            if is_numeric(name) {
                let named = self
                    .get(name)
                    .or_else(|| self.get(canonical(name)))
                    .filter(|n| !is_numeric(n))
                    .map(str::to_string);
                if let Some(named) = named {
                    self.insert_if_absent(&index, &named);
                }
            } else {
                self.insert_if_absent(&index, name);
                self.insert_if_absent(name, name);
            }
        }
    }
}

/// Formats raw classifier labels into stable display names.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    map: LabelMap,
    namespace: String,
}

impl LabelResolver {
    /// Resolver over an already built table.
    pub fn new(map: LabelMap, namespace: impl Into<String>) -> Self {
        Self {
            map,
            namespace: namespace.into(),
        }
    }

    /// Build the lookup table from `sources`.
    ///
    /// Never fails: sources that cannot be read or parsed are logged and
    /// skipped, leaving a resolver that falls back to placeholders.
    pub fn build(sources: &LabelSources) -> Self {
        let mut map = LabelMap::new();

        for path in &sources.id_tables {
            match read_id_table(path) {
                Ok(rows) => {
                    debug!("Loaded {} id(s) from {}", rows.len(), path.display());
                    map.add_id_table(&rows);
                }
                Err(e) => warn!("Skipping ID table: {e}"),
            }
        }

        for path in &sources.metadata {
            match read_class_list(path) {
                Ok(classes) => {
                    debug!("Loaded {} class(es) from {}", classes.len(), path.display());
                    map.add_class_list(&classes);
                }
                Err(e) => warn!("Skipping label metadata: {e}"),
            }
        }

        info!("Label resolver ready with {} key(s)", map.len());
        Self::new(map, sources.namespace.clone())
    }

    /// Display name for a raw classifier label.
    ///
    /// Non-numeric labels are returned with underscores turned into spaces.
    /// Numeric labels are looked up as given, then without leading zeros;
    /// unresolved ones become `"<namespace> Class <raw>"`.
    pub fn format(&self, raw_label: &str) -> String {
        let raw = raw_label.trim();
        if !is_numeric(raw) {
            return display_form(raw);
        }

        self.map
            .get(raw)
            .or_else(|| self.map.get(canonical(raw)))
            .filter(|name| !is_numeric(name))
            .map_or_else(
                || format!("{} Class {raw}", self.namespace),
                str::to_string,
            )
    }

    /// The underlying table.
    pub const fn map(&self) -> &LabelMap {
        &self.map
    }

    /// Placeholder namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn resolver_with(ids: &[(&str, &str)]) -> LabelResolver {
        let mut map = LabelMap::new();
        for (id, name) in ids {
            map.insert_if_absent(id, name);
        }
        LabelResolver::new(map, "Species")
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_dense_class_names_fills_gaps() {
        let names = dense_class_names(vec![(2, "Merlin".to_string()), (0, "Osprey".to_string())]);
        assert_eq!(names, ["Osprey", "1", "Merlin"]);
        assert!(dense_class_names(Vec::new()).is_empty());
    }

    #[test]
    fn test_dense_class_names_ignores_huge_indices() {
        let names = dense_class_names(vec![
            (4_000_000_000, "Harpy Eagle".to_string()),
            (1, "Kestrel".to_string()),
        ]);
        assert_eq!(names, ["0", "Kestrel"]);
    }

    #[test]
    fn test_key_forms() {
        let cases: [(&str, &[&str]); 5] = [
            ("42", &["42", "0042"]),
            ("0042", &["0042", "42"]),
            ("000", &["000", "0", "0000"]),
            ("12345", &["12345"]),
            ("Osprey", &["Osprey"]),
        ];
        for (key, expected) in cases {
            assert_eq!(key_forms(key), expected.to_vec(), "key {key}");
        }
    }

    #[test]
    fn test_padding_styles_resolve_identically() {
        let resolver = resolver_with(&[("42", "Red-tailed Hawk")]);
        assert_eq!(resolver.format("0042"), "Red-tailed Hawk");
        assert_eq!(resolver.format("42"), "Red-tailed Hawk");
        assert_eq!(resolver.format("00042"), "Red-tailed Hawk");

        let padded = resolver_with(&[("0042", "Red-tailed Hawk")]);
        assert_eq!(padded.format("42"), padded.format("0042"));
    }

    #[test]
    fn test_unmapped_numeric_label_gets_placeholder() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.format("0999"), "Species Class 0999");

        let custom = LabelResolver::new(LabelMap::new(), "Raptor");
        assert_eq!(custom.format("7"), "Raptor Class 7");
    }

    #[test]
    fn test_non_numeric_labels_pass_through() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.format("Cooper's_Hawk"), "Cooper's Hawk");
        assert_eq!(resolver.format("Accipiter cooperii"), "Accipiter cooperii");
    }

    #[test]
    fn test_format_is_idempotent() {
        let resolver = resolver_with(&[("42", "Red_tailed Hawk")]);
        for raw in ["0042", "0999", "Cooper_Hawk", "", "12a"] {
            let once = resolver.format(raw);
            assert_eq!(resolver.format(&once), once, "raw {raw:?}");
            assert_eq!(resolver.format(raw), once);
        }
    }

    #[test]
    fn test_numeric_mapping_value_is_not_a_name() {
        let resolver = resolver_with(&[("5", "0042")]);
        assert_eq!(resolver.format("5"), "Species Class 5");
    }

    #[test]
    fn test_build_id_table_wins_over_metadata() {
        let dir = tempdir().unwrap();
        let ids = write(dir.path(), "id_to_name.json", r#"{"1": "Red-tailed Hawk"}"#);
        let meta = write(dir.path(), "labels.txt", "Osprey\nMerlin\nKestrel\n");

        let resolver = LabelResolver::build(&LabelSources {
            id_tables: vec![ids],
            metadata: vec![meta],
            namespace: "Species".to_string(),
        });

        assert_eq!(resolver.format("1"), "Red-tailed Hawk");
        assert_eq!(resolver.format("0"), "Osprey");
        assert_eq!(resolver.format("0002"), "Kestrel");
        assert_eq!(resolver.format("3"), "Species Class 3");
    }

    #[test]
    fn test_build_maps_numeric_metadata_through_id_table() {
        let dir = tempdir().unwrap();
        let ids = write(dir.path(), "taxonomy.csv", "id,name\n42,Red-tailed Hawk\n");
        let meta = write(dir.path(), "data.yaml", "names: ['0042', '0777']\n");

        let resolver = LabelResolver::build(&LabelSources {
            id_tables: vec![ids],
            metadata: vec![meta],
            namespace: "Species".to_string(),
        });

        assert_eq!(resolver.format("0"), "Red-tailed Hawk");
        assert_eq!(resolver.format("1"), "Species Class 1");
        assert_eq!(resolver.format("0777"), "Species Class 0777");
    }

    #[test]
    fn test_build_skips_unreadable_sources() {
        let dir = tempdir().unwrap();
        let broken = write(dir.path(), "id_to_name.json", "{not json");

        let resolver = LabelResolver::build(&LabelSources {
            id_tables: vec![broken, dir.path().join("missing.csv")],
            metadata: vec![dir.path().join("missing.yaml")],
            namespace: "Species".to_string(),
        });

        assert!(resolver.map().is_empty());
        assert_eq!(resolver.format("0042"), "Species Class 0042");
    }
}
