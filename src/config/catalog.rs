//! Model catalog loading.
//!
//! The catalog is a pipe-separated file with one row per model. Only three
//! columns matter: the first (model identifier) and the last two (favourite
//! flag, description). Everything in between is free to change shape, so
//! parsing anchors on the ends of each row instead of on column positions.
//!
//! ```text
//! model|context|price_in|price_out|favourite|description
//! openai/gpt-4o|128000|2.50|10.00|yes|Strong general model
//! ```
//!
//! The catalog is an enrichment. A missing or unreadable file yields an
//! empty catalog and the gateway keeps working without descriptions.

use std::collections::HashMap;
use std::path::Path;

/// Descriptive metadata for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub model_id: String,
    pub favourite: bool,
    pub description: String,
}

/// Identifier → [`ModelMeta`], in file order.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<ModelMeta>,
    index: HashMap<String, usize>,
}

impl ModelCatalog {
    /// Load the catalog from `path`.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let catalog = Self::parse(&text);
                tracing::debug!(
                    path = %path.display(),
                    entries = catalog.len(),
                    "loaded model catalog"
                );
                catalog
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no model catalog found");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read model catalog, continuing without it"
                );
                Self::default()
            }
        }
    }

    /// Parse catalog text.
    ///
    /// Blank lines, the header row (first column `model`) and rows with
    /// fewer than three columns are skipped. A repeated identifier replaces
    /// the earlier row but keeps its position.
    pub fn parse(text: &str) -> Self {
        let mut catalog = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split('|').collect();
            let [model_id, .., flag, description] = parts.as_slice() else {
                continue;
            };
            if *model_id == "model" {
                continue;
            }

            catalog.insert(ModelMeta {
                model_id: (*model_id).to_string(),
                favourite: flag.eq_ignore_ascii_case("yes"),
                description: (*description).to_string(),
            });
        }

        catalog
    }

    fn insert(&mut self, meta: ModelMeta) {
        match self.index.get(&meta.model_id) {
            Some(&pos) => self.entries[pos] = meta,
            None => {
                self.index.insert(meta.model_id.clone(), self.entries.len());
                self.entries.push(meta);
            }
        }
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelMeta> {
        self.index.get(model_id).map(|&pos| &self.entries[pos])
    }

    /// Non-empty description for `model_id`, if the catalog has one.
    pub fn description(&self, model_id: &str) -> Option<&str> {
        self.get(model_id)
            .map(|meta| meta.description.as_str())
            .filter(|d| !d.is_empty())
    }

    /// Identifiers flagged as favourites, in file order.
    pub fn favourites(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|meta| meta.favourite)
            .map(|meta| meta.model_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PSV: &str = "\
model|context|tok_sec|price_in|price_out|aa_index|arena_elo|swe_bench|gpqa|favourite|description
gemini/gemini-test|1000000|91|2.00|12.00|57|1500|80.6|94.3|yes|Top model, best quality
openrouter/test/model-a|200000|66|1.00|3.20|50|1451|77.8|86.0|no|Good open-weight model
openai/test-coder|128000||0.55|2.19|27||57.6|81.0|yes|Best for coding tasks
";

    #[test]
    fn test_parse_reads_all_rows() {
        let catalog = ModelCatalog::parse(PSV);
        assert_eq!(catalog.len(), 3);

        let gemini = catalog.get("gemini/gemini-test").unwrap();
        assert!(gemini.favourite);
        assert_eq!(gemini.description, "Top model, best quality");
        assert!(!catalog.get("openrouter/test/model-a").unwrap().favourite);
        assert!(catalog.get("openai/test-coder").unwrap().favourite);
    }

    #[test]
    fn test_parse_is_column_count_agnostic() {
        let catalog = ModelCatalog::parse("a/b|x|y|z|extra|more|yes|desc\nc/d|no|short\n");
        let ab = catalog.get("a/b").unwrap();
        assert!(ab.favourite);
        assert_eq!(ab.description, "desc");

        let cd = catalog.get("c/d").unwrap();
        assert!(!cd.favourite);
        assert_eq!(cd.description, "short");
    }

    #[test]
    fn test_parse_skips_header_blanks_and_short_rows() {
        let text = "model|favourite|description\n\n  \nopenai/test|||||yes|A test model\nshort|row\n\n";
        let catalog = ModelCatalog::parse(text);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("openai/test").is_some());
        assert!(catalog.get("short").is_none());
        assert!(catalog.get("model").is_none());
    }

    #[test]
    fn test_favourite_flag_is_case_insensitive() {
        let catalog = ModelCatalog::parse("a/b|YES|d\nc/d|Yes|d\ne/f|y|d\n");
        assert_eq!(catalog.favourites(), vec!["a/b", "c/d"]);
    }

    #[test]
    fn test_favourites_keep_file_order() {
        let catalog = ModelCatalog::parse(PSV);
        assert_eq!(
            catalog.favourites(),
            vec!["gemini/gemini-test", "openai/test-coder"]
        );
    }

    #[test]
    fn test_description_filters_empty() {
        let catalog = ModelCatalog::parse("a/b|no|\nc/d|no|described\n");
        assert_eq!(catalog.description("a/b"), None);
        assert_eq!(catalog.description("c/d"), Some("described"));
        assert_eq!(catalog.description("missing/model"), None);
    }

    #[test]
    fn test_duplicate_rows_replace_in_place() {
        let catalog = ModelCatalog::parse("a/b|no|first\nc/d|yes|x\na/b|yes|second\n");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("a/b").unwrap().description, "second");
        assert_eq!(catalog.favourites(), vec!["a/b", "c/d"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let catalog = ModelCatalog::load(Path::new("/nonexistent/models.psv"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.psv");
        std::fs::write(&path, PSV).unwrap();

        let catalog = ModelCatalog::load(&path);
        assert_eq!(catalog.len(), 3);
    }
}
