//! Corpus files
//!
//! A corpus is either one JSON file holding an array of `{title, content}`
//! records, or a directory of `.json`/`.txt` files each holding one record or
//! an array of them. Records are cleaned, ordered by title and de-duplicated
//! before they are embedded.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One corpus entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    #[serde(alias = "Title", default)]
    pub title: String,
    #[serde(alias = "Content", alias = "page_content")]
    pub content: String,
}

impl CorpusRecord {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into() }
    }

    /// Stable identity used to skip re-imported records
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Text handed to the embedder
    pub fn embedding_text(&self) -> String {
        self.content.clone()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<CorpusRecord>),
    One(CorpusRecord),
}

impl From<OneOrMany> for Vec<CorpusRecord> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::Many(records) => records,
            OneOrMany::One(record) => vec![record],
        }
    }
}

/// Load and prepare a corpus from a file or directory
pub async fn load_corpus(path: &Path) -> Result<Vec<CorpusRecord>> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| AppError::Configuration {
        message: format!("Corpus path {} is not readable: {}", path.display(), e),
    })?;

    let records = if metadata.is_dir() {
        load_directory(path).await?
    } else {
        let text = tokio::fs::read_to_string(path).await?;
        parse_records(&text)?
    };

    let loaded = records.len();
    let prepared = prepare(records);
    info!(
        path = %path.display(),
        loaded,
        kept = prepared.len(),
        "Corpus loaded"
    );
    Ok(prepared)
}

async fn load_directory(dir: &Path) -> Result<Vec<CorpusRecord>> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if wanted {
            files.push(path);
        }
    }
    files.sort();

    info!(files = files.len(), dir = %dir.display(), "Reading corpus directory");

    let mut records = Vec::new();
    for file in files {
        let text = tokio::fs::read_to_string(&file).await?;
        match parse_records(&text) {
            Ok(parsed) => records.extend(parsed),
            Err(e) => warn!(file = %file.display(), error = %e, "Skipping unparseable corpus file"),
        }
    }
    Ok(records)
}

/// Parse one JSON document holding a record or an array of records
pub fn parse_records(text: &str) -> Result<Vec<CorpusRecord>> {
    let parsed: OneOrMany = serde_json::from_str(text)?;
    Ok(parsed.into())
}

/// Trim fields, drop blank content, order by title, drop duplicates
pub fn prepare(records: Vec<CorpusRecord>) -> Vec<CorpusRecord> {
    let mut records: Vec<CorpusRecord> = records
        .into_iter()
        .map(|r| CorpusRecord::new(r.title.trim(), r.content.trim()))
        .filter(|r| !r.content.is_empty())
        .collect();

    // Stable: records sharing a title keep their file order
    records.sort_by(|a, b| a.title.cmp(&b.title));

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.content_hash()));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_and_single() {
        let many = parse_records(r#"[{"title":"A","content":"x"},{"Title":"B","Content":"y"}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1], CorpusRecord::new("B", "y"));

        let one = parse_records(r#"{"title":"A","content":"x"}"#).unwrap();
        assert_eq!(one, vec![CorpusRecord::new("A", "x")]);

        assert!(parse_records("not json").is_err());
    }

    #[test]
    fn test_prepare_sorts_trims_and_dedupes() {
        let records = vec![
            CorpusRecord::new("Working Hours", " 10am to 5pm "),
            CorpusRecord::new("Contact Info", "Call 112"),
            CorpusRecord::new("Empty", "   "),
            CorpusRecord::new("Contact Info", "Call 112"),
        ];
        let prepared = prepare(records);
        assert_eq!(
            prepared,
            vec![
                CorpusRecord::new("Contact Info", "Call 112"),
                CorpusRecord::new("Working Hours", "10am to 5pm"),
            ]
        );
    }

    #[test]
    fn test_content_hash_separates_fields() {
        let a = CorpusRecord::new("ab", "c");
        let b = CorpusRecord::new("a", "bc");
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[tokio::test]
    async fn test_load_directory_skips_bad_files() {
        let dir = std::env::temp_dir().join(format!("ragstream-corpus-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("a.json"), r#"{"title":"Zeta","content":"z"}"#).await.unwrap();
        tokio::fs::write(dir.join("b.txt"), r#"[{"title":"Alpha","content":"a"}]"#).await.unwrap();
        tokio::fs::write(dir.join("c.txt"), "{ broken").await.unwrap();
        tokio::fs::write(dir.join("d.md"), "# ignored").await.unwrap();

        let records = load_corpus(&dir).await.unwrap();
        tokio::fs::remove_dir_all(&dir).await.unwrap();

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
    }
}
