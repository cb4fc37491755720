//! File-backed lexical index.
//!
//! A local fallback for deployments without a hosted vector service:
//! scores are a token-set Dice coefficient over normalized descriptions.
//! Good enough for exact and near-exact phrasing; the hard metadata
//! filters in `dedup` do most of the narrowing anyway.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::{IndexRecord, SearchHit, SimilarityIndex};

/// Lexical similarity index persisted as one JSON file per namespace
pub struct LexicalIndex {
    /// Directory holding `<namespace>.json` files
    dir: PathBuf,

    /// Serializes load-modify-save cycles across concurrent pipelines
    write_lock: Mutex<()>,
}

impl LexicalIndex {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    async fn load(&self, namespace: &str) -> Result<BTreeMap<String, IndexRecord>> {
        let path = self.namespace_path(namespace);

        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read index namespace: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse index namespace JSON")
    }

    /// Write to a scratch file and rename it into place, so a concurrent
    /// search observes either the old or the new namespace file, never a
    /// truncated one.
    async fn save(&self, namespace: &str, records: &BTreeMap<String, IndexRecord>) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.namespace_path(namespace);
        let scratch = self.dir.join(format!("{}.json.tmp", namespace));
        let content = serde_json::to_string_pretty(records)?;

        fs::write(&scratch, content)
            .await
            .with_context(|| format!("Failed to write index namespace: {}", scratch.display()))?;

        fs::rename(&scratch, &path)
            .await
            .with_context(|| format!("Failed to replace index namespace: {}", path.display()))?;

        Ok(())
    }
}

/// Lowercased token set of a description
fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Dice coefficient over token sets: 2|A∩B| / (|A|+|B|)
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let overlap = a.intersection(b).count();
    (2 * overlap) as f64 / (a.len() + b.len()) as f64
}

#[async_trait]
impl SimilarityIndex for LexicalIndex {
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let records = self.load(namespace).await?;
        let query_tokens = tokens(query);

        let mut hits: Vec<SearchHit> = records
            .into_values()
            .map(|record| {
                let score = dice(&query_tokens, &tokens(&record.description));
                SearchHit { record, score }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut existing = self.load(namespace).await?;
        for record in records {
            existing.insert(record.id.to_string(), record.clone());
        }

        self.save(namespace, &existing).await
    }
}
