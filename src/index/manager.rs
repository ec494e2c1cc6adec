//! Index manager
//!
//! Owns every similarity partition and mediates all access. Mutations on a
//! key are serialized behind a per-key async lock held across the embedding
//! calls; queries never take that lock, so reads on one key proceed while
//! another key rebuilds. A build swaps the whole partition atomically:
//! queries already holding the old partition finish against it.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::embedding::EmbeddingClient;
use crate::types::IndexDocument;

use super::{IndexError, IndexPartition, PartitionKey, SimilarityResult};

const PARTITION_FILE_SUFFIX: &str = ".index.json";

/// Owns the set of similarity partitions
pub struct IndexManager {
    embedder: Arc<dyn EmbeddingClient>,
    config: IndexConfig,
    partitions: DashMap<PartitionKey, Arc<RwLock<IndexPartition>>>,
    /// Per-key mutation locks; queries never touch these
    write_locks: DashMap<PartitionKey, Arc<Mutex<()>>>,
}

impl IndexManager {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, config: IndexConfig) -> Self {
        Self {
            embedder,
            config,
            partitions: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    fn write_lock(&self, key: &PartitionKey) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Embed every document text, preserving order. Any failure aborts the
    /// whole call before a partition is touched.
    async fn embed_documents(
        &self,
        documents: &[IndexDocument],
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        Ok(self.embedder.embed_batch(&texts).await?)
    }

    /// Build a fresh partition for `key` and atomically replace any prior
    /// one. Nothing is replaced if embedding or insertion fails.
    pub async fn build(
        &self,
        key: PartitionKey,
        documents: &[IndexDocument],
    ) -> Result<(), IndexError> {
        let lock = self.write_lock(&key);
        let _guard = lock.lock().await;
        self.build_locked(key, documents).await
    }

    /// Build while already holding the key's mutation lock
    async fn build_locked(
        &self,
        key: PartitionKey,
        documents: &[IndexDocument],
    ) -> Result<(), IndexError> {
        let vectors = self.embed_documents(documents).await?;

        let mut partition = IndexPartition::new(key.clone(), self.embedder.dimensions());
        for (doc, vector) in documents.iter().zip(vectors) {
            partition.insert(doc.id.clone(), vector)?;
        }

        info!(%key, vectors = partition.len(), "built partition");
        self.partitions
            .insert(key, Arc::new(RwLock::new(partition)));
        Ok(())
    }

    /// Merge new documents into an existing partition, bumping its dirty
    /// count. With no partition for `key` this behaves like [`build`].
    ///
    /// Vectors are fully embedded and validated before the partition is
    /// touched, so a failed call leaves vectors and dirty count unchanged.
    ///
    /// [`build`]: IndexManager::build
    pub async fn update(
        &self,
        key: PartitionKey,
        documents: &[IndexDocument],
    ) -> Result<(), IndexError> {
        let lock = self.write_lock(&key);
        let _guard = lock.lock().await;

        let partition = match self.partitions.get(&key) {
            Some(entry) => entry.value().clone(),
            None => return self.build_locked(key, documents).await,
        };

        let vectors = self.embed_documents(documents).await?;
        let expected = partition.read().dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: bad.len(),
            });
        }

        // All inputs validated; applying the merge cannot fail partway.
        let mut guard = partition.write();
        for (doc, vector) in documents.iter().zip(vectors) {
            guard
                .insert(doc.id.clone(), vector)
                .expect("vector width checked above");
        }
        guard.mark_dirty(documents.len());
        debug!(%key, merged = documents.len(), dirty = guard.dirty_count(), "merged update");
        Ok(())
    }

    /// Nearest neighbors of `text` in the partition for `key`.
    ///
    /// An absent key is a valid "no similarity data" state and yields an
    /// empty result, never an error.
    pub async fn query(
        &self,
        key: &PartitionKey,
        text: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>, IndexError> {
        let partition = match self.partitions.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(Vec::new()),
        };

        let query_vector = self.embedder.embed(text).await?;
        let results = partition.read().search(&query_vector, k)?;
        Ok(results)
    }

    /// Score one candidate document against a partition.
    ///
    /// Aggregates the configured number of nearest neighbors with a
    /// harmonic mean, which penalizes outliers harder than the plain
    /// average. Returns `None` when there is no partition or it is empty.
    pub async fn score_document(
        &self,
        key: &PartitionKey,
        document: &IndexDocument,
    ) -> Result<Option<SimilarityResult>, IndexError> {
        let neighbors = self.query(key, &document.text, self.config.query_k).await?;
        let Some(best) = neighbors.first() else {
            return Ok(None);
        };

        Ok(Some(SimilarityResult {
            document_id: document.id.clone(),
            score: harmonic_mean_score(&neighbors),
            matched_document_id: Some(best.document_id.clone()),
        }))
    }

    /// Whether the configured staleness policy calls for a full rebuild
    pub fn is_stale(&self, key: &PartitionKey) -> bool {
        let Some(threshold) = self.config.rebuild_dirty_threshold else {
            return false;
        };
        self.partitions
            .get(key)
            .map(|entry| entry.value().read().dirty_count() >= threshold)
            .unwrap_or(false)
    }

    /// Vectors merged into `key` since its last full build
    pub fn dirty_count(&self, key: &PartitionKey) -> Option<usize> {
        self.partitions
            .get(key)
            .map(|entry| entry.value().read().dirty_count())
    }

    /// Keys with a live partition
    pub fn keys(&self) -> Vec<PartitionKey> {
        self.partitions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn partition_len(&self, key: &PartitionKey) -> Option<usize> {
        self.partitions
            .get(key)
            .map(|entry| entry.value().read().len())
    }

    /// Persist every partition under `dir`, one JSON file per key.
    ///
    /// Each file is written to a temporary name and renamed into place, so
    /// a crash mid-save never leaves a partial partition behind.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir)?;
        for entry in self.partitions.iter() {
            let partition = entry.value().read();
            let final_path = dir.join(format!(
                "{}{}",
                partition.key().file_stem(),
                PARTITION_FILE_SUFFIX
            ));
            let tmp_path = final_path.with_extension("json.tmp");

            let data = serde_json::to_vec(&*partition)?;
            std::fs::write(&tmp_path, data)?;
            std::fs::rename(&tmp_path, &final_path)?;
            info!(key = %partition.key(), path = %final_path.display(), "saved partition");
        }
        Ok(())
    }

    /// Load every persisted partition from `dir`. Missing directory means
    /// nothing was ever saved; unreadable files are skipped with a warning.
    pub fn load(&self, dir: &Path) -> Result<usize, IndexError> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(PARTITION_FILE_SUFFIX) {
                continue;
            }

            match std::fs::read(&path)
                .map_err(IndexError::from)
                .and_then(|data| {
                    serde_json::from_slice::<IndexPartition>(&data).map_err(IndexError::from)
                }) {
                Ok(mut partition) => {
                    partition.rebuild_lookup();
                    info!(key = %partition.key(), vectors = partition.len(), "loaded partition");
                    self.partitions.insert(
                        partition.key().clone(),
                        Arc::new(RwLock::new(partition)),
                    );
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable partition file");
                }
            }
        }
        Ok(loaded)
    }
}

/// Harmonic mean of neighbor similarities, mapped through 1/(1 + distance)
/// so a single far-off neighbor drags the aggregate down.
fn harmonic_mean_score(neighbors: &[SimilarityResult]) -> f32 {
    if neighbors.is_empty() {
        return 0.0;
    }
    let sum_inverse: f32 = neighbors
        .iter()
        .map(|n| {
            let distance = 1.0 - n.score;
            1.0 + distance
        })
        .sum();
    neighbors.len() as f32 / sum_inverse
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f32) -> SimilarityResult {
        SimilarityResult {
            document_id: "x".to_string(),
            score,
            matched_document_id: None,
        }
    }

    #[test]
    fn harmonic_mean_of_perfect_matches_is_one() {
        let neighbors = vec![result(1.0), result(1.0)];
        assert!((harmonic_mean_score(&neighbors) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn harmonic_mean_penalizes_outliers() {
        let close = vec![result(0.9), result(0.9)];
        let mixed = vec![result(0.9), result(0.1)];
        assert!(harmonic_mean_score(&mixed) < harmonic_mean_score(&close));
    }

    #[test]
    fn harmonic_mean_of_nothing_is_zero() {
        assert_eq!(harmonic_mean_score(&[]), 0.0);
    }
}
