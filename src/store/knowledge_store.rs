//! Knowledge store with vector and lexical search over persisted chunks

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{KnowledgeChunk, KnowledgeStatsResponse};

/// In-memory chunk store with JSON persistence
///
/// Reads take a shared lock and clone matching chunks out; writers persist
/// to disk before returning.
pub struct KnowledgeStore {
    storage_path: PathBuf,
    dimensions: usize,
    chunks: RwLock<HashMap<Uuid, KnowledgeChunk>>,
}

impl KnowledgeStore {
    /// Create a store, loading any previously persisted chunks
    pub fn new(storage_path: PathBuf, dimensions: usize) -> Self {
        let store = Self {
            storage_path,
            dimensions,
            chunks: RwLock::new(HashMap::new()),
        };

        if let Err(e) = store.load() {
            tracing::warn!("Could not load knowledge store: {}", e);
        }

        store
    }

    /// In-memory store for tests
    #[cfg(test)]
    pub fn ephemeral(dimensions: usize) -> Self {
        Self {
            storage_path: std::env::temp_dir()
                .join(format!("lending-rag-test-{}.json", Uuid::new_v4())),
            dimensions,
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a chunk
    ///
    /// Re-inserting the same content under the same category is a no-op and
    /// returns the existing id. An embedding with the wrong dimensionality is
    /// rejected.
    pub fn insert(&self, chunk: KnowledgeChunk) -> Result<Uuid> {
        if let Some(embedding) = &chunk.embedding {
            if embedding.len() != self.dimensions {
                return Err(Error::store(format!(
                    "embedding has {} dimensions, store expects {}",
                    embedding.len(),
                    self.dimensions
                )));
            }
        }

        let id = chunk.id;
        {
            // Scan and insert under one guard so concurrent inserts of the
            // same content cannot both pass the duplicate check
            let mut chunks = self.chunks.write();
            if let Some(existing) = chunks
                .values()
                .find(|c| c.category == chunk.category && c.content_hash == chunk.content_hash)
            {
                tracing::debug!(
                    id = %existing.id,
                    category = %chunk.category,
                    "duplicate content, keeping existing chunk"
                );
                return Ok(existing.id);
            }
            chunks.insert(id, chunk);
        }
        self.persist();
        Ok(id)
    }

    /// Attach or replace the embedding on an existing chunk
    pub fn update_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::store(format!(
                "embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dimensions
            )));
        }

        {
            let mut chunks = self.chunks.write();
            let chunk = chunks
                .get_mut(&id)
                .ok_or_else(|| Error::ChunkNotFound(id.to_string()))?;
            chunk.embedding = Some(embedding);
            chunk.updated_at = chrono::Utc::now();
        }
        self.persist();
        Ok(())
    }

    /// Remove a chunk entirely
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.chunks.write().remove(&id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<KnowledgeChunk> {
        self.chunks.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Cosine similarity search over chunks that carry embeddings
    pub fn vector_search(&self, query: &[f32], limit: usize) -> Vec<(KnowledgeChunk, f32)> {
        let chunks = self.chunks.read();
        let mut scored: Vec<(KnowledgeChunk, f32)> = chunks
            .values()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some((chunk.clone(), cosine_similarity(query, embedding)))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
        });
        scored.truncate(limit);
        scored
    }

    /// Lexical search: query occurrence count, token overlap, and a tag bonus
    ///
    /// Both sides are digit-normalized so "25000" finds "25,000".
    pub fn text_search(&self, query: &str, limit: usize) -> Vec<(KnowledgeChunk, f32)> {
        let normalized_query = normalize_for_match(query);
        if normalized_query.is_empty() {
            return Vec::new();
        }
        let tokens = tokenize(&normalized_query);

        let chunks = self.chunks.read();
        let mut scored: Vec<(KnowledgeChunk, f32)> = chunks
            .values()
            .filter_map(|chunk| {
                let haystack = normalize_for_match(&format!(
                    "{}\n{}",
                    chunk.title, chunk.content
                ));

                let mut score = 0.0f32;

                // Whole-query hits dominate
                score += 3.0 * count_occurrences(&haystack, &normalized_query) as f32;

                // Token overlap
                for token in &tokens {
                    score += count_occurrences(&haystack, token) as f32;
                }

                // Tag bonus when a tag appears in the query
                for tag in &chunk.tags {
                    let tag_norm = normalize_for_match(tag);
                    if !tag_norm.is_empty() && normalized_query.contains(&tag_norm) {
                        score += 2.0;
                    }
                }

                if score > 0.0 {
                    Some((chunk.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
        });
        scored.truncate(limit);
        scored
    }

    /// Whether any chunk references the entity by name
    pub fn contains_entity(&self, name: &str) -> bool {
        let name_norm = normalize_for_match(name);
        if name_norm.is_empty() {
            return false;
        }
        let chunks = self.chunks.read();
        chunks.values().any(|chunk| {
            normalize_for_match(&chunk.title).contains(&name_norm)
                || chunk
                    .tags
                    .iter()
                    .any(|t| normalize_for_match(t) == name_norm)
                || normalize_for_match(&chunk.content).contains(&name_norm)
        })
    }

    /// Store statistics
    pub fn stats(&self) -> KnowledgeStatsResponse {
        let chunks = self.chunks.read();
        let mut categories: HashMap<String, usize> = HashMap::new();
        let mut embedded = 0usize;
        for chunk in chunks.values() {
            *categories.entry(chunk.category.clone()).or_default() += 1;
            if chunk.embedding.is_some() {
                embedded += 1;
            }
        }
        KnowledgeStatsResponse {
            total_chunks: chunks.len(),
            embedded_chunks: embedded,
            categories,
        }
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::error!("Failed to persist knowledge store: {}", e);
        }
    }

    fn save(&self) -> std::io::Result<()> {
        let chunks = self.chunks.read();
        let data = serde_json::to_string(&*chunks)?;

        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.storage_path, data)
    }

    fn load(&self) -> std::io::Result<()> {
        if !self.storage_path.exists() {
            return Ok(());
        }

        let data = fs::read_to_string(&self.storage_path)?;
        let loaded: HashMap<Uuid, KnowledgeChunk> = serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        tracing::info!("Loaded {} chunks from knowledge store", loaded.len());
        *self.chunks.write() = loaded;
        Ok(())
    }
}

/// Cosine similarity; zero when either vector has zero norm
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Lowercase and drop thousand separators sitting between digits
fn normalize_for_match(text: &str) -> String {
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();
    let mut out = String::with_capacity(lowered.len());
    for (i, c) in chars.iter().enumerate() {
        if *c == ',' || *c == '，' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = chars.get(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false);
            if prev_digit && next_digit {
                continue;
            }
        }
        out.push(*c);
    }
    out.trim().to_string()
}

/// Split a normalized query into matchable tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || "。，、？！：；,.?!:;()（）".contains(c))
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_string())
        .collect()
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(title: &str, content: &str, category: &str) -> KnowledgeChunk {
        KnowledgeChunk::new(title, content, category)
    }

    #[test]
    fn duplicate_insert_returns_existing_id() {
        let store = KnowledgeStore::ephemeral(4);
        let first = store.insert(chunk("a", "贷款须知", "policy")).unwrap();
        let second = store.insert(chunk("b", "贷款须知", "policy")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);

        // Same content in a different category is a new chunk
        let third = store.insert(chunk("c", "贷款须知", "faq")).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn concurrent_duplicate_inserts_keep_one_chunk() {
        use std::sync::{Arc, Barrier};

        let store = Arc::new(KnowledgeStore::ephemeral(4));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .insert(chunk(&format!("t{}", i), "贷款须知", "policy"))
                        .unwrap()
                })
            })
            .collect();

        let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let store = KnowledgeStore::ephemeral(4);
        let mut c = chunk("a", "x", "policy");
        c.embedding = Some(vec![1.0, 0.0]);
        assert!(store.insert(c).is_err());
    }

    #[test]
    fn vector_search_orders_by_similarity() {
        let store = KnowledgeStore::ephemeral(3);
        let mut near = chunk("near", "a", "c");
        near.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut far = chunk("far", "b", "c");
        far.embedding = Some(vec![0.0, 1.0, 0.0]);
        let unembedded = chunk("none", "c", "c");
        store.insert(near).unwrap();
        store.insert(far).unwrap();
        store.insert(unembedded).unwrap();

        let results = store.vector_search(&[1.0, 0.0, 0.0], 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.title, "near");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn text_search_normalizes_digits() {
        let store = KnowledgeStore::ephemeral(4);
        store
            .insert(chunk("income", "申请人月收入：25,000元，符合条件", "loan_products"))
            .unwrap();

        let results = store.text_search("25000", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "income");
    }

    #[test]
    fn empty_store_returns_nothing() {
        let store = KnowledgeStore::ephemeral(4);
        assert!(store.text_search("贷款", 5).is_empty());
        assert!(store.vector_search(&[1.0; 4], 5).is_empty());
    }

    #[test]
    fn tag_bonus_boosts_tagged_chunk() {
        let store = KnowledgeStore::ephemeral(4);
        store
            .insert(
                chunk("a", "外资银行贷款政策说明", "bank_info")
                    .with_tags(vec!["花旗银行".to_string()]),
            )
            .unwrap();
        store
            .insert(chunk("b", "外资银行贷款政策说明（通用）", "bank_info"))
            .unwrap();

        let results = store.text_search("花旗银行的贷款政策", 10);
        assert_eq!(results[0].0.title, "a");
    }

    #[test]
    fn contains_entity_checks_title_tags_content() {
        let store = KnowledgeStore::ephemeral(4);
        store
            .insert(chunk("渣打银行简介", "总部位于伦敦", "bank_info"))
            .unwrap();
        assert!(store.contains_entity("渣打银行"));
        assert!(!store.contains_entity("星展银行"));
    }

    #[test]
    fn update_embedding_touches_updated_at() {
        let store = KnowledgeStore::ephemeral(2);
        let c = chunk("a", "x", "c");
        let created = c.created_at;
        let id = store.insert(c).unwrap();
        store.update_embedding(id, vec![0.5, 0.5]).unwrap();
        let reloaded = store.get(id).unwrap();
        assert!(reloaded.updated_at >= created);
        assert!(reloaded.embedding.is_some());
    }
}
