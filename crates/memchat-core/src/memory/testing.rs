//! In-process vector backend and embedder for unit tests.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use super::backend::{FaultKind, StoreFault, StoreResult, VectorBackend, VectorLayout};
use super::embeddings::Embedder;
use super::types::{MemoryRecord, Metric};

/// Calls observed by the test backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists,
    Create { dimension: u64 },
    Delete,
    Layout,
    Search,
    Upsert,
}

struct Collection {
    layout: VectorLayout,
    points: Vec<(MemoryRecord, Vec<f32>)>,
}

#[derive(Default)]
struct Faults {
    search: VecDeque<StoreFault>,
    upsert: VecDeque<StoreFault>,
    layout: VecDeque<StoreFault>,
    create: VecDeque<StoreFault>,
    delete: VecDeque<StoreFault>,
    exists: VecDeque<StoreFault>,
}

/// Vector backend holding collections in memory with scripted faults
#[derive(Default)]
pub struct TestBackend {
    collections: Mutex<HashMap<String, Collection>>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create (or overwrite) a collection with the given layout
    pub fn seed_collection(&self, name: &str, layout: VectorLayout) {
        self.collections.lock().unwrap().insert(
            name.to_string(),
            Collection {
                layout,
                points: Vec::new(),
            },
        );
    }

    pub fn layout_of(&self, name: &str) -> Option<VectorLayout> {
        self.collections.lock().unwrap().get(name).map(|c| c.layout)
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    pub fn fail_next_search(&self, fault: StoreFault) {
        self.faults.lock().unwrap().search.push_back(fault);
    }

    pub fn fail_next_upsert(&self, fault: StoreFault) {
        self.faults.lock().unwrap().upsert.push_back(fault);
    }

    pub fn fail_next_layout(&self, fault: StoreFault) {
        self.faults.lock().unwrap().layout.push_back(fault);
    }

    pub fn fail_next_create(&self, fault: StoreFault) {
        self.faults.lock().unwrap().create.push_back(fault);
    }

    pub fn fail_next_delete(&self, fault: StoreFault) {
        self.faults.lock().unwrap().delete.push_back(fault);
    }

    pub fn fail_next_exists(&self, fault: StoreFault) {
        self.faults.lock().unwrap().exists.push_back(fault);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_dimension(layout: VectorLayout, vector: &[f32]) -> StoreResult<()> {
        let actual = vector.len() as u64;
        match layout.dimension() {
            Some(expected) if expected == actual => Ok(()),
            expected => Err(StoreFault::new(
                FaultKind::DimensionMismatch {
                    expected,
                    actual: Some(actual),
                },
                format!("Vector dimension error: expected dim: {:?}, got {}", expected, actual),
            )),
        }
    }
}

fn not_found(collection: &str) -> StoreFault {
    StoreFault::new(
        FaultKind::NotFound,
        format!("Collection `{}` doesn't exist", collection),
    )
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorBackend for TestBackend {
    fn name(&self) -> &str {
        "test"
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        self.record(Call::Exists);
        if let Some(fault) = self.faults.lock().unwrap().exists.pop_front() {
            return Err(fault);
        }
        Ok(self.collections.lock().unwrap().contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimension: u64,
        _metric: Metric,
    ) -> StoreResult<()> {
        self.record(Call::Create { dimension });
        if let Some(fault) = self.faults.lock().unwrap().create.pop_front() {
            return Err(fault);
        }
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(collection) {
            return Err(StoreFault::rejected(format!(
                "Collection `{}` already exists",
                collection
            )));
        }
        collections.insert(
            collection.to_string(),
            Collection {
                layout: VectorLayout::Single { dimension },
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> StoreResult<()> {
        self.record(Call::Delete);
        if let Some(fault) = self.faults.lock().unwrap().delete.pop_front() {
            return Err(fault);
        }
        self.collections.lock().unwrap().remove(collection);
        Ok(())
    }

    async fn collection_layout(&self, collection: &str) -> StoreResult<VectorLayout> {
        self.record(Call::Layout);
        if let Some(fault) = self.faults.lock().unwrap().layout.pop_front() {
            return Err(fault);
        }
        self.layout_of(collection).ok_or_else(|| not_found(collection))
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let collections = self.collections.lock().unwrap();
        let c = collections.get(collection).ok_or_else(|| not_found(collection))?;
        Ok(c.points.len() as u64)
    }

    async fn search(
        &self,
        collection: &str,
        user_id: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>> {
        self.record(Call::Search);
        if let Some(fault) = self.faults.lock().unwrap().search.pop_front() {
            return Err(fault);
        }
        let collections = self.collections.lock().unwrap();
        let c = collections.get(collection).ok_or_else(|| not_found(collection))?;
        Self::check_dimension(c.layout, &vector)?;

        let mut scored: Vec<MemoryRecord> = c
            .points
            .iter()
            .filter(|(record, _)| record.user_id == user_id)
            .map(|(record, v)| record.clone().with_score(cosine(&vector, v)))
            .filter(|record| record.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn upsert(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vector: Vec<f32>,
    ) -> StoreResult<()> {
        self.record(Call::Upsert);
        if let Some(fault) = self.faults.lock().unwrap().upsert.pop_front() {
            return Err(fault);
        }
        let mut collections = self.collections.lock().unwrap();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        Self::check_dimension(c.layout, &vector)?;
        c.points.push((record.clone(), vector));
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        user_id: &str,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>> {
        let collections = self.collections.lock().unwrap();
        let c = collections.get(collection).ok_or_else(|| not_found(collection))?;
        Ok(c.points
            .iter()
            .filter(|(record, _)| record.user_id == user_id)
            .take(limit as usize)
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn delete_user(&self, collection: &str, user_id: &str) -> StoreResult<()> {
        let mut collections = self.collections.lock().unwrap();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        c.points.retain(|(record, _)| record.user_id != user_id);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Deterministic bag-of-words embedder
pub struct HashEmbedder {
    dimension: u64,
}

impl HashEmbedder {
    pub fn new(dimension: u64) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }

    async fn embed_single(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension as usize];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension) as usize;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

/// Embedder that always fails
pub struct BrokenEmbedder {
    pub dimension: u64,
}

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }

    async fn embed_single(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("embedding quota exceeded"))
    }
}

/// A dimension fault as the backend would report it
pub fn dimension_fault(expected: u64, actual: u64) -> StoreFault {
    StoreFault::new(
        FaultKind::DimensionMismatch {
            expected: Some(expected),
            actual: Some(actual),
        },
        format!("Vector dimension error: expected dim: {}, got {}", expected, actual),
    )
}
