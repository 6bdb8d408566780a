//! ============================================================================
//! Memory Store - Self-healing search and insert over the collection
//! ============================================================================
//! A dimension-mismatch fault re-provisions the collection and retries the
//! operation, at most `max_heal_retries` times. Every other fault surfaces
//! as `MemoryUnavailable` without touching the collection.
//! ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{StoreResult, VectorBackend};
use super::collection::CollectionManager;
use super::embeddings::Embedder;
use super::types::{CollectionHandle, CollectionSpec, CollectionStats, Exchange, MemoryRecord};
use crate::config::Config;
use crate::error::{MemoryError, Result};

type StoreFuture<T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send>>;

/// Self-healing attempts made for the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max: u32,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    fn bump(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

struct StoreState {
    handle: CollectionHandle,
    retry: RetryState,
}

/// Memory store bound to one collection
pub struct MemoryStore {
    manager: CollectionManager,
    embedder: Arc<dyn Embedder>,
    spec: CollectionSpec,
    search_limit: u64,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Provision the collection and bind a store to it.
    ///
    /// Fails with `ProvisioningFailure` if the collection cannot be set up,
    /// which should halt startup.
    pub async fn open(
        config: &Config,
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;

        if embedder.dimension() != config.embedding_dimension {
            return Err(MemoryError::InvalidConfig(format!(
                "embedder {} produces {} dimensions, collection expects {}",
                embedder.name(),
                embedder.dimension(),
                config.embedding_dimension
            )));
        }

        let manager = CollectionManager::new(backend)
            .with_settle_delay(config.settle_delay)
            .with_confirm_before_recreate(config.confirm_before_recreate);

        let spec = config.collection_spec();
        let handle = manager.ensure(&spec).await?;

        info!(
            collection = %handle.name,
            dimension = handle.dimension,
            backend = manager.backend().name(),
            embedder = embedder.name(),
            "Memory store ready"
        );

        Ok(Self {
            manager,
            embedder,
            spec,
            search_limit: config.search_limit,
            state: Mutex::new(StoreState {
                handle,
                retry: RetryState::new(config.max_heal_retries),
            }),
        })
    }

    /// Memories relevant to `query` for `user_id`, best first (may be empty)
    pub async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryRecord>> {
        debug!("Searching memories for user {} with query: {}", user_id, query);

        let vector = self.embed(query).await?;
        let user_id = user_id.to_string();
        let limit = self.search_limit;

        self.with_self_heal("search", move |backend, collection| -> StoreFuture<Vec<MemoryRecord>> {
            let vector = vector.clone();
            let user_id = user_id.clone();
            Box::pin(async move { backend.search(&collection, &user_id, vector, limit).await })
        })
        .await
    }

    /// Persist a completed exchange as one new memory
    pub async fn add(&self, user_id: &str, exchange: &Exchange) -> Result<MemoryRecord> {
        let record = MemoryRecord::new(user_id, exchange.to_memory_content());
        let vector = self.embed(&record.content).await?;

        let stored = record.clone();
        self.with_self_heal("add", move |backend, collection| -> StoreFuture<()> {
            let vector = vector.clone();
            let record = stored.clone();
            Box::pin(async move { backend.upsert(&collection, &record, vector).await })
        })
        .await?;

        info!("Stored memory {} for user {}", record.id, user_id);
        Ok(record)
    }

    /// Up to `limit` of a user's memories (non-semantic), newest first.
    ///
    /// The page is taken in store order, which is not recency: with more
    /// than `limit` memories it is not guaranteed to hold the latest ones.
    pub async fn list(&self, user_id: &str, limit: u64) -> Result<Vec<MemoryRecord>> {
        let collection = self.collection_name().await;
        let mut records = self
            .backend()
            .scroll(&collection, user_id, limit)
            .await
            .map_err(|e| MemoryError::MemoryUnavailable(e.message))?;

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Delete every memory owned by `user_id`
    pub async fn forget_user(&self, user_id: &str) -> Result<()> {
        let collection = self.collection_name().await;
        self.backend()
            .delete_user(&collection, user_id)
            .await
            .map_err(|e| MemoryError::MemoryUnavailable(e.message))?;

        info!("Deleted memories for user {}", user_id);
        Ok(())
    }

    /// Point count and dimension of the bound collection
    pub async fn stats(&self) -> Result<CollectionStats> {
        let collection = self.collection_name().await;
        let backend = self.backend();

        let points_count = backend
            .count(&collection)
            .await
            .map_err(|e| MemoryError::MemoryUnavailable(e.message))?;
        let dimension = backend
            .collection_layout(&collection)
            .await
            .ok()
            .and_then(|layout| layout.dimension());

        Ok(CollectionStats {
            name: collection,
            dimension,
            points_count,
        })
    }

    pub async fn health_check(&self) -> bool {
        self.backend().health_check().await
    }

    /// Currently bound collection handle
    pub async fn handle(&self) -> CollectionHandle {
        self.state.lock().await.handle.clone()
    }

    pub async fn retry_attempts(&self) -> u32 {
        self.state.lock().await.retry.attempts()
    }

    fn backend(&self) -> &Arc<dyn VectorBackend> {
        self.manager.backend()
    }

    async fn collection_name(&self) -> String {
        self.state.lock().await.handle.name.clone()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed_single(text)
            .await
            .map_err(|e| MemoryError::MemoryUnavailable(format!("embedding failed: {}", e)))
    }

    /// Run `op`, re-provisioning and retrying on dimension faults.
    ///
    /// The state lock is held for the whole sequence so a recreate can
    /// never race an in-flight operation on the same store.
    async fn with_self_heal<T>(
        &self,
        label: &str,
        op: impl Fn(Arc<dyn VectorBackend>, String) -> StoreFuture<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().await;

        loop {
            let fault = match op(self.backend().clone(), state.handle.name.clone()).await {
                Ok(value) => {
                    state.retry.reset();
                    return Ok(value);
                }
                Err(fault) => fault,
            };

            if !fault.is_dimension_mismatch() {
                warn!("Memory {} failed: {}", label, fault);
                state.retry.reset();
                return Err(MemoryError::MemoryUnavailable(fault.message));
            }

            if state.retry.exhausted() {
                warn!(
                    "Memory {} still failing after {} self-heal attempt(s): {}",
                    label,
                    state.retry.attempts(),
                    fault
                );
                state.retry.reset();
                return Err(MemoryError::MemoryUnavailable(format!(
                    "dimension mismatch persists after recreating collection: {}",
                    fault.message
                )));
            }

            let attempt = state.retry.bump();
            warn!(
                collection = %state.handle.name,
                "Dimension mismatch detected during {}. Recreating collection (attempt {}/{})",
                label,
                attempt,
                state.retry.max
            );

            match self.manager.ensure(&self.spec).await {
                Ok(handle) => state.handle = handle,
                Err(e) => {
                    warn!("Self-heal failed during {}: {}", label, e);
                    state.retry.reset();
                    return Err(MemoryError::MemoryUnavailable(e.to_string()));
                }
            }
        }
    }
}
