//! ============================================================================
//! Collection Manager - Provisioning and repair of the memory collection
//! ============================================================================
//! Guarantees the collection exists with the embedder's dimension and the
//! configured metric. A mismatched collection is destroyed and recreated:
//! every vector stored in it is lost.
//! ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{StoreFault, VectorBackend, VectorLayout};
use super::types::{CollectionHandle, CollectionSpec};
use crate::error::{MemoryError, Result};

/// Provisions collections on a vector backend
pub struct CollectionManager {
    backend: Arc<dyn VectorBackend>,
    settle_delay: Duration,
    confirm_before_recreate: bool,
    generation: AtomicU64,
}

impl CollectionManager {
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            backend,
            settle_delay: Duration::from_secs(1),
            confirm_before_recreate: true,
            generation: AtomicU64::new(0),
        }
    }

    /// Pause after create/delete so the store can catch up
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_confirm_before_recreate(mut self, confirm: bool) -> Self {
        self.confirm_before_recreate = confirm;
        self
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    /// Make sure `spec.name` exists with `spec.dimension`, recreating it if not
    pub async fn ensure(&self, spec: &CollectionSpec) -> Result<CollectionHandle> {
        if spec.name.trim().is_empty() {
            return Err(MemoryError::InvalidConfig("collection name is empty".into()));
        }
        if spec.dimension == 0 {
            return Err(MemoryError::InvalidConfig(
                "collection dimension must be positive".into(),
            ));
        }

        info!(
            collection = %spec.name,
            dimension = spec.dimension,
            "Checking/creating collection"
        );

        let exists = self
            .backend
            .collection_exists(&spec.name)
            .await
            .map_err(|e| provisioning("check collection existence", e))?;

        if !exists {
            self.create(spec).await?;
            return Ok(self.handle(spec, true));
        }

        let current = self.read_dimension(spec).await;
        debug!(collection = %spec.name, "Current dimension: {:?}", current);

        if current == Some(spec.dimension) {
            debug!(collection = %spec.name, "Dimensions match. Collection is ready.");
            return Ok(self.handle(spec, false));
        }

        warn!(
            collection = %spec.name,
            "Dimension mismatch! Expected {}, got {:?}. Recreating collection (stored memories will be lost)",
            spec.dimension,
            current
        );

        self.backend
            .delete_collection(&spec.name)
            .await
            .map_err(|e| provisioning("delete collection", e))?;
        self.settle().await;

        self.create(spec).await?;
        Ok(self.handle(spec, true))
    }

    /// Configured dimension of an existing collection, `None` if undeterminable
    async fn read_dimension(&self, spec: &CollectionSpec) -> Option<u64> {
        match self.read_layout(spec).await {
            Some(dimension) => Some(dimension),
            None if self.confirm_before_recreate => {
                debug!(collection = %spec.name, "Dimension unreadable, confirming before recreate");
                self.settle().await;
                self.read_layout(spec).await
            }
            None => None,
        }
    }

    async fn read_layout(&self, spec: &CollectionSpec) -> Option<u64> {
        match self.backend.collection_layout(&spec.name).await {
            Ok(VectorLayout::Single { dimension }) => Some(dimension),
            Ok(VectorLayout::Unknown) => {
                warn!(collection = %spec.name, "Collection has no single vector config");
                None
            }
            Err(e) => {
                warn!(collection = %spec.name, "Could not verify dimensions: {}", e);
                None
            }
        }
    }

    async fn create(&self, spec: &CollectionSpec) -> Result<()> {
        info!(
            collection = %spec.name,
            "Creating collection with dimension {}",
            spec.dimension
        );

        self.backend
            .create_collection(&spec.name, spec.dimension, spec.metric)
            .await
            .map_err(|e| provisioning("create collection", e))?;
        self.settle().await;

        info!(collection = %spec.name, "Collection created successfully");
        Ok(())
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    fn handle(&self, spec: &CollectionSpec, created: bool) -> CollectionHandle {
        CollectionHandle {
            name: spec.name.clone(),
            dimension: spec.dimension,
            metric: spec.metric,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            created,
        }
    }
}

fn provisioning(action: &str, fault: StoreFault) -> MemoryError {
    MemoryError::ProvisioningFailure(format!("Failed to {}: {}", action, fault.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::backend::{FaultKind, StoreFault};
    use crate::memory::testing::{Call, TestBackend};
    use crate::memory::types::Metric;

    fn manager(backend: &Arc<TestBackend>) -> CollectionManager {
        CollectionManager::new(backend.clone()).with_settle_delay(Duration::ZERO)
    }

    fn spec(dimension: u64) -> CollectionSpec {
        CollectionSpec::new("memories", dimension, Metric::Cosine)
    }

    fn structural(call: &Call) -> bool {
        matches!(call, Call::Create { .. } | Call::Delete)
    }

    #[tokio::test]
    async fn test_creates_missing_collection() {
        let backend = Arc::new(TestBackend::new());
        let handle = manager(&backend).ensure(&spec(768)).await.unwrap();

        assert!(handle.created);
        assert_eq!(handle.dimension, 768);
        assert_eq!(handle.generation, 1);
        assert_eq!(backend.calls(), vec![Call::Exists, Call::Create { dimension: 768 }]);
        assert_eq!(
            backend.layout_of("memories"),
            Some(VectorLayout::Single { dimension: 768 })
        );
    }

    #[tokio::test]
    async fn test_matching_collection_is_untouched() {
        for dimension in [1, 384, 768, 1536, 3072] {
            let backend = Arc::new(TestBackend::new());
            backend.seed_collection("memories", VectorLayout::Single { dimension });

            let handle = manager(&backend).ensure(&spec(dimension)).await.unwrap();

            assert!(!handle.created);
            assert_eq!(backend.count_calls(structural), 0, "dimension {}", dimension);
        }
    }

    #[tokio::test]
    async fn test_mismatch_recreates_once() {
        for (existing, expected) in [(1536, 768), (768, 1536), (384, 1024)] {
            let backend = Arc::new(TestBackend::new());
            backend.seed_collection("memories", VectorLayout::Single { dimension: existing });

            let handle = manager(&backend).ensure(&spec(expected)).await.unwrap();

            assert!(handle.created);
            let structural_calls: Vec<Call> =
                backend.calls().into_iter().filter(structural).collect();
            assert_eq!(
                structural_calls,
                vec![Call::Delete, Call::Create { dimension: expected }]
            );
            assert_eq!(
                backend.layout_of("memories"),
                Some(VectorLayout::Single { dimension: expected })
            );
        }
    }

    #[tokio::test]
    async fn test_unreadable_dimension_confirmed_before_delete() {
        let backend = Arc::new(TestBackend::new());
        backend.seed_collection("memories", VectorLayout::Single { dimension: 768 });
        backend.fail_next_layout(StoreFault::unavailable("timeout reading collection info"));

        let handle = manager(&backend).ensure(&spec(768)).await.unwrap();

        assert!(!handle.created);
        assert_eq!(backend.count_calls(|c| *c == Call::Layout), 2);
        assert_eq!(backend.count_calls(structural), 0);
    }

    #[tokio::test]
    async fn test_unreadable_dimension_without_confirmation_recreates() {
        let backend = Arc::new(TestBackend::new());
        backend.seed_collection("memories", VectorLayout::Single { dimension: 768 });
        backend.fail_next_layout(StoreFault::unavailable("timeout reading collection info"));

        let handle = manager(&backend)
            .with_confirm_before_recreate(false)
            .ensure(&spec(768))
            .await
            .unwrap();

        assert!(handle.created);
        assert_eq!(backend.count_calls(|c| *c == Call::Delete), 1);
    }

    #[tokio::test]
    async fn test_unknown_layout_recreates() {
        let backend = Arc::new(TestBackend::new());
        backend.seed_collection("memories", VectorLayout::Unknown);

        let handle = manager(&backend).ensure(&spec(768)).await.unwrap();

        assert!(handle.created);
        assert_eq!(
            backend.layout_of("memories"),
            Some(VectorLayout::Single { dimension: 768 })
        );
    }

    #[tokio::test]
    async fn test_store_unreachable_is_provisioning_failure() {
        let backend = Arc::new(TestBackend::new());
        backend.fail_next_exists(StoreFault::unavailable("connection refused"));

        let err = manager(&backend).ensure(&spec(768)).await.unwrap_err();
        assert!(matches!(err, MemoryError::ProvisioningFailure(_)));

        backend.fail_next_create(StoreFault::new(FaultKind::Unavailable, "disk full"));
        let err = manager(&backend).ensure(&spec(768)).await.unwrap_err();
        assert!(matches!(err, MemoryError::ProvisioningFailure(ref m) if m.contains("disk full")));
    }

    #[tokio::test]
    async fn test_failed_delete_is_provisioning_failure() {
        let backend = Arc::new(TestBackend::new());
        backend.seed_collection("memories", VectorLayout::Single { dimension: 1536 });
        backend.fail_next_delete(StoreFault::unavailable("permission denied"));

        let err = manager(&backend).ensure(&spec(768)).await.unwrap_err();

        assert!(matches!(
            err,
            MemoryError::ProvisioningFailure(ref m) if m.contains("delete collection") && m.contains("permission denied")
        ));
        assert_eq!(backend.count_calls(|c| matches!(c, Call::Create { .. })), 0);
        assert_eq!(
            backend.layout_of("memories"),
            Some(VectorLayout::Single { dimension: 1536 })
        );
    }

    #[tokio::test]
    async fn test_invalid_spec_rejected_before_remote_calls() {
        let backend = Arc::new(TestBackend::new());
        let m = manager(&backend);

        assert!(matches!(
            m.ensure(&spec(0)).await,
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            m.ensure(&CollectionSpec::new(" ", 768, Metric::Cosine)).await,
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generation_increments() {
        let backend = Arc::new(TestBackend::new());
        let m = manager(&backend);

        let first = m.ensure(&spec(768)).await.unwrap();
        let second = m.ensure(&spec(768)).await.unwrap();
        assert_eq!(second.generation, first.generation + 1);
    }
}
