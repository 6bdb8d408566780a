//! ============================================================================
//! Vector Backend - Client abstraction over the external vector store
//! ============================================================================
//! Every backend reports failures as a structured `StoreFault`, so callers
//! decide on self-healing from `FaultKind` alone and never from message text.
//! ============================================================================

use async_trait::async_trait;

use super::types::{MemoryRecord, Metric};

/// Classification of a vector store failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The collection's vector size disagrees with the supplied vector
    DimensionMismatch {
        expected: Option<u64>,
        actual: Option<u64>,
    },
    /// The collection does not exist
    NotFound,
    /// Transport, auth, or server-side outage
    Unavailable,
    /// The request itself was refused (malformed query, bad payload)
    Rejected,
}

/// A failed vector store call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct StoreFault {
    pub kind: FaultKind,
    pub message: String,
}

impl StoreFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Rejected, message)
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self.kind, FaultKind::DimensionMismatch { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreFault>;

/// Configured vector layout of a collection as read back from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorLayout {
    /// Single unnamed vector of a known size
    Single { dimension: u64 },
    /// Named/multi-vector or otherwise unrecognised layout
    Unknown,
}

impl VectorLayout {
    pub fn dimension(&self) -> Option<u64> {
        match self {
            VectorLayout::Single { dimension } => Some(*dimension),
            VectorLayout::Unknown => None,
        }
    }
}

/// Operations the memory core needs from a vector store
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Backend name for logging (e.g., "qdrant")
    fn name(&self) -> &str;

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool>;

    async fn create_collection(
        &self,
        collection: &str,
        dimension: u64,
        metric: Metric,
    ) -> StoreResult<()>;

    async fn delete_collection(&self, collection: &str) -> StoreResult<()>;

    /// Read back the collection's configured vector layout
    async fn collection_layout(&self, collection: &str) -> StoreResult<VectorLayout>;

    /// Number of stored points
    async fn count(&self, collection: &str) -> StoreResult<u64>;

    /// Similarity search restricted to one user, best match first
    async fn search(
        &self,
        collection: &str,
        user_id: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>>;

    /// Insert a record with its embedding
    async fn upsert(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vector: Vec<f32>,
    ) -> StoreResult<()>;

    /// Non-semantic listing of a user's records
    async fn scroll(
        &self,
        collection: &str,
        user_id: &str,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>>;

    /// Delete every record owned by a user
    async fn delete_user(&self, collection: &str, user_id: &str) -> StoreResult<()>;

    async fn health_check(&self) -> bool;
}
