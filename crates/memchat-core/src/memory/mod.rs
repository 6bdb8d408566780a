//! ============================================================================
//! Memory Module - Self-healing conversation memory
//! ============================================================================
//! Provides vector-based memory storage for semantic recall, kept consistent
//! with the embedder in use.
//!
//! ## Features
//! - Provision the collection with the embedder's dimension
//! - Recreate it when the dimensions disagree (destructive)
//! - Search and insert with one bounded self-healing retry
//! - Per-user memory isolation
//!
//! ## Architecture
//! ```text
//! MemoryStore::search / add
//!        │  DimensionMismatch fault
//!        ▼
//! CollectionManager::ensure ──▶ delete + create ──▶ rebind handle ──▶ retry once
//!        │
//!        ▼
//! VectorBackend (Qdrant)          Embedder (Gemini / OpenAI-compatible)
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use memchat_core::memory::{GeminiEmbedder, MemoryStore, QdrantBackend};
//!
//! let backend = Arc::new(QdrantBackend::connect(&config.qdrant_url)?);
//! let embedder = Arc::new(GeminiEmbedder::new(api_key));
//! let store = MemoryStore::open(&config, backend, embedder).await?;
//!
//! store.add(user_id, &Exchange::new("My favorite color is green", "Noted!")).await?;
//! let relevant = store.search("what color do I like", user_id).await?;
//! ```
//! ============================================================================

mod backend;
mod collection;
mod embeddings;
mod qdrant;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod types;

// Re-export public types
pub use backend::{FaultKind, StoreFault, StoreResult, VectorBackend, VectorLayout};
pub use collection::CollectionManager;
pub use embeddings::{
    create_embedding_service, Embedder, GeminiEmbedder, OpenAiEmbedder, GEMINI_EMBEDDING_DIM,
    GEMINI_EMBEDDING_MODEL, OPENAI_EMBEDDING_DIM, OPENAI_EMBEDDING_MODEL,
};
pub use qdrant::QdrantBackend;
pub use store::{MemoryStore, RetryState};
pub use types::{
    CollectionHandle, CollectionSpec, CollectionStats, ConversationTurn, Exchange, MemoryRecord,
    Metric,
};
