//! ============================================================================
//! MEMCHAT-CORE: Memory-grounded chat
//! ============================================================================
//! This crate handles all backend logic for the memchat assistant:
//! - Vector memory in Qdrant that repairs itself on dimension drift
//! - Gemini / OpenAI-compatible embeddings
//! - Best-effort generation across several API call shapes
//! - The per-turn retrieve, generate, persist loop
//! ============================================================================

pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod memory;

// Re-export main types for convenience
pub use config::Config;
pub use conversation::{ConversationTurnController, MemoryLookup, TurnDisplay, TurnOutcome};
pub use error::{MemoryError, Result};
pub use generation::{GenerationInvoker, GenerationStrategy, StrategyError};
pub use memory::{CollectionManager, MemoryStore, QdrantBackend};
