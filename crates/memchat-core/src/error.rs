//! ============================================================================
//! Error Types - Failure taxonomy for the memory chat core
//! ============================================================================
//! Provisioning failures are fatal to the operation that hit them; memory
//! and generation failures degrade a turn but never abort it.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Error types for the memory chat core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum MemoryError {
    /// The vector store could not create, delete, or inspect a collection
    #[error("Provisioning failure: {0}")]
    ProvisioningFailure(String),

    /// Search or insert could not be completed
    #[error("Memory unavailable: {0}")]
    MemoryUnavailable(String),

    /// Every generation strategy failed
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;
