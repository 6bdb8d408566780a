//! ============================================================================
//! Memory Types - Data structures for conversation memory
//! ============================================================================
//! Defines memory records, exchanges, conversation turns, and the
//! collection descriptors used by the provisioning layer.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single memory record stored in the vector database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier assigned at insert
    pub id: Uuid,
    /// Owning user identifier
    pub user_id: String,
    /// The remembered content
    pub content: String,
    /// Unix timestamp when the record was created
    pub created_at: i64,
    /// Similarity score (only meaningful for search results)
    #[serde(default)]
    pub score: f32,
}

impl MemoryRecord {
    /// Create a new memory record
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            created_at: chrono::Utc::now().timestamp(),
            score: 0.0,
        }
    }

    /// Attach a search score
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Render as a grounding line for the prompt
    pub fn summary(&self) -> String {
        format!("ID: {}\nMemory: {}", self.id, self.content)
    }
}

/// A completed user query and assistant response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub query: String,
    pub response: String,
}

impl Exchange {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }

    /// Text persisted as the memory content for this exchange
    pub fn to_memory_content(&self) -> String {
        format!("User: {}\nAssistant: {}", self.query, self.response)
    }
}

/// One request/response cycle of the chat loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// What the user asked
    pub query: String,
    /// Rendered summaries of the memories used for grounding
    pub memories: Vec<String>,
    /// What the assistant answered
    pub response: String,
}

impl ConversationTurn {
    pub fn exchange(&self) -> Exchange {
        Exchange::new(self.query.clone(), self.response.clone())
    }
}

/// Similarity function of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Dot => write!(f, "dot"),
            Metric::Euclid => write!(f, "euclid"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "dot" => Ok(Metric::Dot),
            "euclid" | "euclidean" => Ok(Metric::Euclid),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// What a collection is expected to look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: u64,
    pub metric: Metric,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, dimension: u64, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
        }
    }
}

/// Process-local binding to a provisioned collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub dimension: u64,
    pub metric: Metric,
    /// Bumped every time this process (re)provisions the collection
    pub generation: u64,
    /// Whether the last `ensure` created the collection
    pub created: bool,
}

/// Collection statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub dimension: Option<u64>,
    pub points_count: u64,
}
