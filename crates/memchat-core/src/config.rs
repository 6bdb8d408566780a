//! ============================================================================
//! Config - Process-wide settings fixed at startup
//! ============================================================================
//! Built once (usually from the environment after `.env` is loaded) and
//! handed to the constructors of the store, invoker, and controller.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MemoryError, Result};
use crate::memory::{CollectionSpec, Metric};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "mem_agent_collection_gemini";
pub const DEFAULT_USER_ID: &str = "default_user";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// Memory chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub qdrant_url: String,
    pub collection: String,
    pub user_id: String,
    /// Output size of the embedding model in use
    pub embedding_dimension: u64,
    pub metric: Metric,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub generation_model: String,
    pub embedding_model: String,
    /// Max memories retrieved per turn
    pub search_limit: u64,
    /// Self-healing recreate-and-retry cycles per operation
    pub max_heal_retries: u32,
    /// Pause after mutating collection calls
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Re-read an unreadable dimension once before destroying a collection
    pub confirm_before_recreate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            embedding_dimension: crate::memory::GEMINI_EMBEDDING_DIM,
            metric: Metric::Cosine,
            gemini_api_key: None,
            openai_api_key: None,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: crate::memory::GEMINI_EMBEDDING_MODEL.to_string(),
            search_limit: 5,
            max_heal_retries: 1,
            settle_delay: Duration::from_secs(1),
            confirm_before_recreate: true,
        }
    }
}

impl Config {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (env, map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("QDRANT_URL") {
            config.qdrant_url = url;
        }
        if let Some(collection) = get("QDRANT_COLLECTION") {
            config.collection = collection;
        }
        if let Some(user_id) = get("MEM_USER_ID") {
            config.user_id = user_id;
        }
        if let Some(dim) = get("EMBEDDING_DIMENSION") {
            config.embedding_dimension = parse_number("EMBEDDING_DIMENSION", &dim)?;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            config.generation_model = model;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(limit) = get("MEM_SEARCH_LIMIT") {
            config.search_limit = parse_number("MEM_SEARCH_LIMIT", &limit)?;
        }
        if let Some(ms) = get("QDRANT_SETTLE_MS") {
            config.settle_delay = Duration::from_millis(parse_number("QDRANT_SETTLE_MS", &ms)?);
        }
        config.gemini_api_key = get("GEMINI_API_KEY");
        config.openai_api_key = get("OPENAI_API_KEY");

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(MemoryError::InvalidConfig("collection name is empty".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(MemoryError::InvalidConfig("user id is empty".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding dimension must be positive".into(),
            ));
        }
        if self.search_limit == 0 {
            return Err(MemoryError::InvalidConfig(
                "search limit must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Collection layout implied by this configuration
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec::new(self.collection.clone(), self.embedding_dimension, self.metric)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MemoryError::InvalidConfig(format!("{} is not a number: {}", key, value)))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
