//! ============================================================================
//! Qdrant Backend - Qdrant vector database operations
//! ============================================================================
//! Implements `VectorBackend` over the Qdrant gRPC client. Qdrant reports
//! dimension errors only as text, so this is the one place where server
//! messages are turned into a `FaultKind`.
//! ============================================================================

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, points_selector::PointsSelectorOneOf, vectors_config::Config,
    Condition, CreateCollectionBuilder, DeleteCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{FaultKind, StoreFault, StoreResult, VectorBackend, VectorLayout};
use super::types::{MemoryRecord, Metric};

/// Vector backend backed by a Qdrant instance
pub struct QdrantBackend {
    client: Qdrant,
    url: String,
}

impl QdrantBackend {
    /// Build a client for the given Qdrant URL (gRPC port, usually 6334)
    pub fn connect(url: &str) -> StoreResult<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreFault::unavailable(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| to_fault("check collection existence", e))
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimension: u64,
        metric: Metric,
    ) -> StoreResult<()> {
        info!(collection, dimension, %metric, "Creating Qdrant collection");

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, distance_for(metric))),
            )
            .await
            .map_err(|e| to_fault("create collection", e))?;

        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> StoreResult<()> {
        info!(collection, "Deleting Qdrant collection");

        self.client
            .delete_collection(DeleteCollectionBuilder::new(collection))
            .await
            .map_err(|e| to_fault("delete collection", e))?;

        Ok(())
    }

    async fn collection_layout(&self, collection: &str) -> StoreResult<VectorLayout> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| to_fault("get collection info", e))?;

        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        Ok(match config {
            Some(Config::Params(params)) => VectorLayout::Single {
                dimension: params.size,
            },
            // Named vectors are not something this store writes
            Some(Config::ParamsMap(_)) | None => VectorLayout::Unknown,
        })
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| to_fault("get collection info", e))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn search(
        &self,
        collection: &str,
        user_id: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>> {
        debug!("Searching {} for user {} (limit: {})", collection, user_id, limit);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, limit)
                    .filter(user_filter(user_id))
                    .with_payload(true),
            )
            .await
            .map_err(|e| to_fault("search memories", e))?;

        let records: Vec<MemoryRecord> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let score = point.score;
                record_from_payload(point.id?, &point.payload).map(|r| r.with_score(score))
            })
            .collect();

        debug!("Found {} matching memories", records.len());
        Ok(records)
    }

    async fn upsert(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vector: Vec<f32>,
    ) -> StoreResult<()> {
        debug!("Storing memory {} for user {}", record.id, record.user_id);

        let payload: HashMap<String, Value> = [
            ("user_id".to_string(), Value::from(record.user_id.clone())),
            ("content".to_string(), Value::from(record.content.clone())),
            ("created_at".to_string(), Value::from(record.created_at)),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(record.id.to_string(), vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| to_fault("upsert memory", e))?;

        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        user_id: &str,
        limit: u64,
    ) -> StoreResult<Vec<MemoryRecord>> {
        let scroll_result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(user_filter(user_id))
                    .limit(limit.min(u32::MAX as u64) as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| to_fault("scroll memories", e))?;

        Ok(scroll_result
            .result
            .into_iter()
            .filter_map(|point| record_from_payload(point.id?, &point.payload))
            .collect())
    }

    async fn delete_user(&self, collection: &str, user_id: &str) -> StoreResult<()> {
        info!(collection, user_id, "Deleting all memories for user");

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsSelectorOneOf::Filter(user_filter(user_id)))
                    .wait(true),
            )
            .await
            .map_err(|e| to_fault("delete memories", e))?;

        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.client.health_check().await {
            Ok(_) => true,
            Err(e) => {
                warn!(url = %self.url, "Qdrant health check failed: {}", e);
                false
            }
        }
    }
}

fn distance_for(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::Dot => Distance::Dot,
        Metric::Euclid => Distance::Euclid,
    }
}

fn user_filter(user_id: &str) -> Filter {
    Filter::must([Condition::matches("user_id", user_id.to_string())])
}

fn to_fault(action: &str, error: QdrantError) -> StoreFault {
    let message = format!("Failed to {}: {}", action, error);
    StoreFault::new(classify_message(&message), message)
}

/// Map a Qdrant error message onto a fault kind.
///
/// Qdrant phrases dimension errors as
/// `Wrong input: Vector dimension error: expected dim: 768, got 1536`.
pub(crate) fn classify_message(message: &str) -> FaultKind {
    let lower = message.to_lowercase();

    if lower.contains("vector dimension error") || lower.contains("expected dim") {
        let (expected, actual) = parse_dimensions(&lower);
        return FaultKind::DimensionMismatch { expected, actual };
    }

    if lower.contains("not found") || lower.contains("doesn't exist") {
        return FaultKind::NotFound;
    }

    if lower.contains("wrong input")
        || lower.contains("invalid argument")
        || lower.contains("invalidargument")
        || lower.contains("bad request")
        || lower.contains("format error")
    {
        return FaultKind::Rejected;
    }

    FaultKind::Unavailable
}

fn parse_dimensions(lower: &str) -> (Option<u64>, Option<u64>) {
    let number_after = |text: &str, marker: &str| -> Option<(u64, usize)> {
        let start = text.find(marker)? + marker.len();
        let rest = text[start..].trim_start();
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let end = text.len() - rest.len() + digits.len();
        digits.parse().ok().map(|n| (n, end))
    };

    match number_after(lower, "expected dim:") {
        Some((expected, end)) => (
            Some(expected),
            number_after(&lower[end..], "got").map(|(n, _)| n),
        ),
        None => (None, None),
    }
}

fn record_from_payload(
    point_id: qdrant_client::qdrant::PointId,
    payload: &HashMap<String, Value>,
) -> Option<MemoryRecord> {
    let id = extract_uuid_from_point_id(point_id)?;

    Some(MemoryRecord {
        id,
        user_id: get_string(payload, "user_id")?,
        content: get_string(payload, "content")?,
        created_at: payload
            .get("created_at")
            .and_then(|v| v.as_integer())
            .unwrap_or(0),
        score: 0.0,
    })
}

fn extract_uuid_from_point_id(point_id: qdrant_client::qdrant::PointId) -> Option<Uuid> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok(),
        PointIdOptions::Num(_) => None,
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}
