//! # Store Drivers
//!
//! Every backend the engine talks to implements [`StoreDriver`]. The index
//! schema manager, the bulk indexer, and the search gateway only ever hold
//! an `Arc<dyn StoreDriver>`; which concrete driver sits behind it is a
//! runtime choice made through [`registry::DriverRegistry`].
//!
//! Drivers return search documents in whatever shape is natural for the
//! client library ([`RawFields`]). Normalizing those into
//! [`tq_core::TrafficObservation`] is the gateway's job.

pub mod commands;
pub mod memory;
pub mod redis_pooled;
pub mod redis_sync;
pub mod registry;

pub use tq_core::DriverKind;

use crate::schema::{IndexField, IndexSchema};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tq_core::{fields, Result, TrafficObservation};

/// Hash fields plus set additions for one record, written as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub key: String,
    pub fields: Vec<(String, String)>,
    /// `(set key, member)` pairs.
    pub set_adds: Vec<(String, String)>,
}

impl RecordWrite {
    /// Layout for one observation under `prefix`:
    /// the hash at `<prefix>:<id>`, the coordinate lookup sets at
    /// `<prefix>:latitude:<value>` / `<prefix>:longitude:<value>`, and the
    /// global id set at `<prefix>`.
    ///
    /// `location` is included only when both coordinates parse.
    pub fn for_observation(prefix: &str, obs: &TrafficObservation) -> Self {
        let mut record_fields: Vec<(String, String)> = obs
            .field_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        match obs.location() {
            Ok(point) => record_fields.push((fields::LOCATION.to_string(), point.to_string())),
            Err(e) => tracing::warn!(
                "Record {} indexed without {}: {}",
                obs.id,
                fields::LOCATION,
                e
            ),
        }

        Self {
            key: record_key(prefix, &obs.id),
            fields: record_fields,
            set_adds: vec![
                (lookup_key(prefix, fields::LATITUDE, &obs.latitude), obs.id.clone()),
                (lookup_key(prefix, fields::LONGITUDE, &obs.longitude), obs.id.clone()),
                (prefix.to_string(), obs.id.clone()),
            ],
        }
    }
}

pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{}:{}", prefix, id)
}

pub fn lookup_key(prefix: &str, field: &str, value: &str) -> String {
    format!("{}:{}:{}", prefix, field, value)
}

/// One search call as submitted to a driver.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub index: String,
    pub query: String,
    pub offset: usize,
    pub limit: usize,
    /// Projection. Empty means every stored field.
    pub return_fields: Vec<String>,
}

/// Per-document properties, in the driver's native shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFields {
    /// Alternating name, value, name, value...
    FlatPairs(Vec<String>),
    /// Name to string value.
    Map(HashMap<String, String>),
    /// JSON object; numbers may be typed.
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub key: String,
    pub fields: RawFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSearchReply {
    /// Store-reported match count, independent of pagination.
    pub total: i64,
    pub documents: Vec<RawDocument>,
    /// Time spent waiting on the store, not counting reply decoding.
    pub round_trip: Duration,
}

/// The capability set every backend provides.
#[async_trait::async_trait]
pub trait StoreDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Drop the index definition. Documents are left in place.
    async fn drop_index(&self, name: &str) -> Result<()>;

    async fn create_index(&self, schema: &IndexSchema) -> Result<()>;

    /// Field names and types currently registered for `name`.
    async fn describe_index(&self, name: &str) -> Result<Vec<IndexField>>;

    /// Write a batch of records. The batch is sent as one unit; there is
    /// no transaction across batches.
    async fn write_records(&self, batch: &[RecordWrite]) -> Result<()>;

    async fn set_cardinality(&self, key: &str) -> Result<u64>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn search(&self, request: &SearchRequest) -> Result<RawSearchReply>;
}
