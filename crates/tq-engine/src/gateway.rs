//! # Search Gateway
//!
//! Runs a compiled query on a driver chosen per call and normalizes the
//! driver's document shape into [`TrafficObservation`]s.
//!
//! Failures never escape as `Err`: every call yields a [`SearchResult`],
//! with `error` set when the query could not be answered. That keeps
//! "no matches" (`error == None`, `total == 0`) distinct from "query
//! failed", and lets [`SearchGateway::compare`] report every driver.

use crate::drivers::registry::DriverRegistry;
use crate::drivers::{DriverKind, RawDocument, RawFields, SearchRequest};
use crate::query::{compile, CompiledQuery, FieldSet, Pagination, SearchFilters};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tq_core::{fields, ErrorKind, ErrorReport, TrafficError, TrafficObservation};

/// Failure payload carried by a [`SearchResult`].
pub type SearchFailure = ErrorReport;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub driver: DriverKind,
    pub query: String,
    /// Store-reported match count; may exceed `records.len()`.
    pub total: i64,
    pub records: Vec<TrafficObservation>,
    /// Wall-clock time of the store round trip only.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub error: Option<SearchFailure>,
}

impl SearchResult {
    fn failed(driver: DriverKind, query: String, elapsed: Duration, err: &TrafficError) -> Self {
        Self {
            driver,
            query,
            total: 0,
            records: Vec::new(),
            elapsed,
            error: Some(SearchFailure::from(err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(elapsed.as_millis() as u64)
}

pub struct SearchGateway {
    registry: Arc<DriverRegistry>,
    index_name: String,
    prefix: String,
}

impl SearchGateway {
    pub fn new(registry: Arc<DriverRegistry>, index_name: &str, prefix: &str) -> Self {
        Self {
            registry,
            index_name: index_name.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Compile `filters` and execute. A rejected filter is reported in the
    /// result without touching the store.
    pub async fn search(
        &self,
        filters: &SearchFilters,
        page: Pagination,
        fields: FieldSet,
        driver: DriverKind,
    ) -> SearchResult {
        match compile(filters) {
            Ok(query) => self.execute(&query, page, fields, driver).await,
            Err(e) => {
                tracing::warn!("Rejected search filters: {}", e);
                SearchResult::failed(driver, String::new(), Duration::ZERO, &e)
            }
        }
    }

    pub async fn execute(
        &self,
        query: &CompiledQuery,
        page: Pagination,
        fields: FieldSet,
        driver: DriverKind,
    ) -> SearchResult {
        let query_text = query.to_string();

        let Some(store) = self.registry.get(driver).await else {
            let err = TrafficError::StoreUnavailable(format!("driver '{}' is not registered", driver));
            return SearchResult::failed(driver, query_text, Duration::ZERO, &err);
        };

        let request = SearchRequest {
            index: self.index_name.clone(),
            query: query_text.clone(),
            offset: page.offset,
            limit: page.limit,
            return_fields: fields.fields().iter().map(|f| f.to_string()).collect(),
        };

        let start = Instant::now();
        let reply = store.search(&request).await;

        match reply {
            Ok(reply) => {
                // Drivers time the store round trip themselves.
                let elapsed = reply.round_trip;
                tracing::debug!(
                    "{} driver matched {} for '{}' in {:?}",
                    driver,
                    reply.total,
                    query_text,
                    elapsed
                );
                SearchResult {
                    driver,
                    query: query_text,
                    total: reply.total,
                    records: reply
                        .documents
                        .into_iter()
                        .map(|doc| normalize(doc, &self.prefix))
                        .collect(),
                    elapsed,
                    error: None,
                }
            }
            Err(e) => {
                let elapsed = start.elapsed();
                match &e {
                    TrafficError::OffsetLimitExceeded(_) => tracing::warn!(
                        "{} driver refused window offset={} limit={}: {}",
                        driver,
                        page.offset,
                        page.limit,
                        e
                    ),
                    _ => tracing::warn!("{} driver failed '{}': {}", driver, query_text, e),
                }
                SearchResult::failed(driver, query_text, elapsed, &e)
            }
        }
    }

    /// Run one query on several drivers concurrently. One result per
    /// driver, in the order given, failures included.
    pub async fn compare(
        &self,
        query: &CompiledQuery,
        page: Pagination,
        fields: FieldSet,
        drivers: &[DriverKind],
    ) -> Vec<SearchResult> {
        let runs = drivers
            .iter()
            .map(|driver| self.execute(query, page, fields, *driver));
        futures::future::join_all(runs).await
    }
}

/// Fold any driver shape into an observation. Missing or unparseable
/// fields become empty strings / zero rather than failing the result set.
pub fn normalize(doc: RawDocument, prefix: &str) -> TrafficObservation {
    let props: HashMap<String, String> = match doc.fields {
        RawFields::FlatPairs(items) => items
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect(),
        RawFields::Map(map) => map,
        RawFields::Json(value) => value
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), json_text(v)))
                    .collect()
            })
            .unwrap_or_default(),
    };

    let text = |name: &str| props.get(name).cloned().unwrap_or_default();
    let count = |name: &str| props.get(name).map_or(0, |raw| parse_count(raw));

    let id = props.get(fields::ID).cloned().unwrap_or_else(|| {
        doc.key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(&doc.key)
            .to_string()
    });

    TrafficObservation {
        id,
        timestamp: text(fields::TIMESTAMP),
        latitude: text(fields::LATITUDE),
        longitude: text(fields::LONGITUDE),
        geohash: text(fields::GEOHASH),
        min_speed: count(fields::MIN_SPEED),
        max_speed: count(fields::MAX_SPEED),
        avg_speed: count(fields::AVG_SPEED),
        vehicle_count: count(fields::VEHICLE_COUNT),
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim();
    raw.parse::<u32>().unwrap_or_else(|_| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
            .map_or(0, |v| v as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;
    use crate::drivers::{RawSearchReply, RecordWrite, StoreDriver};
    use crate::schema::IndexSchemaManager;

    fn observation(id: &str, lat: &str, lon: &str, avg: u32, vehicles: u32) -> TrafficObservation {
        TrafficObservation {
            id: id.into(),
            timestamp: "2020-01-01 10:00:00".into(),
            latitude: lat.into(),
            longitude: lon.into(),
            geohash: "sxk9".into(),
            min_speed: 5,
            max_speed: 120,
            avg_speed: avg,
            vehicle_count: vehicles,
        }
    }

    async fn gateway_with(records: &[TrafficObservation], max_results: usize) -> SearchGateway {
        let store = Arc::new(MemoryStore::new(max_results));
        IndexSchemaManager::new(store.clone())
            .declare_index("idx", "traffic")
            .await
            .unwrap();
        let batch: Vec<RecordWrite> = records
            .iter()
            .map(|o| RecordWrite::for_observation("traffic", o))
            .collect();
        store.write_records(&batch).await.unwrap();

        let registry = Arc::new(DriverRegistry::new());
        registry.add(store).await;
        SearchGateway::new(registry, "idx", "traffic")
    }

    /// Answers every search with one document and a fixed round trip.
    struct FixedLatency;

    #[async_trait::async_trait]
    impl StoreDriver for FixedLatency {
        fn kind(&self) -> DriverKind {
            DriverKind::Pooled
        }
        async fn drop_index(&self, _name: &str) -> tq_core::Result<()> {
            Ok(())
        }
        async fn create_index(&self, _schema: &crate::schema::IndexSchema) -> tq_core::Result<()> {
            Ok(())
        }
        async fn describe_index(&self, _name: &str) -> tq_core::Result<Vec<crate::schema::IndexField>> {
            Ok(Vec::new())
        }
        async fn write_records(&self, _batch: &[RecordWrite]) -> tq_core::Result<()> {
            Ok(())
        }
        async fn set_cardinality(&self, _key: &str) -> tq_core::Result<u64> {
            Ok(0)
        }
        async fn set_members(&self, _key: &str) -> tq_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn search(&self, _request: &SearchRequest) -> tq_core::Result<RawSearchReply> {
            // Stands in for decoding work done after the reply arrived.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(RawSearchReply {
                total: 1,
                documents: vec![RawDocument {
                    key: "traffic:a".into(),
                    fields: RawFields::FlatPairs(vec!["averageSpeed".into(), "40".into()]),
                }],
                round_trip: Duration::from_millis(3),
            })
        }
    }

    #[tokio::test]
    async fn test_elapsed_is_the_store_round_trip() {
        let registry = Arc::new(DriverRegistry::new());
        registry.add(Arc::new(FixedLatency)).await;
        let gateway = SearchGateway::new(registry, "idx", "traffic");

        let result = gateway
            .execute(
                &CompiledQuery::match_all(),
                Pagination::default(),
                FieldSet::All,
                DriverKind::Pooled,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(result.elapsed, Duration::from_millis(3));
        assert_eq!(result.records[0].id, "a");
    }

    #[tokio::test]
    async fn test_geo_round_trip() {
        let gateway = gateway_with(
            &[
                observation("near", "41.08", "28.97", 40, 3),
                observation("far", "41.20", "29.20", 40, 3),
            ],
            10_000,
        )
        .await;

        let query = CompiledQuery::from_clauses(vec!["@location:[28.97 41.08 0.1 km]".into()]);
        let result = gateway
            .execute(&query, Pagination::default(), FieldSet::All, DriverKind::Memory)
            .await;
        assert!(result.is_ok());
        let ids: Vec<&str> = result.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
        assert_eq!(result.records[0], observation("near", "41.08", "28.97", 40, 3));
    }

    #[tokio::test]
    async fn test_malformed_coordinate_only_reachable_by_non_geo() {
        let gateway = gateway_with(
            &[
                observation("bad", "abc", "28.97", 40, 9),
                observation("good", "41.08", "28.97", 40, 9),
            ],
            10_000,
        )
        .await;

        let geo = SearchFilters::default().with_location("41.08", "28.97", "500");
        let result = gateway
            .search(&geo, Pagination::default(), FieldSet::All, DriverKind::Memory)
            .await;
        let ids: Vec<&str> = result.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);

        let by_count = SearchFilters::default().with_vehicle_count("9");
        let result = gateway
            .search(&by_count, Pagination::default(), FieldSet::All, DriverKind::Memory)
            .await;
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn test_total_exceeds_page() {
        let records: Vec<TrafficObservation> = (0..5)
            .map(|i| observation(&format!("r{}", i), "41.0", "29.0", 30 + i, 1))
            .collect();
        let gateway = gateway_with(&records, 10_000).await;

        let result = gateway
            .search(
                &SearchFilters::default().with_speed(Some("31"), None),
                Pagination::new(0, 2),
                FieldSet::Speed,
                DriverKind::Memory,
            )
            .await;
        assert_eq!(result.total, 4);
        assert_eq!(result.records.len(), 2);
        // Projection left position fields out; they default to empty.
        assert_eq!(result.records[0].latitude, "");
        assert!(result.records[0].avg_speed >= 31);
    }

    #[tokio::test]
    async fn test_offset_limit_exceeded_is_distinct_from_no_match() {
        let gateway = gateway_with(&[observation("a", "41.0", "29.0", 30, 1)], 100).await;

        let empty = gateway
            .search(
                &SearchFilters::default().with_vehicle_count("99"),
                Pagination::default(),
                FieldSet::All,
                DriverKind::Memory,
            )
            .await;
        assert!(empty.is_ok());
        assert_eq!(empty.total, 0);

        let refused = gateway
            .search(
                &SearchFilters::default(),
                Pagination::new(500, 10),
                FieldSet::All,
                DriverKind::Memory,
            )
            .await;
        assert!(!refused.is_ok());
        assert_eq!(refused.error_kind(), Some(ErrorKind::OffsetLimitExceeded));
    }

    #[tokio::test]
    async fn test_invalid_filter_never_reaches_store() {
        let gateway = gateway_with(&[], 100).await;
        let result = gateway
            .search(
                &SearchFilters::default().with_speed(Some("fast"), None),
                Pagination::default(),
                FieldSet::All,
                DriverKind::Memory,
            )
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidFilter));
        assert!(result.query.is_empty());
        assert_eq!(result.elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_compare_reports_every_driver() {
        let gateway = gateway_with(&[observation("a", "41.0", "29.0", 30, 1)], 100).await;
        let results = gateway
            .compare(
                &CompiledQuery::match_all(),
                Pagination::default(),
                FieldSet::All,
                &[DriverKind::Memory, DriverKind::Sync],
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].driver, DriverKind::Memory);
        assert_eq!(results[0].total, 1);
        assert_eq!(results[1].driver, DriverKind::Sync);
        assert_eq!(results[1].error_kind(), Some(ErrorKind::StoreUnavailable));
    }

    #[test]
    fn test_normalize_heterogeneous_shapes() {
        let flat = RawDocument {
            key: "traffic:x".into(),
            fields: RawFields::FlatPairs(vec![
                "averageSpeed".into(),
                "44".into(),
                "latitude".into(),
                "41.1".into(),
            ]),
        };
        let obs = normalize(flat, "traffic");
        assert_eq!(obs.id, "x");
        assert_eq!(obs.avg_speed, 44);
        assert_eq!(obs.latitude, "41.1");
        assert_eq!(obs.geohash, "");

        let map = RawDocument {
            key: "traffic:y".into(),
            fields: RawFields::Map(HashMap::from([
                ("id".to_string(), "y".to_string()),
                ("numberOfVehicles".to_string(), "12.0".to_string()),
                ("minimumSpeed".to_string(), "n/a".to_string()),
            ])),
        };
        let obs = normalize(map, "traffic");
        assert_eq!(obs.id, "y");
        assert_eq!(obs.vehicle_count, 12);
        assert_eq!(obs.min_speed, 0);

        let json = RawDocument {
            key: "traffic:z".into(),
            fields: RawFields::Json(serde_json::json!({
                "id": "z",
                "maximumSpeed": 130,
                "dateTime": "2020-02-02 00:00:00",
                "geohash": null
            })),
        };
        let obs = normalize(json, "traffic");
        assert_eq!(obs.max_speed, 130);
        assert_eq!(obs.timestamp, "2020-02-02 00:00:00");
        assert_eq!(obs.geohash, "");
    }

    #[test]
    fn test_result_serializes_elapsed_ms() {
        let result = SearchResult {
            driver: DriverKind::Pooled,
            query: "*".into(),
            total: 0,
            records: Vec::new(),
            elapsed: Duration::from_millis(42),
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["elapsed_ms"], 42);
        assert_eq!(json["driver"], "pooled");
        assert!(json["error"].is_null());
    }
}
