//! # In-process store
//!
//! Hashes, sets, and index definitions held in memory, with search
//! evaluated by [`crate::query::executor`] over the same query surface the
//! Redis drivers send to the server. Used by tests and offline runs.
//!
//! Like the server, search scans live hashes under the index prefix, so
//! documents written before an index was (re)declared are found.

use super::{DriverKind, RawDocument, RawFields, RawSearchReply, RecordWrite, SearchRequest, StoreDriver};
use crate::query::{executor, parser};
use crate::schema::{FieldType, IndexField, IndexSchema};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tq_core::{Result, TrafficError};

pub struct MemoryStore {
    hashes: RwLock<BTreeMap<String, HashMap<String, String>>>,
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
    indexes: RwLock<HashMap<String, IndexSchema>>,
    /// Largest `offset + limit` a search may ask for.
    max_results: usize,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new(max_results: usize) -> Self {
        Self {
            hashes: RwLock::new(BTreeMap::new()),
            sets: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            max_results,
            online: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub async fn hash(&self, key: &str) -> Option<HashMap<String, String>> {
        self.hashes.read().await.get(key).cloned()
    }

    pub async fn hash_count(&self) -> usize {
        self.hashes.read().await.len()
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(TrafficError::StoreUnavailable(
                "memory store is offline".into(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait::async_trait]
impl StoreDriver for MemoryStore {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.check_online()?;
        match self.indexes.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(TrafficError::Query("Unknown Index name".into())),
        }
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        self.check_online()?;
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&schema.name) {
            return Err(TrafficError::Query("Index already exists".into()));
        }
        indexes.insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<Vec<IndexField>> {
        self.check_online()?;
        self.indexes
            .read()
            .await
            .get(name)
            .map(|schema| schema.fields.clone())
            .ok_or_else(|| TrafficError::Query("Unknown Index name".into()))
    }

    async fn write_records(&self, batch: &[RecordWrite]) -> Result<()> {
        self.check_online()?;
        let mut hashes = self.hashes.write().await;
        let mut sets = self.sets.write().await;
        for write in batch {
            let hash = hashes.entry(write.key.clone()).or_default();
            for (name, value) in &write.fields {
                hash.insert(name.clone(), value.clone());
            }
            for (set, member) in &write.set_adds {
                sets.entry(set.clone()).or_default().insert(member.clone());
            }
        }
        Ok(())
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.check_online()?;
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map_or(0, |members| members.len() as u64))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check_online()?;
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn search(&self, request: &SearchRequest) -> Result<RawSearchReply> {
        let start = Instant::now();
        self.check_online()?;
        let schema = self
            .indexes
            .read()
            .await
            .get(&request.index)
            .cloned()
            .ok_or_else(|| TrafficError::Query(format!("{}: no such index", request.index)))?;

        let clauses = parser::parse(&request.query).map_err(TrafficError::Query)?;
        for clause in &clauses {
            if let Some(field) = clause.field() {
                if schema.field_type(field).is_none() {
                    return Err(TrafficError::Query(format!("Unknown field '@{}'", field)));
                }
            }
        }

        if request.offset.saturating_add(request.limit) > self.max_results {
            return Err(TrafficError::OffsetLimitExceeded(format!(
                "OFFSET exceeds maximum of {}",
                self.max_results
            )));
        }

        let prefix = schema.key_prefix();
        let hashes = self.hashes.read().await;
        let matching: Vec<(&String, &HashMap<String, String>)> = hashes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, doc)| executor::matches(doc, &clauses))
            .collect();

        let total = matching.len() as i64;
        let round_trip = start.elapsed();
        let documents = matching
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(key, doc)| RawDocument {
                key: key.clone(),
                fields: RawFields::Json(project(doc, &request.return_fields, &schema)),
            })
            .collect();

        Ok(RawSearchReply {
            total,
            documents,
            round_trip,
        })
    }
}

/// JSON view of a stored hash. Integral numeric index fields become JSON
/// numbers; coordinates keep their stored text.
fn project(
    doc: &HashMap<String, String>,
    return_fields: &[String],
    schema: &IndexSchema,
) -> serde_json::Value {
    let mut names: Vec<&String> = if return_fields.is_empty() {
        doc.keys().collect()
    } else {
        return_fields.iter().filter(|f| doc.contains_key(*f)).collect()
    };
    names.sort();

    let mut object = serde_json::Map::new();
    for name in names {
        let raw = &doc[name];
        let value = match (schema.field_type(name), raw.parse::<i64>()) {
            (Some(FieldType::Numeric), Ok(n)) => serde_json::Value::from(n),
            _ => serde_json::Value::String(raw.clone()),
        };
        object.insert(name.clone(), value);
    }
    serde_json::Value::Object(object)
}
