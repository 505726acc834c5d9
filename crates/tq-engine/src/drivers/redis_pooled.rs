//! # High-level pooled driver
//!
//! A multiplexed `ConnectionManager`, established on first use and shared
//! by cheap clones across concurrent calls. Reconnects are handled by the
//! manager itself.

use super::commands::{self, classify};
use super::{DriverKind, RawDocument, RawFields, RawSearchReply, RecordWrite, SearchRequest, StoreDriver};
use crate::schema::{IndexField, IndexSchema};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::OnceCell;
use tq_core::{Result, StoreConfig};

pub struct RedisPooledDriver {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisPooledDriver {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url()).map_err(classify)?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                tracing::debug!("Opening pooled store connection");
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(classify)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait::async_trait]
impl StoreDriver for RedisPooledDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Pooled
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut con = self.connection().await?;
        commands::drop_index(name)
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(classify)
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let mut con = self.connection().await?;
        commands::create_index(schema)
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(classify)
    }

    async fn describe_index(&self, name: &str) -> Result<Vec<IndexField>> {
        let mut con = self.connection().await?;
        let reply = commands::index_info(name)
            .query_async::<_, redis::Value>(&mut con)
            .await
            .map_err(classify)?;
        commands::decode_info_fields(reply)
    }

    async fn write_records(&self, batch: &[RecordWrite]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut con = self.connection().await?;
        commands::write_batch(batch)
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(classify)
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        let mut con = self.connection().await?;
        redis::cmd("SCARD")
            .arg(key)
            .query_async::<_, u64>(&mut con)
            .await
            .map_err(classify)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut con = self.connection().await?;
        let mut members = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async::<_, Vec<String>>(&mut con)
            .await
            .map_err(classify)?;
        members.sort();
        Ok(members)
    }

    async fn search(&self, request: &SearchRequest) -> Result<RawSearchReply> {
        let start = Instant::now();
        let mut con = self.connection().await?;
        let reply = commands::search(request)
            .query_async::<_, redis::Value>(&mut con)
            .await
            .map_err(classify)?;
        let round_trip = start.elapsed();
        let (total, documents) = commands::decode_search(reply)?;
        Ok(RawSearchReply {
            total,
            documents: documents
                .into_iter()
                .map(|(key, pairs)| RawDocument {
                    key,
                    fields: RawFields::Map(pairs_to_map(pairs)),
                })
                .collect(),
            round_trip,
        })
    }
}

fn pairs_to_map(pairs: Vec<String>) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(pairs.len() / 2);
    let mut iter = pairs.into_iter();
    while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        map.insert(name, value);
    }
    map
}
