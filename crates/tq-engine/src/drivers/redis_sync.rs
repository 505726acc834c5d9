//! # Low-level synchronous driver
//!
//! Blocking `redis::Connection`, opened for a single call and dropped when
//! the call returns. Calls run on tokio's blocking pool so the async
//! callers are never stalled.

use super::commands::{self, classify};
use super::{DriverKind, RawDocument, RawFields, RawSearchReply, RecordWrite, SearchRequest, StoreDriver};
use crate::schema::{IndexField, IndexSchema};
use std::time::Instant;
use tq_core::{Result, StoreConfig, TrafficError};

pub struct RedisSyncDriver {
    client: redis::Client,
}

impl RedisSyncDriver {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url()).map_err(classify)?;
        Ok(Self { client })
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut con = client.get_connection()?;
            op(&mut con)
        })
        .await
        .map_err(|e| TrafficError::StoreUnavailable(format!("blocking call aborted: {}", e)))?
        .map_err(classify)
    }
}

#[async_trait::async_trait]
impl StoreDriver for RedisSyncDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sync
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let cmd = commands::drop_index(name);
        self.run(move |con| cmd.query::<()>(con)).await
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let cmd = commands::create_index(schema);
        self.run(move |con| cmd.query::<()>(con)).await
    }

    async fn describe_index(&self, name: &str) -> Result<Vec<IndexField>> {
        let cmd = commands::index_info(name);
        let reply = self.run(move |con| cmd.query::<redis::Value>(con)).await?;
        commands::decode_info_fields(reply)
    }

    async fn write_records(&self, batch: &[RecordWrite]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let pipe = commands::write_batch(batch);
        self.run(move |con| pipe.query::<()>(con)).await
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        let mut cmd = redis::cmd("SCARD");
        cmd.arg(key);
        self.run(move |con| cmd.query::<u64>(con)).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        let mut members = self.run(move |con| cmd.query::<Vec<String>>(con)).await?;
        members.sort();
        Ok(members)
    }

    async fn search(&self, request: &SearchRequest) -> Result<RawSearchReply> {
        let cmd = commands::search(request);
        let start = Instant::now();
        let reply = self.run(move |con| cmd.query::<redis::Value>(con)).await?;
        let round_trip = start.elapsed();
        let (total, documents) = commands::decode_search(reply)?;
        Ok(RawSearchReply {
            total,
            documents: documents
                .into_iter()
                .map(|(key, pairs)| RawDocument {
                    key,
                    fields: RawFields::FlatPairs(pairs),
                })
                .collect(),
            round_trip,
        })
    }
}
