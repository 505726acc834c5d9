//! # tq-engine
//!
//! Index declaration, chunked bulk ingestion, query compilation, and
//! multi-driver search over traffic observations.

pub mod drivers;
pub mod gateway;
pub mod ingest;
pub mod jobs;
pub mod lookup;
pub mod query;
pub mod schema;

pub use drivers::registry::DriverRegistry;
pub use drivers::{DriverKind, StoreDriver};
pub use gateway::{SearchGateway, SearchResult};
pub use ingest::{BulkIndexer, ImportReport};
pub use jobs::{JobManager, JobStatus};
pub use lookup::LookupIndex;
pub use query::{compile, CompiledQuery, FieldSet, Pagination, SearchFilters};
pub use schema::IndexSchemaManager;
