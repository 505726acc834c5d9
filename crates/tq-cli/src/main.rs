//! # tq
//!
//! Job control surface for the traffic index.
//!
//! - `tq declare-index` (re)creates the secondary index.
//! - `tq import <path>` runs a chunked import and prints its report.
//! - `tq compile` / `tq search` / `tq compare` build and run filter queries.
//! - `tq lookup <axis> <value>` reads the coordinate lookup sets.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tq_core::{Config, DriverKind, ParseErrorPolicy, TrafficObservation};
use tq_engine::drivers::memory::MemoryStore;
use tq_engine::query::DistanceUnit;
use tq_engine::{
    BulkIndexer, DriverRegistry, FieldSet, IndexSchemaManager, JobManager, JobStatus, LookupIndex,
    Pagination, SearchFilters, SearchGateway, SearchResult,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Index, import, and search point-in-time traffic observations.
#[derive(Parser)]
#[command(name = "tq", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Missing means defaults.
    #[arg(long, global = true, default_value = "tq.toml")]
    config: PathBuf,

    /// Store driver. Defaults to `search.default_driver`.
    #[arg(long, global = true)]
    driver: Option<DriverKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the secondary index.
    DeclareIndex {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Import a CSV file in chunks.
    Import {
        path: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        ceiling: Option<u64>,
        /// Stop at the first unparseable row instead of skipping it.
        #[arg(long)]
        abort_on_parse_error: bool,
        #[arg(long)]
        json: bool,
    },

    /// Print the compiled query for a set of filters.
    Compile {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Run a filter query on one driver.
    Search {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        json: bool,
    },

    /// Run the same query on every registered driver.
    Compare {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        json: bool,
    },

    /// List ids recorded under an exact coordinate value.
    Lookup { axis: Axis, value: String },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<String>,
    #[arg(long)]
    radius: Option<String>,
    #[arg(long)]
    unit: Option<DistanceUnit>,
    #[arg(long, allow_hyphen_values = true)]
    min_speed: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    max_speed: Option<String>,
    #[arg(long)]
    vehicle_count: Option<String>,
    /// Fuzzy instead of wildcard matching for lone coordinates.
    #[arg(long)]
    fuzzy: bool,
}

impl From<FilterArgs> for SearchFilters {
    fn from(args: FilterArgs) -> Self {
        SearchFilters {
            latitude: args.latitude,
            longitude: args.longitude,
            radius: args.radius,
            unit: args.unit,
            min_speed: args.min_speed,
            max_speed: args.max_speed,
            vehicle_count: args.vehicle_count,
            fuzzy: args.fuzzy,
        }
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Defaults to `search.default_limit`.
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long, default_value = "all")]
    fields: FieldSet,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Axis {
    Latitude,
    Longitude,
}

#[derive(Tabled)]
struct RecordRow {
    id: String,
    #[tabled(rename = "dateTime")]
    timestamp: String,
    latitude: String,
    longitude: String,
    geohash: String,
    #[tabled(rename = "min")]
    min_speed: u32,
    #[tabled(rename = "max")]
    max_speed: u32,
    #[tabled(rename = "avg")]
    avg_speed: u32,
    #[tabled(rename = "vehicles")]
    vehicle_count: u32,
}

impl From<&TrafficObservation> for RecordRow {
    fn from(o: &TrafficObservation) -> Self {
        Self {
            id: o.id.clone(),
            timestamp: o.timestamp.clone(),
            latitude: o.latitude.clone(),
            longitude: o.longitude.clone(),
            geohash: o.geohash.clone(),
            min_speed: o.min_speed,
            max_speed: o.max_speed,
            avg_speed: o.avg_speed,
            vehicle_count: o.vehicle_count,
        }
    }
}

#[derive(Tabled)]
struct DriverRow {
    driver: String,
    total: i64,
    returned: usize,
    elapsed_ms: u128,
    error: String,
}

impl From<&SearchResult> for DriverRow {
    fn from(r: &SearchResult) -> Self {
        Self {
            driver: r.driver.to_string(),
            total: r.total,
            returned: r.records.len(),
            elapsed_ms: r.elapsed.as_millis(),
            error: r
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tq_engine=info,tq=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let kind = cli.driver.unwrap_or(config.search.default_driver);

    // The memory driver lives only as long as this process.
    let registry = Arc::new(
        DriverRegistry::from_config(&config.store)
            .await?
            .with_memory(Arc::new(MemoryStore::new(config.search.max_results)))
            .await,
    );
    let driver = registry
        .get(kind)
        .await
        .ok_or_else(|| format!("driver '{}' is not registered", kind))?;

    match cli.command {
        Commands::DeclareIndex { name, prefix } => {
            let name = name.unwrap_or_else(|| config.store.index_name.clone());
            let prefix = prefix.unwrap_or_else(|| config.store.prefix.clone());
            let manager = IndexSchemaManager::new(driver);
            let schema = manager.declare_index(&name, &prefix).await?;
            println!("Index '{}' on '{}'", schema.name, schema.key_prefix());
            for field in manager.describe(&schema.name).await? {
                println!("  {:<18} {}", field.name, field.field_type);
            }
        }

        Commands::Import {
            path,
            chunk_size,
            ceiling,
            abort_on_parse_error,
            json,
        } => {
            let mut ingest = config.ingest.clone();
            if let Some(size) = chunk_size {
                ingest.chunk_size = size;
            }
            if let Some(ceiling) = ceiling {
                ingest.ceiling = ceiling;
            }
            if abort_on_parse_error {
                ingest.on_parse_error = ParseErrorPolicy::Abort;
            }
            if ingest.chunk_size == 0 {
                return Err("--chunk-size must be > 0".into());
            }

            let indexer = BulkIndexer::new(driver, &config.store.prefix, ingest);
            let jobs = JobManager::new();
            let job = jobs.submit_import(&indexer, &path).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                println!("Job {}: {}", job.id, job.status);
                if let Some(report) = jobs.get_report(&job.id).await {
                    println!(
                        "  read {}  committed {}  skipped {}  failed {}  chunks {}  {} ms",
                        report.rows_read,
                        report.rows_committed,
                        report.rows_skipped,
                        report.rows_failed,
                        report.chunks.len(),
                        report.elapsed_ms
                    );
                }
                if let Some(error) = &job.error {
                    println!("  {}: {}", error.kind, error.message);
                }
            }
            if job.status == JobStatus::Failed {
                return Err(format!("import job {} failed", job.id).into());
            }
        }

        Commands::Compile { filters } => {
            let query = tq_engine::compile(&filters.into())?;
            println!("{}", query);
        }

        Commands::Search {
            filters,
            page,
            json,
        } => {
            let gateway = SearchGateway::new(registry.clone(), &config.store.index_name, &config.store.prefix);
            let pagination = Pagination::new(
                page.offset,
                page.limit.unwrap_or(config.search.default_limit),
            );
            let result = gateway
                .search(&filters.into(), pagination, page.fields, kind)
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.is_ok() {
                let rows: Vec<RecordRow> = result.records.iter().map(RecordRow::from).collect();
                println!("{}", Table::new(rows).with(Style::modern()));
                println!(
                    "{} of {} via {} in {} ms: {}",
                    result.records.len(),
                    result.total,
                    result.driver,
                    result.elapsed.as_millis(),
                    result.query
                );
            }
            if let Some(error) = result.error {
                return Err(format!("{}: {}", error.kind, error.message).into());
            }
        }

        Commands::Compare {
            filters,
            page,
            json,
        } => {
            let query = tq_engine::compile(&filters.into())?;
            let gateway = SearchGateway::new(registry.clone(), &config.store.index_name, &config.store.prefix);
            let pagination = Pagination::new(
                page.offset,
                page.limit.unwrap_or(config.search.default_limit),
            );
            let drivers = registry.list().await;
            let results = gateway
                .compare(&query, pagination, page.fields, &drivers)
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{}", query);
                let rows: Vec<DriverRow> = results.iter().map(DriverRow::from).collect();
                println!("{}", Table::new(rows).with(Style::modern()));
            }
        }

        Commands::Lookup { axis, value } => {
            let lookup = LookupIndex::new(driver, &config.store.prefix);
            let ids = match axis {
                Axis::Latitude => lookup.ids_by_latitude(&value).await?,
                Axis::Longitude => lookup.ids_by_longitude(&value).await?,
            };
            for id in &ids {
                println!("{}", id);
            }
            tracing::info!("{} ids for {:?} = {}", ids.len(), axis, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "tq",
            "--driver",
            "memory",
            "search",
            "--min-speed",
            "50",
            "--fields",
            "speed",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.driver, Some(DriverKind::Memory));
        let Commands::Search { filters, page, json } = cli.command else {
            panic!("expected search");
        };
        assert!(!json);
        assert_eq!(page.fields, FieldSet::Speed);
        assert_eq!(page.limit, Some(5));
        let filters: SearchFilters = filters.into();
        assert_eq!(
            tq_engine::compile(&filters).unwrap().to_string(),
            "@averageSpeed:[50 +inf]"
        );
    }

    #[test]
    fn test_compile_args_with_unit() {
        let cli = Cli::try_parse_from([
            "tq",
            "compile",
            "--latitude",
            "41.076",
            "--longitude",
            "28.887",
            "--radius",
            "500",
            "--unit",
            "m",
        ])
        .unwrap();
        let Commands::Compile { filters } = cli.command else {
            panic!("expected compile");
        };
        let query = tq_engine::compile(&filters.into()).unwrap();
        assert_eq!(query.to_string(), "@location:[28.887 41.076 500 m]");
    }

    #[test]
    fn test_negative_coordinate_is_a_value() {
        let cli = Cli::try_parse_from(["tq", "compile", "--longitude", "-3.7"]).unwrap();
        let Commands::Compile { filters } = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(filters.longitude.as_deref(), Some("-3.7"));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        assert!(Cli::try_parse_from(["tq", "--driver", "mongo", "compile"]).is_err());
    }

    #[test]
    fn test_lookup_args() {
        let cli = Cli::try_parse_from(["tq", "lookup", "longitude", "28.97"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Lookup {
                axis: Axis::Longitude,
                ..
            }
        ));
        assert_eq!(cli.config, PathBuf::from("tq.toml"));
    }
}
