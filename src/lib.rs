//! # scrobbledb
//!
//! Scrobble analytics engine: charts, trend series, medals and artist
//! reconciliation over a personal listening history.
//!
//! ## Modules
//!
//! - [`store`]: Scrobble store contract and in-memory reference store
//! - [`query`]: Time-range resolution and chart aggregation
//! - [`cache`]: Memoized aggregates with time-aware invalidation
//! - [`ledger`]: Yearly medals and weekly number-one counts
//! - [`reconcile`]: Duplicate and combined artist detection
//! - [`service`]: Query facade the CLI and other front ends call
//! - [`import`]: CSV history import
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scrobbledb::query::RangeOptions;
//! use scrobbledb::service::{ScrobbleService, ScrobbleSubmission, ServiceConfig};
//! use scrobbledb::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let service = ScrobbleService::new(store, ServiceConfig::default());
//!     service.start().await?;
//!
//!     service
//!         .submit_scrobble(ScrobbleSubmission::new(["Queen"], "Innuendo"))
//!         .await?;
//!
//!     // Artist chart for the last 7 days
//!     let chart = service
//!         .chart_artists(&RangeOptions::default().within("7d"))
//!         .await?;
//!     for entry in chart {
//!         println!("#{} {} ({})", entry.rank, entry.entity, entry.count);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod import;
pub mod ledger;
pub mod query;
pub mod reconcile;
pub mod service;
pub mod store;

// Re-export top-level types for convenience
pub use store::{
    normalize_name, Album, MemoryStore, Scrobble, ScrobbleStore, StoreError, StoreResult, Track,
    TrackKey,
};

pub use query::{
    ChartAggregator, ChartEntry, ChartFilter, QueryError, QueryResult, RangeOptions, StepUnit,
    TimeRangeResolver, TimeWindow,
};

pub use cache::{CacheConfig, CacheLayer, CacheStats};

pub use ledger::{MedalLedger, Medals};

pub use reconcile::{ArtistReconciler, IssueReport};

pub use service::{
    ScrobbleService, ScrobbleSubmission, ServiceConfig, ServiceError, ServiceResult,
    ServiceStatus,
};

pub use config::{Config, ConfigError, LoggingConfig, StoreConfig};

pub use import::{CsvImportResult, CsvImporter, ImportError, ImportResult};
