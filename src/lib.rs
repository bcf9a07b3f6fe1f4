pub mod align;
pub mod client;
pub mod config;
pub mod error;
pub mod importer;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;
pub mod settings;

pub use client::{DatadogClient, MetricsQueryService};
pub use config::{ConfigMap, QueryPlan};
pub use error::{ImporterError, Result, ServiceError};
pub use importer::DatadogImporter;
pub use models::{InputRow, PluginMetadata, QueryResponse, Row, Series, SeriesPoint};
