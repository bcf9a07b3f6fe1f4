//! Metrics service abstraction and the Datadog HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ImporterError, ServiceError};
use crate::models::QueryResponse;
use crate::settings::Settings;

/// The remote time-series API the importer reads from.
#[async_trait]
pub trait MetricsQueryService: Send + Sync {
    /// Runs `query` over `[from, to]`, both in epoch seconds.
    async fn query_metrics(
        &self,
        query: &str,
        from: i64,
        to: i64,
    ) -> Result<QueryResponse, ServiceError>;

    /// Succeeds when `metric_name` is known to the service.
    async fn get_metric_metadata(&self, metric_name: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Datadog v1 metrics API client.
pub struct DatadogClient {
    base_url: String,
    api_key: Option<String>,
    app_key: Option<String>,
    http_client: HttpClient,
}

impl DatadogClient {
    pub fn new(settings: &Settings) -> Result<Self, ImporterError> {
        let http_client = HttpClient::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ImporterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.api_base_url(),
            api_key: settings.api_key.clone(),
            app_key: settings.app_key.clone(),
            http_client,
        })
    }

    /// Points the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> Result<Url, ServiceError> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| ServiceError::Transport(format!("invalid URL '{}': {}", raw, e)))
    }

    /// Metadata endpoint for `metric_name`, with the name encoded as a single
    /// path segment.
    fn metric_metadata_url(&self, metric_name: &str) -> Result<Url, ServiceError> {
        let mut url = self.url("/api/v1/metrics")?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport(format!("cannot append path to '{}'", self.base_url)))?
            .push(metric_name);
        Ok(url)
    }

    async fn get(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, ServiceError> {
        let path = url.path().to_string();
        let mut request = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .query(params);

        if let Some(key) = &self.api_key {
            request = request.header("DD-API-KEY", key);
        }
        if let Some(key) = &self.app_key {
            request = request.header("DD-APPLICATION-KEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, &path))
    }
}

/// Maps a non-success HTTP status and body to a service error.
fn status_error(status: StatusCode, body: &str, path: &str) -> ServiceError {
    if status == StatusCode::NOT_FOUND {
        return ServiceError::NotFound(path.to_string());
    }

    let errors = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.errors)
        .unwrap_or_default();
    let errors = if errors.is_empty() && !body.is_empty() {
        vec![body.to_string()]
    } else {
        errors
    };

    ServiceError::Api {
        status: status.as_u16(),
        errors,
    }
}

/// Rejects payloads the API reports as failed despite a success status.
fn check_query_status(response: QueryResponse) -> Result<QueryResponse, ServiceError> {
    if response.status.as_deref() == Some("error") {
        return Err(ServiceError::Api {
            status: StatusCode::OK.as_u16(),
            errors: vec![response.error.unwrap_or_else(|| "query failed".to_string())],
        });
    }
    Ok(response)
}

#[async_trait]
impl MetricsQueryService for DatadogClient {
    async fn query_metrics(
        &self,
        query: &str,
        from: i64,
        to: i64,
    ) -> Result<QueryResponse, ServiceError> {
        debug!(query, from, to, "Querying metrics");
        let params = [
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("query", query.to_string()),
        ];
        let response = self.get(self.url("/api/v1/query")?, &params).await?;
        let body: QueryResponse = response.json().await?;
        check_query_status(body)
    }

    async fn get_metric_metadata(&self, metric_name: &str) -> Result<(), ServiceError> {
        debug!(metric = metric_name, "Fetching metric metadata");
        let url = self.metric_metadata_url(metric_name)?;
        self.get(url, &[]).await?;
        Ok(())
    }
}
