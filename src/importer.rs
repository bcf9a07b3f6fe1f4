//! The importer plugin: resolves config once, then turns each input row into
//! one output row per returned data point.

use tracing::{error, info, warn};

use crate::align::{merge_by_index, rows_from_response};
use crate::client::MetricsQueryService;
use crate::config::{ConfigMap, QueryPlan, RawQueryPlan, TemplatedPlan};
use crate::error::{ImporterError, Result};
use crate::metrics::{self, QueryTimer};
use crate::models::{InputRow, PluginMetadata, QueryResponse, Row, DURATION_ROLLUP_FIELD};
use crate::query::{build_templated_query, substitute_placeholders, value_to_string};

pub const PLUGIN_KIND: &str = "execute";

pub struct DatadogImporter<S> {
    plan: QueryPlan,
    service: S,
}

impl<S: MetricsQueryService> DatadogImporter<S> {
    /// Validates `config` and binds the plugin to a metrics service.
    pub fn configure(config: &ConfigMap, service: S) -> Result<Self> {
        let plan = QueryPlan::resolve(config)?;
        Ok(Self { plan, service })
    }

    pub fn metadata() -> PluginMetadata {
        PluginMetadata {
            kind: PLUGIN_KIND.to_string(),
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Queries the service for every input row and returns the flattened rows,
    /// in input order, then metric order, then point order.
    ///
    /// Only configuration errors fail the call. Invalid rows and failed
    /// queries are logged and contribute no rows.
    pub async fn execute(&self, inputs: &[Row]) -> Result<Vec<Row>> {
        if let QueryPlan::Templated(plan) = &self.plan {
            self.ensure_metrics_exist(plan).await?;
        }

        let mut outputs = Vec::new();

        for fields in inputs {
            let input = match InputRow::try_from(fields.clone()) {
                Ok(input) => input,
                Err(e) => {
                    error!("Skipping input row: {}", e);
                    continue;
                }
            };

            let rows = match &self.plan {
                QueryPlan::Templated(plan) => self.import_templated(plan, &input).await,
                QueryPlan::RawQuery(plan) => self.import_raw(plan, &input).await,
            };

            metrics::record_rows_emitted(rows.len());
            outputs.extend(rows);
        }

        info!(rows = outputs.len(), "Import finished");
        Ok(outputs)
    }

    async fn ensure_metrics_exist(&self, plan: &TemplatedPlan) -> Result<()> {
        for column in &plan.metrics {
            if let Err(e) = self.service.get_metric_metadata(&column.metric).await {
                let message = if e.is_not_found() {
                    format!("Metric {} does not exist", column.metric)
                } else {
                    format!("Error determining if metric {} exists: {}", column.metric, e)
                };
                return Err(ImporterError::Config(message));
            }
        }
        Ok(())
    }

    async fn import_raw(&self, plan: &RawQueryPlan, input: &InputRow) -> Vec<Row> {
        let substitution = substitute_placeholders(&plan.query, input.fields(), &plan.params);
        for name in &substitution.missing {
            warn!(placeholder = name.as_str(), "Placeholder <{}> not found in input or config", name);
        }

        match self.run_query(&substitution.query, input).await {
            Some(response) => {
                rows_from_response(&response, input, &plan.tags, &plan.output_metric_name)
            }
            None => Vec::new(),
        }
    }

    async fn import_templated(&self, plan: &TemplatedPlan, input: &InputRow) -> Vec<Row> {
        let id_value = match input.get(&plan.id_field) {
            Some(value) if !value.is_null() => value_to_string(value),
            _ => {
                error!("Skipping input row: identifier field '{}' is missing", plan.id_field);
                return Vec::new();
            }
        };
        let tag_names = plan.tag_names();
        let rollup = input.get(DURATION_ROLLUP_FIELD);

        let mut rows = Vec::new();
        for (i, column) in plan.metrics.iter().enumerate() {
            let query =
                build_templated_query(&column.metric, &plan.id_tag, &id_value, &tag_names, rollup);

            let Some(response) = self.run_query(&query, input).await else {
                continue;
            };

            if i == 0 {
                rows = rows_from_response(&response, input, &plan.tags, &column.output_name);
            } else {
                merge_by_index(&response, &mut rows, &column.output_name);
            }
        }
        rows
    }

    /// Runs one query over the input window; failures are logged and absorbed.
    async fn run_query(&self, query: &str, input: &InputRow) -> Option<QueryResponse> {
        let _timer = QueryTimer::new();
        let from = input.window_start_secs();
        let to = input.window_end_secs();

        match self.service.query_metrics(query, from, to).await {
            Ok(response) => Some(response),
            Err(e) => {
                metrics::record_query_failure();
                error!(query, "Error executing query \"{}\": {}", query, e);
                None
            }
        }
    }
}
