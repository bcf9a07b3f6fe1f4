//! Plugin configuration resolution.
//!
//! Turns the flat, string-keyed plugin config into a [`QueryPlan`]. Every
//! rule is checked and all violations are reported together in one
//! [`ImporterError::Config`].

use serde_json::Value;
use std::collections::HashSet;

use crate::error::{ImporterError, Result};
use crate::models::Row;

/// Plugin config as handed over by the pipeline.
pub type ConfigMap = Row;

pub const RAW_QUERY: &str = "raw-query";
pub const OUTPUT_METRIC_NAME: &str = "output-metric-name";
pub const OUTPUT_METRIC_NAMES: &str = "output-metric-names";
pub const METRICS: &str = "metrics";
pub const TAGS: &str = "tags";
pub const OUTPUT_TAG_NAMES: &str = "output-tag-names";
pub const AGGREGATION_TAGS: &str = "aggregation-tags";
pub const AGGREGATION_TAG_OUTPUT_NAMES: &str = "aggregation-tag-output-names";
pub const ID_TAG: &str = "id-tag";
pub const ID_FIELD: &str = "id-field";

const DEFAULT_ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricColumn {
    pub metric: String,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagColumn {
    pub tag: String,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplatedPlan {
    pub metrics: Vec<MetricColumn>,
    pub tags: Vec<TagColumn>,
    /// Input row field carrying the identifier value
    pub id_field: String,
    /// Tag the identifier is matched against in the query scope
    pub id_tag: String,
}

impl TemplatedPlan {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.tag.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawQueryPlan {
    pub query: String,
    pub output_metric_name: String,
    pub tags: Vec<TagColumn>,
    /// Config the plan was built from, consulted for `<placeholder>` values
    pub params: ConfigMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Templated(TemplatedPlan),
    RawQuery(RawQueryPlan),
}

impl QueryPlan {
    /// Validates `config` and derives the query plan.
    pub fn resolve(config: &ConfigMap) -> Result<QueryPlan> {
        if config.is_empty() {
            return Err(ImporterError::Config("Config is not provided.".to_string()));
        }

        let mut violations = Violations::default();

        let plan = match optional_string(config, RAW_QUERY, &mut violations) {
            Some(query) => resolve_raw_query(config, query, &mut violations),
            None => resolve_templated(config, &mut violations),
        };

        violations.into_result()?;
        plan.ok_or_else(|| ImporterError::Config("Config could not be resolved.".to_string()))
    }

    pub fn is_raw_query(&self) -> bool {
        matches!(self, QueryPlan::RawQuery(_))
    }
}

fn resolve_raw_query(
    config: &ConfigMap,
    query: String,
    violations: &mut Violations,
) -> Option<QueryPlan> {
    let (key, names) = match optional_string(config, OUTPUT_METRIC_NAME, violations) {
        Some(names) => (OUTPUT_METRIC_NAME, Some(names)),
        None => (
            OUTPUT_METRIC_NAMES,
            optional_string(config, OUTPUT_METRIC_NAMES, violations),
        ),
    };

    let output_metric_name = match names.map(|names| split_list(&names)) {
        None => {
            violations.push(format!("{} is required when using {}.", key, RAW_QUERY));
            None
        }
        Some(mut names) if names.len() == 1 => names.pop(),
        Some(_) => {
            violations.push(format!(
                "{} must contain exactly one item when using {}.",
                key, RAW_QUERY
            ));
            None
        }
    };

    let tags = tag_columns(config, AGGREGATION_TAGS, AGGREGATION_TAG_OUTPUT_NAMES, violations);

    Some(QueryPlan::RawQuery(RawQueryPlan {
        query,
        output_metric_name: output_metric_name?,
        tags,
        params: config.clone(),
    }))
}

fn resolve_templated(config: &ConfigMap, violations: &mut Violations) -> Option<QueryPlan> {
    let metrics = optional_string(config, METRICS, violations);
    let output_names = optional_string(config, OUTPUT_METRIC_NAMES, violations);

    let metric_columns = match (metrics, output_names) {
        (Some(metrics), Some(output_names)) => {
            let metrics = split_list(&metrics);
            let output_names = split_list(&output_names);
            if metrics.len() != output_names.len() {
                violations.push(format!(
                    "{} and {} length must be equal.",
                    METRICS, OUTPUT_METRIC_NAMES
                ));
            }
            if has_duplicates(&output_names) {
                violations.push(format!("{} contains duplicate values.", OUTPUT_METRIC_NAMES));
            }
            metrics
                .into_iter()
                .zip(output_names)
                .map(|(metric, output_name)| MetricColumn {
                    metric,
                    output_name,
                })
                .collect()
        }
        _ => {
            violations.push(format!(
                "{} and {} are required when {} is not provided.",
                METRICS, OUTPUT_METRIC_NAMES, RAW_QUERY
            ));
            Vec::new()
        }
    };

    let tags = tag_columns(config, TAGS, OUTPUT_TAG_NAMES, violations);

    let id_field = optional_string(config, ID_FIELD, violations)
        .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
    let id_tag = optional_string(config, ID_TAG, violations).unwrap_or_else(|| id_field.clone());

    Some(QueryPlan::Templated(TemplatedPlan {
        metrics: metric_columns,
        tags,
        id_field,
        id_tag,
    }))
}

fn tag_columns(
    config: &ConfigMap,
    tags_key: &str,
    output_key: &str,
    violations: &mut Violations,
) -> Vec<TagColumn> {
    let tags = optional_list(config, tags_key, violations);
    let output_names = optional_list(config, output_key, violations);

    if tags.len() != output_names.len() {
        violations.push(format!("{} and {} length must be equal.", tags_key, output_key));
    }
    if has_duplicates(&output_names) {
        violations.push(format!("{} contains duplicate values.", output_key));
    }

    tags.into_iter()
        .zip(output_names)
        .map(|(tag, output_name)| TagColumn { tag, output_name })
        .collect()
}

#[derive(Debug, Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: String) {
        self.0.push(message);
    }

    fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ImporterError::Config(self.0.join(" ")))
        }
    }
}

/// Reads a string field; absent, null and empty values all count as unset.
fn optional_string(config: &ConfigMap, key: &str, violations: &mut Violations) -> Option<String> {
    match config.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            violations.push(format!("{} must be a comma-separated string.", key));
            None
        }
    }
}

fn optional_list(config: &ConfigMap, key: &str, violations: &mut Violations) -> Vec<String> {
    optional_string(config, key, violations)
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}

fn has_duplicates(values: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    !values.iter().all(|v| seen.insert(v))
}
