//! Flattening of time-series query results into pipeline rows.
//!
//! The first metric of a query plan creates rows, one per point. Later
//! metrics are merged onto those rows by point position (see
//! [`merge_by_index`]).

use serde_json::Value;
use tracing::{error, info};

use crate::config::TagColumn;
use crate::metrics;
use crate::models::{to_iso8601, InputRow, QueryResponse, Row, DURATION_FIELD, TIMESTAMP_FIELD};

/// Builds one output row per point of every series in `response`.
///
/// Each row is a copy of the input row with `timestamp` set to the point time
/// and `duration` set to the gap until the next point. The last point of a
/// series runs until the end of the input window. Rows of multiple series are
/// appended one series after another.
pub fn rows_from_response(
    response: &QueryResponse,
    input: &InputRow,
    tags: &[TagColumn],
    output_name: &str,
) -> Vec<Row> {
    let mut rows = Vec::new();

    if response.series.is_empty() {
        info!("Series not found");
        return rows;
    }

    let window_end_millis = input.window_end_millis();

    for series in &response.series {
        if series.points.is_empty() {
            info!("Points not found");
            continue;
        }

        for (j, point) in series.points.iter().enumerate() {
            let next_millis = series
                .points
                .get(j + 1)
                .map(|next| next.timestamp_millis)
                .unwrap_or(window_end_millis);

            let mut row = input.fields().clone();
            row.insert(
                TIMESTAMP_FIELD.to_string(),
                Value::String(to_iso8601(point.timestamp_millis)),
            );
            row.insert(
                DURATION_FIELD.to_string(),
                Value::from(next_millis.saturating_sub(point.timestamp_millis) as f64 / 1000.0),
            );

            for column in tags {
                row.insert(
                    column.output_name.clone(),
                    Value::String(tag_value(&column.tag, &series.tag_set).to_string()),
                );
            }

            insert_metric(&mut row, output_name, point_value(point.value));
            rows.push(row);
        }
    }

    rows
}

/// Merges a later metric onto rows built by an earlier one, pairing the j-th
/// point of each series with the j-th row.
///
/// Alignment is purely positional: points are not matched by timestamp, and
/// points beyond `rows.len()` are dropped. Series queried over the same window
/// and rollup are expected to share point lists, which makes this safe in
/// practice. A timestamp-keyed strategy can replace this function without
/// touching the callers.
pub fn merge_by_index(response: &QueryResponse, rows: &mut [Row], output_name: &str) {
    if response.series.is_empty() {
        info!("Series not found");
        return;
    }

    for series in &response.series {
        if series.points.is_empty() {
            info!("Points not found");
            continue;
        }

        for (point, row) in series.points.iter().zip(rows.iter_mut()) {
            insert_metric(row, output_name, point_value(point.value));
        }
    }
}

/// Inserts `value` under `name` unless the row already has that key.
///
/// Returns false and logs when the name collides with an existing field;
/// the row is left untouched in that case.
pub fn insert_metric(row: &mut Row, name: &str, value: Value) -> bool {
    if row.contains_key(name) {
        let existing: Vec<&str> = row.keys().map(String::as_str).collect();
        error!(
            field = name,
            "output-metric-name \"{}\" is set to a reserved key. It cannot be any of the following: {}",
            name,
            existing.join(",")
        );
        metrics::record_field_collision();
        return false;
    }

    row.insert(name.to_string(), value);
    true
}

/// Looks up `tag` in a series tag set of `key:value` entries.
///
/// Returns an empty string when no entry has that key.
pub fn tag_value<'a>(tag: &str, tag_set: &'a [String]) -> &'a str {
    tag_set
        .iter()
        .filter_map(|pair| pair.split_once(':'))
        .find(|(key, _)| *key == tag)
        .map(|(_, value)| value)
        .unwrap_or("")
}

fn point_value(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Series, SeriesPoint};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const T0: i64 = 1717995600000;

    fn input(duration: u64) -> InputRow {
        let row = json!({
            "id": "i-123456",
            "timestamp": "2024-06-10T05:00:00.000Z",
            "duration": duration
        });
        InputRow::try_from(row.as_object().cloned().unwrap()).unwrap()
    }

    fn response(tag_set: &[&str], points: &[(i64, f64)]) -> QueryResponse {
        QueryResponse {
            series: vec![Series {
                tag_set: tag_set.iter().map(|t| t.to_string()).collect(),
                points: points.iter().map(|&(t, v)| SeriesPoint::new(t, v)).collect(),
            }],
            ..Default::default()
        }
    }

    fn tag(tag: &str, output_name: &str) -> TagColumn {
        TagColumn {
            tag: tag.to_string(),
            output_name: output_name.to_string(),
        }
    }

    #[test]
    fn test_rows_split_window_by_points() {
        let rows = rows_from_response(
            &response(&[], &[(T0, 1.0), (T0 + 10_000, 0.7)]),
            &input(20),
            &[],
            "cpu",
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["timestamp"], json!("2024-06-10T05:00:00.000Z"));
        assert_eq!(rows[0]["duration"], json!(10.0));
        assert_eq!(rows[0]["cpu"], json!(1.0));
        assert_eq!(rows[1]["timestamp"], json!("2024-06-10T05:00:10.000Z"));
        assert_eq!(rows[1]["duration"], json!(10.0));
        assert_eq!(rows[1]["cpu"], json!(0.7));
        assert_eq!(rows[1]["id"], json!("i-123456"));
    }

    #[test]
    fn test_single_point_covers_whole_window() {
        let rows = rows_from_response(&response(&[], &[(T0, 3.0)]), &input(300), &[], "cpu");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["duration"], json!(300.0));
    }

    #[test]
    fn test_durations_sum_to_window() {
        let points = [(T0, 1.0), (T0 + 7_000, 2.0), (T0 + 15_000, 3.0), (T0 + 31_000, 4.0)];
        let rows = rows_from_response(&response(&[], &points), &input(60), &[], "v");

        let total: f64 = rows.iter().map(|r| r["duration"].as_f64().unwrap()).sum();
        assert_eq!(total, 60.0);
    }

    #[test]
    fn test_tags_are_extracted() {
        let rows = rows_from_response(
            &response(&["instance-id:i-1", "tag1:tag1value"], &[(T0, 1.0)]),
            &input(20),
            &[tag("tag1", "outputTag1"), tag("tag2", "outputTag2")],
            "cpu",
        );

        assert_eq!(rows[0]["outputTag1"], json!("tag1value"));
        assert_eq!(rows[0]["outputTag2"], json!(""));
    }

    #[test]
    fn test_multiple_series_are_appended() {
        let mut result = response(&["tag1:a"], &[(T0, 1.0), (T0 + 10_000, 0.7)]);
        result.series.push(Series {
            tag_set: vec!["tag1:b".to_string()],
            points: vec![SeriesPoint::new(T0, 0.25), SeriesPoint::new(T0 + 10_000, 0.14)],
        });

        let rows = rows_from_response(&result, &input(20), &[tag("tag1", "t")], "m");
        let tags: Vec<&Value> = rows.iter().map(|r| &r["t"]).collect();
        assert_eq!(tags, vec![&json!("a"), &json!("a"), &json!("b"), &json!("b")]);
        assert_eq!(rows[2]["timestamp"], json!("2024-06-10T05:00:00.000Z"));
    }

    #[test]
    fn test_empty_series_and_points_produce_nothing() {
        assert!(rows_from_response(&QueryResponse::default(), &input(20), &[], "m").is_empty());
        assert!(rows_from_response(&response(&[], &[]), &input(20), &[], "m").is_empty());
    }

    #[test]
    fn test_reserved_metric_name_is_skipped() {
        let rows = rows_from_response(&response(&[], &[(T0, 5.0)]), &input(20), &[], "timestamp");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["timestamp"], json!("2024-06-10T05:00:00.000Z"));
    }

    #[test]
    fn test_null_point_value_is_kept() {
        let result = QueryResponse {
            series: vec![Series {
                tag_set: vec![],
                points: vec![SeriesPoint {
                    timestamp_millis: T0,
                    value: None,
                }],
            }],
            ..Default::default()
        };
        let rows = rows_from_response(&result, &input(20), &[], "m");
        assert_eq!(rows[0]["m"], Value::Null);
    }

    #[test]
    fn test_extreme_point_timestamps_do_not_overflow() {
        let rows = rows_from_response(
            &response(&[], &[(i64::MIN, 1.0), (i64::MAX, 2.0)]),
            &input(20),
            &[],
            "m",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["duration"], json!(i64::MAX as f64 / 1000.0));
    }

    #[test]
    fn test_merge_by_index_aligns_positionally() {
        let mut rows = rows_from_response(
            &response(&[], &[(T0, 1.0), (T0 + 10_000, 0.7)]),
            &input(20),
            &[],
            "first",
        );
        merge_by_index(
            &response(&[], &[(T0, 0.25), (T0 + 10_000, 0.14), (T0 + 20_000, 9.0)]),
            &mut rows,
            "second",
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["second"], json!(0.25));
        assert_eq!(rows[1]["second"], json!(0.14));
    }

    #[test]
    fn test_merge_by_index_with_fewer_points() {
        let mut rows = rows_from_response(
            &response(&[], &[(T0, 1.0), (T0 + 10_000, 0.7)]),
            &input(20),
            &[],
            "first",
        );
        merge_by_index(&response(&[], &[(T0, 0.25)]), &mut rows, "second");

        assert_eq!(rows[0]["second"], json!(0.25));
        assert!(!rows[1].contains_key("second"));
    }

    #[test]
    fn test_merge_collision_keeps_earlier_value() {
        let mut rows = rows_from_response(&response(&[], &[(T0, 1.0)]), &input(20), &[], "cpu");
        merge_by_index(&response(&[], &[(T0, 2.0)]), &mut rows, "cpu");
        assert_eq!(rows[0]["cpu"], json!(1.0));
    }

    #[test]
    fn test_tag_value() {
        let tag_set = vec![
            "host:web-1".to_string(),
            "url:http://x".to_string(),
            "novalue".to_string(),
        ];
        assert_eq!(tag_value("host", &tag_set), "web-1");
        assert_eq!(tag_value("url", &tag_set), "http://x");
        assert_eq!(tag_value("novalue", &tag_set), "");
        assert_eq!(tag_value("missing", &tag_set), "");
    }

    #[test]
    fn test_insert_metric_reports_collision() {
        let mut row = Row::new();
        assert!(insert_metric(&mut row, "a", json!(1)));
        assert!(!insert_metric(&mut row, "a", json!(2)));
        assert_eq!(row["a"], json!(1));
    }
}
