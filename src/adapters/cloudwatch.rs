//! CloudWatch adapter
//!
//! - `cloudwatch://*` - listAlarms, listLogGroups, queryLogs
//! - `cloudwatch://{namespace...}` - listMetrics
//! - `cloudwatch://{namespace...}/{metricName}/{periodMinutes}` - getMetric
//!
//! Namespaces may contain `/` (`AWS/EC2`). A locator of three or more
//! segments whose last segment is a number addresses a metric; anything else
//! is a namespace. Log operations take the log group as a param. Read-only.

use super::cloudwatch_logs::{LogsBackend, LogsQuery};
use super::{
    expect_collection, optional_str, optional_u32, page_token, required_str, unsupported_operation, Page,
    ServiceAdapter,
};
use crate::aws::{format_time, map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_cloudwatch::types::{Datapoint, Dimension, Statistic};
use aws_sdk_cloudwatch::Client;
use aws_smithy_types::DateTime as SmithyDateTime;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["getMetric", "listMetrics", "listAlarms", "listLogGroups", "queryLogs"];

/// Longest window accepted (one week)
const MAX_PERIOD_MINUTES: u32 = 7 * 24 * 60;

/// Window of a log query when `hours` is not given
pub const DEFAULT_QUERY_HOURS: u32 = 24;

const MAX_QUERY_HOURS: u32 = 30 * 24;

/// Statistic requested from GetMetricStatistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatistic {
    Average,
    Maximum,
    Minimum,
    Sum,
}

impl MetricStatistic {
    /// Key of this statistic in a rendered datapoint
    pub fn key(self) -> &'static str {
        match self {
            MetricStatistic::Average => "average",
            MetricStatistic::Maximum => "maximum",
            MetricStatistic::Minimum => "minimum",
            MetricStatistic::Sum => "sum",
        }
    }

    fn to_sdk(self) -> Statistic {
        match self {
            MetricStatistic::Average => Statistic::Average,
            MetricStatistic::Maximum => Statistic::Maximum,
            MetricStatistic::Minimum => Statistic::Minimum,
            MetricStatistic::Sum => Statistic::Sum,
        }
    }

    fn read(self, point: &Datapoint) -> Option<f64> {
        match self {
            MetricStatistic::Average => point.average(),
            MetricStatistic::Maximum => point.maximum(),
            MetricStatistic::Minimum => point.minimum(),
            MetricStatistic::Sum => point.sum(),
        }
    }
}

/// Statistics window for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    /// `(name, value)` pairs
    pub dimensions: Vec<(String, String)>,
    pub statistics: Vec<MetricStatistic>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_seconds: i32,
}

impl MetricQuery {
    /// Last `period_minutes` minutes ending at `end`, one bucket per period
    pub fn last_minutes(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        period_minutes: u32,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimensions: Vec::new(),
            statistics: vec![
                MetricStatistic::Average,
                MetricStatistic::Maximum,
                MetricStatistic::Minimum,
            ],
            start: end - Duration::minutes(i64::from(period_minutes)),
            end,
            period_seconds: (period_minutes * 60) as i32,
        }
    }

    /// Hourly invocation sums of one Lambda function over the last `days` days
    pub fn lambda_invocations(function_name: impl Into<String>, days: u32, end: DateTime<Utc>) -> Self {
        Self {
            namespace: "AWS/Lambda".to_string(),
            metric_name: "Invocations".to_string(),
            dimensions: vec![("FunctionName".to_string(), function_name.into())],
            statistics: vec![MetricStatistic::Sum],
            start: end - Duration::days(i64::from(days)),
            end,
            period_seconds: 3600,
        }
    }
}

/// Calls the CloudWatch adapter needs
#[async_trait]
pub trait CloudWatchBackend: Send + Sync {
    /// Datapoints sorted by timestamp
    async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Value>, GatewayError>;

    async fn list_metrics(&self, namespace: &str, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn list_alarms(&self, page_token: Option<String>) -> Result<Page, GatewayError>;
}

pub struct CloudWatchAdapter {
    backend: Arc<dyn CloudWatchBackend>,
    logs: Arc<dyn LogsBackend>,
}

impl CloudWatchAdapter {
    pub fn new(backend: Arc<dyn CloudWatchBackend>, logs: Arc<dyn LogsBackend>) -> Self {
        Self { backend, logs }
    }
}

/// `(namespace, metricName, periodMinutes)` when the locator addresses a metric
fn metric_address(locator: &ResourceLocator) -> Option<(String, &str, &str)> {
    let segments = locator.segments();
    if segments.len() < 3 {
        return None;
    }
    let period = segments[segments.len() - 1].as_str();
    if period.is_empty() || !period.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let metric = segments[segments.len() - 2].as_str();
    let namespace = segments[..segments.len() - 2].join("/");
    Some((namespace, metric, period))
}

fn parse_period(raw: &str) -> Result<u32, GatewayError> {
    match raw.parse::<u32>() {
        Ok(minutes) if (1..=MAX_PERIOD_MINUTES).contains(&minutes) => Ok(minutes),
        _ => Err(GatewayError::invalid_parameters(format!(
            "period must be between 1 and {} minutes, got '{}'",
            MAX_PERIOD_MINUTES, raw
        ))),
    }
}

fn query_hours(params: &Params) -> Result<u32, GatewayError> {
    match optional_u32(params, "hours")? {
        None => Ok(DEFAULT_QUERY_HOURS),
        Some(hours) if (1..=MAX_QUERY_HOURS).contains(&hours) => Ok(hours),
        Some(hours) => Err(GatewayError::invalid_parameters(format!(
            "hours must be between 1 and {}, got {}",
            MAX_QUERY_HOURS, hours
        ))),
    }
}

fn non_blank<'a>(params: &'a Params, key: &str) -> Result<&'a str, GatewayError> {
    let value = required_str(params, key)?;
    if value.trim().is_empty() {
        return Err(GatewayError::invalid_parameters(format!(
            "field '{}' must not be empty",
            key
        )));
    }
    Ok(value)
}

#[async_trait]
impl ServiceAdapter for CloudWatchAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::CloudWatch
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        if locator.is_collection() {
            Some("listAlarms")
        } else if metric_address(locator).is_some() {
            Some("getMetric")
        } else {
            Some("listMetrics")
        }
    }

    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        match operation {
            "getMetric" => {
                let (namespace, metric, period) = metric_address(locator).ok_or_else(|| {
                    GatewayError::invalid_parameters(format!(
                        "'{}' does not match cloudwatch://{{namespace}}/{{metricName}}/{{periodMinutes}}",
                        locator
                    ))
                })?;
                if namespace.split('/').any(str::is_empty) || metric.is_empty() {
                    return Err(GatewayError::invalid_parameters(format!(
                        "'{}' has an empty namespace or metric name",
                        locator
                    )));
                }
                let period_minutes = parse_period(period)?;

                let query = MetricQuery::last_minutes(namespace, metric, period_minutes, Utc::now());
                let datapoints = self.backend.get_metric_statistics(&query).await?;

                Ok(NormalizedResult::new(json!({
                    "namespace": query.namespace,
                    "metricName": query.metric_name,
                    "periodMinutes": period_minutes,
                    "startTime": query.start.to_rfc3339(),
                    "endTime": query.end.to_rfc3339(),
                    "datapoints": datapoints,
                })))
            },
            "listMetrics" => {
                if locator.is_collection() || locator.path().split('/').any(str::is_empty) {
                    return Err(GatewayError::invalid_parameters(format!(
                        "listMetrics expects cloudwatch://{{namespace}}, got '{}'",
                        locator
                    )));
                }
                let page = self
                    .backend
                    .list_metrics(&locator.path(), page_token(params)?)
                    .await?;
                Ok(page.into_result("metrics"))
            },
            "listAlarms" => {
                expect_collection(locator, operation)?;
                let page = self.backend.list_alarms(page_token(params)?).await?;
                Ok(page.into_result("alarms"))
            },
            "listLogGroups" => {
                expect_collection(locator, operation)?;
                let prefix = optional_str(params, "prefix")?.filter(|p| !p.is_empty());
                let page = self.logs.list_log_groups(prefix, page_token(params)?).await?;
                Ok(page.into_result("logGroups"))
            },
            "queryLogs" => {
                expect_collection(locator, operation)?;
                let log_group = non_blank(params, "logGroupName")?;
                let query_string = non_blank(params, "query")?;
                let hours = query_hours(params)?;

                let query = LogsQuery::last_hours(log_group, query_string, hours, Utc::now());
                let mut outcome = self.logs.run_query(&query).await?;
                if let Value::Object(map) = &mut outcome {
                    map.insert("logGroupName".to_string(), json!(query.log_group));
                    map.insert("startTime".to_string(), json!(query.start.to_rfc3339()));
                    map.insert("endTime".to_string(), json!(query.end.to_rfc3339()));
                }
                Ok(NormalizedResult::new(outcome))
            },
            other => Err(unsupported_operation(Scheme::CloudWatch, other)),
        }
    }
}

/// Timestamp, unit and one key per requested statistic
fn datapoint_to_json(point: &Datapoint, statistics: &[MetricStatistic]) -> Value {
    let mut value = json!({
        "timestamp": format_time(point.timestamp()),
        "unit": point.unit().map(|u| u.as_str()),
    });
    for statistic in statistics {
        value[statistic.key()] = json!(statistic.read(point));
    }
    value
}

fn to_smithy(time: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs(time.timestamp())
}

/// CloudWatch through the AWS SDK
pub struct SdkCloudWatchBackend {
    aws: AwsContext,
}

impl SdkCloudWatchBackend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl CloudWatchBackend for SdkCloudWatchBackend {
    async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Value>, GatewayError> {
        let dimensions = query
            .dimensions
            .iter()
            .map(|(name, value)| Dimension::builder().name(name).value(value).build())
            .collect();
        let statistics = query.statistics.iter().map(|s| s.to_sdk()).collect();

        let client = self.client().await?;
        let outcome = client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .set_dimensions(Some(dimensions))
            .start_time(to_smithy(query.start))
            .end_time(to_smithy(query.end))
            .period(query.period_seconds)
            .set_statistics(Some(statistics))
            .send()
            .await
            .map_err(|err| map_sdk_error("CloudWatch GetMetricStatistics", err));
        let output = self.aws.observe(outcome).await?;

        let mut points: Vec<&Datapoint> = output.datapoints().iter().collect();
        points.sort_by_key(|p| p.timestamp().map(|t| (t.secs(), t.subsec_nanos())));

        Ok(points
            .into_iter()
            .map(|point| datapoint_to_json(point, &query.statistics))
            .collect())
    }

    async fn list_metrics(&self, namespace: &str, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_metrics()
            .namespace(namespace)
            .set_next_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("CloudWatch ListMetrics", err));
        let output = self.aws.observe(outcome).await?;

        let metrics = output
            .metrics()
            .iter()
            .map(|metric| {
                let dimensions: Vec<Value> = metric
                    .dimensions()
                    .iter()
                    .map(|d| json!({ "name": d.name(), "value": d.value() }))
                    .collect();
                json!({
                    "metricName": metric.metric_name(),
                    "namespace": metric.namespace(),
                    "dimensions": dimensions,
                })
            })
            .collect();

        Ok(Page::new(metrics, output.next_token().map(str::to_string)))
    }

    async fn list_alarms(&self, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_alarms()
            .set_next_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("CloudWatch DescribeAlarms", err));
        let output = self.aws.observe(outcome).await?;

        let alarms = output
            .metric_alarms()
            .iter()
            .map(|alarm| {
                json!({
                    "alarmName": alarm.alarm_name(),
                    "alarmDescription": alarm.alarm_description(),
                    "stateValue": alarm.state_value().map(|s| s.as_str()),
                    "metricName": alarm.metric_name(),
                    "namespace": alarm.namespace(),
                    "threshold": alarm.threshold(),
                    "comparisonOperator": alarm.comparison_operator().map(|c| c.as_str()),
                })
            })
            .collect();

        Ok(Page::new(alarms, output.next_token().map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCloudWatch {
        queries: Mutex<Vec<MetricQuery>>,
        namespaces: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CloudWatchBackend for FakeCloudWatch {
        async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Value>, GatewayError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(vec![json!({"average": 1.5})])
        }

        async fn list_metrics(&self, namespace: &str, _page_token: Option<String>) -> Result<Page, GatewayError> {
            self.namespaces.lock().unwrap().push(namespace.to_string());
            Ok(Page::new(vec![json!({"metricName": "CPUUtilization"})], None))
        }

        async fn list_alarms(&self, _page_token: Option<String>) -> Result<Page, GatewayError> {
            Ok(Page::new(vec![], Some("next".to_string())))
        }
    }

    #[derive(Default)]
    struct FakeLogs {
        prefixes: Mutex<Vec<Option<String>>>,
        queries: Mutex<Vec<LogsQuery>>,
    }

    #[async_trait]
    impl LogsBackend for FakeLogs {
        async fn list_log_groups(&self, prefix: Option<&str>, _page_token: Option<String>) -> Result<Page, GatewayError> {
            self.prefixes.lock().unwrap().push(prefix.map(str::to_string));
            Ok(Page::new(vec![json!({"logGroupName": "/aws/lambda/ingest"})], None))
        }

        async fn run_query(&self, query: &LogsQuery) -> Result<Value, GatewayError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(json!({"status": "Complete", "results": [{"@message": "boom"}]}))
        }
    }

    fn adapter() -> (CloudWatchAdapter, Arc<FakeCloudWatch>) {
        let (adapter, backend, _) = adapter_with_logs();
        (adapter, backend)
    }

    fn adapter_with_logs() -> (CloudWatchAdapter, Arc<FakeCloudWatch>, Arc<FakeLogs>) {
        let backend = Arc::new(FakeCloudWatch::default());
        let logs = Arc::new(FakeLogs::default());
        (CloudWatchAdapter::new(backend.clone(), logs.clone()), backend, logs)
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn locator(raw: &str) -> ResourceLocator {
        ResourceLocator::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_get_metric_window() {
        let (adapter, backend) = adapter();
        let result = adapter
            .resolve(&locator("cloudwatch://AWS/EC2/CPUUtilization/5"), "getMetric", &Params::new())
            .await
            .unwrap();

        assert_eq!(result.payload["namespace"], "AWS/EC2");
        assert_eq!(result.payload["metricName"], "CPUUtilization");
        assert_eq!(result.payload["datapoints"][0]["average"], 1.5);

        let query = backend.queries.lock().unwrap()[0].clone();
        assert_eq!(query.period_seconds, 300);
        assert_eq!(query.end - query.start, Duration::minutes(5));
        assert!(query.dimensions.is_empty());
        assert_eq!(
            query.statistics,
            vec![MetricStatistic::Average, MetricStatistic::Maximum, MetricStatistic::Minimum]
        );
    }

    #[test]
    fn test_lambda_invocations_query() {
        let end = Utc::now();
        let query = MetricQuery::lambda_invocations("ingest", 2, end);
        assert_eq!(query.namespace, "AWS/Lambda");
        assert_eq!(query.metric_name, "Invocations");
        assert_eq!(query.dimensions, vec![("FunctionName".to_string(), "ingest".to_string())]);
        assert_eq!(query.statistics, vec![MetricStatistic::Sum]);
        assert_eq!(query.period_seconds, 3600);
        assert_eq!(query.end - query.start, Duration::days(2));
    }

    #[test]
    fn test_datapoint_keeps_requested_statistics_only() {
        let point = Datapoint::builder()
            .timestamp(SmithyDateTime::from_secs(0))
            .sum(12.0)
            .average(3.0)
            .build();

        let value = datapoint_to_json(&point, &[MetricStatistic::Sum]);
        assert_eq!(value["sum"], 12.0);
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
        assert!(value.get("average").is_none());
    }

    #[tokio::test]
    async fn test_query_logs_defaults_to_one_day() {
        let (adapter, _, logs) = adapter_with_logs();
        let result = adapter
            .resolve(
                &locator("cloudwatch://*"),
                "queryLogs",
                &params(json!({"logGroupName": "/aws/lambda/ingest", "query": "fields @message"})),
            )
            .await
            .unwrap();

        assert_eq!(result.payload["status"], "Complete");
        assert_eq!(result.payload["logGroupName"], "/aws/lambda/ingest");
        assert_eq!(result.payload["results"][0]["@message"], "boom");

        let query = logs.queries.lock().unwrap()[0].clone();
        assert_eq!(query.end - query.start, Duration::hours(i64::from(DEFAULT_QUERY_HOURS)));
        assert_eq!(query.query, "fields @message");
    }

    #[tokio::test]
    async fn test_query_logs_validates_before_call() {
        let (adapter, _, logs) = adapter_with_logs();
        let cases = [
            json!({"query": "fields @message"}),
            json!({"logGroupName": "/aws/lambda/ingest", "query": "  "}),
            json!({"logGroupName": "/aws/lambda/ingest", "query": "fields @message", "hours": 0}),
            json!({"logGroupName": "/aws/lambda/ingest", "query": "fields @message", "hours": 100000}),
        ];
        for case in cases {
            let err = adapter
                .resolve(&locator("cloudwatch://*"), "queryLogs", &params(case.clone()))
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidParameters, "{}", case);
        }
        assert!(logs.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_log_groups_passes_prefix() {
        let (adapter, _, logs) = adapter_with_logs();
        let result = adapter
            .resolve(&locator("cloudwatch://*"), "listLogGroups", &params(json!({"prefix": "/aws/lambda"})))
            .await
            .unwrap();
        assert_eq!(result.payload["logGroups"][0]["logGroupName"], "/aws/lambda/ingest");

        let err = adapter
            .resolve(&locator("cloudwatch://AWS/EC2"), "listLogGroups", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert_eq!(logs.prefixes.lock().unwrap().as_slice(), [Some("/aws/lambda".to_string())]);
    }

    #[tokio::test]
    async fn test_zero_period_rejected_before_call() {
        let (adapter, backend) = adapter();
        let err = adapter
            .resolve(&locator("cloudwatch://AWS/EC2/CPUUtilization/0"), "getMetric", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(backend.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_metric_requires_metric_address() {
        let (adapter, _) = adapter();
        let err = adapter
            .resolve(&locator("cloudwatch://AWS/EC2"), "getMetric", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[tokio::test]
    async fn test_list_metrics_joins_namespace() {
        let (adapter, backend) = adapter();
        adapter
            .resolve(&locator("cloudwatch://AWS/Lambda"), "listMetrics", &Params::new())
            .await
            .unwrap();
        assert_eq!(backend.namespaces.lock().unwrap().as_slice(), ["AWS/Lambda"]);
    }

    #[tokio::test]
    async fn test_list_alarms_surfaces_next_token() {
        let (adapter, _) = adapter();
        let result = adapter
            .resolve(&locator("cloudwatch://*"), "listAlarms", &Params::new())
            .await
            .unwrap();
        assert_eq!(result.next_page_token(), Some("next"));
    }

    #[test]
    fn test_default_operations() {
        let (adapter, _) = adapter();
        assert_eq!(adapter.default_operation(&locator("cloudwatch://*")), Some("listAlarms"));
        assert_eq!(adapter.default_operation(&locator("cloudwatch://AWS/EC2")), Some("listMetrics"));
        assert_eq!(
            adapter.default_operation(&locator("cloudwatch://AWS/EC2/CPUUtilization/60")),
            Some("getMetric")
        );
        assert_eq!(
            adapter.default_operation(&locator("cloudwatch://Custom/Latency/15")),
            Some("getMetric")
        );
    }
}
