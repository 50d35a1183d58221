//! CloudWatch Logs backend
//!
//! Log groups and Logs Insights queries. Served by the CloudWatch adapter
//! as `listLogGroups` and `queryLogs` on `cloudwatch://*`; log group names
//! start with `/` and travel as params, never as locator segments.

use super::Page;
use crate::aws::{map_sdk_error, AwsContext};
use crate::error::GatewayError;
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::operation::get_query_results::GetQueryResultsOutput;
use aws_sdk_cloudwatchlogs::types::{LogGroup, QueryStatus, ResultField};
use aws_sdk_cloudwatchlogs::Client;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration as StdDuration;

/// Rows requested from one Insights query
pub const QUERY_RESULT_LIMIT: i32 = 1000;

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Polls before a query still running is stopped
const MAX_POLLS: u32 = 120;

/// One Logs Insights query over a time window
#[derive(Debug, Clone, PartialEq)]
pub struct LogsQuery {
    pub log_group: String,
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: i32,
}

impl LogsQuery {
    /// Last `hours` hours ending at `end`
    pub fn last_hours(
        log_group: impl Into<String>,
        query: impl Into<String>,
        hours: u32,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            log_group: log_group.into(),
            query: query.into(),
            start: end - Duration::hours(i64::from(hours)),
            end,
            limit: QUERY_RESULT_LIMIT,
        }
    }
}

/// Calls the log operations need
#[async_trait]
pub trait LogsBackend: Send + Sync {
    async fn list_log_groups(&self, prefix: Option<&str>, page_token: Option<String>) -> Result<Page, GatewayError>;

    /// Run `query` to completion: `{status, statistics, results}`
    async fn run_query(&self, query: &LogsQuery) -> Result<Value, GatewayError>;
}

fn log_group_to_json(group: &LogGroup) -> Value {
    json!({
        "logGroupName": group.log_group_name(),
        "storedBytes": group.stored_bytes(),
        "creationTime": group
            .creation_time()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339()),
        "retentionInDays": group.retention_in_days(),
    })
}

/// `[{field, value}, ...]` as one `{field: value}` object
fn row_to_json(fields: &[ResultField]) -> Value {
    let row: Map<String, Value> = fields
        .iter()
        .filter_map(|f| Some((f.field()?.to_string(), json!(f.value()))))
        .collect();
    Value::Object(row)
}

fn query_results_to_json(output: &GetQueryResultsOutput) -> Value {
    let statistics = output.statistics().map(|s| {
        json!({
            "recordsMatched": s.records_matched(),
            "recordsScanned": s.records_scanned(),
            "bytesScanned": s.bytes_scanned(),
        })
    });

    json!({
        "status": output.status().map(|s| s.as_str()),
        "statistics": statistics,
        "results": output.results().iter().map(|row| row_to_json(row)).collect::<Vec<_>>(),
    })
}

/// CloudWatch Logs through the AWS SDK
pub struct SdkLogsBackend {
    aws: AwsContext,
}

impl SdkLogsBackend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl LogsBackend for SdkLogsBackend {
    async fn list_log_groups(&self, prefix: Option<&str>, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_log_groups()
            .set_log_group_name_prefix(prefix.map(str::to_string))
            .set_next_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("CloudWatch Logs DescribeLogGroups", err));
        let output = self.aws.observe(outcome).await?;

        let groups = output.log_groups().iter().map(log_group_to_json).collect();
        Ok(Page::new(groups, output.next_token().map(str::to_string)))
    }

    async fn run_query(&self, query: &LogsQuery) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .start_query()
            .log_group_name(&query.log_group)
            .query_string(&query.query)
            .start_time(query.start.timestamp())
            .end_time(query.end.timestamp())
            .limit(query.limit)
            .send()
            .await
            .map_err(|err| map_sdk_error("CloudWatch Logs StartQuery", err));
        let started = self.aws.observe(outcome).await?;
        let query_id = started
            .query_id()
            .ok_or_else(|| GatewayError::internal("StartQuery returned no query id"))?
            .to_string();
        tracing::debug!("Logs Insights query {} started on {}", query_id, query.log_group);

        for _ in 0..MAX_POLLS {
            let outcome = client
                .get_query_results()
                .query_id(&query_id)
                .send()
                .await
                .map_err(|err| map_sdk_error("CloudWatch Logs GetQueryResults", err));
            let output = self.aws.observe(outcome).await?;

            match output.status() {
                Some(QueryStatus::Complete) => return Ok(query_results_to_json(&output)),
                Some(QueryStatus::Running) | Some(QueryStatus::Scheduled) => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                },
                other => {
                    return Err(GatewayError::unavailable(format!(
                        "Logs Insights query {} ended with status {}",
                        query_id,
                        other.map(|s| s.as_str()).unwrap_or("unknown")
                    )))
                },
            }
        }

        tracing::warn!("Logs Insights query {} still running, stopping it", query_id);
        if let Err(err) = client.stop_query().query_id(&query_id).send().await {
            tracing::debug!("StopQuery {} failed: {}", query_id, err);
        }
        Err(GatewayError::unavailable(format!(
            "Logs Insights query {} did not complete within {} seconds",
            query_id,
            MAX_POLLS as u64 * POLL_INTERVAL.as_secs()
        )))
    }
}
