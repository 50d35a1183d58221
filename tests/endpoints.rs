//! End-to-end tests of the endpoint layer over in-memory backends
//!
//! Each test wires real adapters to fake backends, then drives them through
//! `Endpoints` the way the MCP shell does.

use async_trait::async_trait;
use cloudmux::adapters::cloudwatch::{CloudWatchAdapter, CloudWatchBackend, MetricQuery, MetricStatistic};
use cloudmux::adapters::cloudwatch_logs::{LogsBackend, LogsQuery};
use cloudmux::adapters::dynamodb::{DynamoDbAdapter, DynamoDbBackend, KeyCondition};
use cloudmux::adapters::gdrive::{DriveAdapter, DriveBackend, DriveFile};
use cloudmux::adapters::gsheets::{SheetsAdapter, SheetsBackend};
use cloudmux::adapters::iam::{IamAdapter, IamBackend};
use cloudmux::adapters::lambda::{LambdaAdapter, LambdaBackend};
use cloudmux::adapters::s3::{ObjectContent, S3Adapter, S3Backend};
use cloudmux::adapters::{Page, ServiceAdapter};
use cloudmux::dispatch::{AdapterRegistry, Router};
use cloudmux::error::GatewayError;
use cloudmux::handlers::Endpoints;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn endpoints(adapter: Arc<dyn ServiceAdapter>) -> Endpoints {
    endpoints_for(vec![adapter])
}

fn endpoints_for(adapters: Vec<Arc<dyn ServiceAdapter>>) -> Endpoints {
    let registry = adapters
        .into_iter()
        .fold(AdapterRegistry::builder(), |builder, adapter| builder.register(adapter))
        .build();
    Endpoints::new(Router::new(registry))
}

/// Drive with a fixed set of files, paginated by offset tokens
struct FixtureDrive {
    files: Vec<Value>,
}

impl FixtureDrive {
    fn with_files(count: usize) -> Self {
        let files = (0..count)
            .map(|i| json!({"id": format!("file-{:02}", i), "name": format!("report {}.txt", i)}))
            .collect();
        Self { files }
    }
}

#[async_trait]
impl DriveBackend for FixtureDrive {
    async fn search(&self, _query: &str, page_size: u32, page_token: Option<String>) -> Result<Page, GatewayError> {
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| GatewayError::invalid_parameters("bad page token"))?,
            None => 0,
        };
        let end = (start + page_size as usize).min(self.files.len());
        let next = (end < self.files.len()).then(|| end.to_string());
        Ok(Page::new(self.files[start..end].to_vec(), next))
    }

    async fn read_file(&self, file_id: &str) -> Result<DriveFile, GatewayError> {
        if file_id == "notes" {
            return Ok(DriveFile {
                id: "notes".to_string(),
                name: "notes.txt".to_string(),
                mime_type: "text/plain".to_string(),
                exported_as: None,
                bytes: b"hello".to_vec(),
            });
        }
        Err(GatewayError::not_found(format!("file {} not found", file_id)))
    }
}

/// Sheets where ranges starting with `Missing` do not exist
#[derive(Default)]
struct FixtureSheets {
    updates: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

#[async_trait]
impl SheetsBackend for FixtureSheets {
    async fn read_range(&self, _spreadsheet_id: &str, range: &str) -> Result<Value, GatewayError> {
        self.requested.lock().unwrap().push(range.to_string());
        if range.contains("Missing") {
            return Err(GatewayError::invalid_parameters(format!(
                "Unable to parse range: {}",
                range
            )));
        }
        Ok(json!({"range": range, "values": [["a", "b"], ["c", "d"]]}))
    }

    async fn sheet_title(&self, _spreadsheet_id: &str, sheet_id: i64) -> Result<String, GatewayError> {
        match sheet_id {
            0 => Ok("Sheet1".to_string()),
            _ => Err(GatewayError::not_found(format!("no sheet with id {}", sheet_id))),
        }
    }

    async fn update_cell(&self, spreadsheet_id: &str, range: &str, value: String) -> Result<Value, GatewayError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "spreadsheetId": spreadsheet_id,
            "updatedRange": range,
            "updatedCells": 1,
            "value": value,
        }))
    }
}

/// DynamoDB holding a single `users` item with id `u-1`
#[derive(Default)]
struct FixtureTable {
    keys: Mutex<Vec<KeyCondition>>,
}

#[async_trait]
impl DynamoDbBackend for FixtureTable {
    async fn list_tables(&self, _limit: Option<u32>, _page_token: Option<String>) -> Result<Page, GatewayError> {
        Ok(Page::new(vec![json!("users")], None))
    }

    async fn describe_table(&self, table: &str) -> Result<Value, GatewayError> {
        if table != "users" {
            return Err(GatewayError::not_found(format!("table '{}' not found", table)));
        }
        Ok(json!({
            "tableName": table,
            "status": "ACTIVE",
            "keySchema": [{"attributeName": "id", "keyType": "HASH"}],
        }))
    }

    async fn get_item(&self, table: &str, key: &KeyCondition) -> Result<Option<Value>, GatewayError> {
        self.keys.lock().unwrap().push(key.clone());
        if table == "users" && key.name == "id" && key.value == "u-1" {
            return Ok(Some(json!({"id": {"S": "u-1"}, "name": {"S": "Ada"}})));
        }
        Ok(None)
    }

    async fn query(
        &self,
        _table: &str,
        _key: &KeyCondition,
        _limit: u32,
        _page_token: Option<String>,
    ) -> Result<Page, GatewayError> {
        Ok(Page::default())
    }
}

/// One bucket `logs` holding `2024/01/app.log`
struct FixtureBucket;

#[async_trait]
impl S3Backend for FixtureBucket {
    async fn list_buckets(&self, _page_token: Option<String>) -> Result<Page, GatewayError> {
        Ok(Page::new(vec![json!({"name": "logs"})], None))
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        _prefix: Option<String>,
        _max_keys: Option<u32>,
        _page_token: Option<String>,
    ) -> Result<Page, GatewayError> {
        Ok(Page::new(vec![json!({"key": "2024/01/app.log"})], None))
    }

    async fn get_object(&self, _bucket: &str, _key: &str) -> Result<ObjectContent, GatewayError> {
        Ok(ObjectContent {
            bytes: b"started".to_vec(),
            content_type: Some("text/plain".to_string()),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Value, GatewayError> {
        if bucket == "logs" && key == "2024/01/app.log" {
            return Ok(json!({
                "bucket": bucket,
                "key": key,
                "contentType": "text/plain",
                "contentLength": 7,
            }));
        }
        Err(GatewayError::not_found(format!("s3://{}/{} not found", bucket, key)).with_upstream_status(404))
    }
}

/// Metrics and logs that record what they were asked for
#[derive(Default)]
struct FixtureWatch {
    metric_queries: Mutex<Vec<MetricQuery>>,
    namespaces: Mutex<Vec<String>>,
    log_queries: Mutex<Vec<LogsQuery>>,
}

#[async_trait]
impl CloudWatchBackend for FixtureWatch {
    async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Value>, GatewayError> {
        self.metric_queries.lock().unwrap().push(query.clone());
        Ok(vec![
            json!({"timestamp": "2026-10-16T00:00:00Z", "sum": 12.0, "unit": "Count"}),
            json!({"timestamp": "2026-10-16T01:00:00Z", "sum": 3.0, "unit": "Count"}),
        ])
    }

    async fn list_metrics(&self, namespace: &str, page_token: Option<String>) -> Result<Page, GatewayError> {
        self.namespaces.lock().unwrap().push(namespace.to_string());
        match page_token {
            None => Ok(Page::new(
                vec![json!({"metricName": "Invocations", "namespace": namespace})],
                Some("m2".to_string()),
            )),
            Some(_) => Ok(Page::new(
                vec![json!({"metricName": "Errors", "namespace": namespace})],
                None,
            )),
        }
    }

    async fn list_alarms(&self, _page_token: Option<String>) -> Result<Page, GatewayError> {
        Ok(Page::default())
    }
}

#[async_trait]
impl LogsBackend for FixtureWatch {
    async fn list_log_groups(&self, prefix: Option<&str>, _page_token: Option<String>) -> Result<Page, GatewayError> {
        let groups = ["/aws/lambda/ingest", "/ecs/api"]
            .into_iter()
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|name| json!({"logGroupName": name, "retentionInDays": 14}))
            .collect();
        Ok(Page::new(groups, None))
    }

    async fn run_query(&self, query: &LogsQuery) -> Result<Value, GatewayError> {
        self.log_queries.lock().unwrap().push(query.clone());
        if query.log_group == "/missing" {
            return Err(
                GatewayError::not_found("The specified log group does not exist.").with_upstream_status(400),
            );
        }
        Ok(json!({
            "status": "Complete",
            "statistics": {"recordsMatched": 1.0, "recordsScanned": 40.0, "bytesScanned": 2048.0},
            "results": [{"@timestamp": "2026-10-16 00:00:01.000", "@message": "ERROR timeout"}],
        }))
    }
}

/// Lambda with one function, `ingest`
struct FixtureFunctions;

#[async_trait]
impl LambdaBackend for FixtureFunctions {
    async fn list_functions(&self, _page_token: Option<String>) -> Result<Page, GatewayError> {
        Ok(Page::new(vec![json!({"functionName": "ingest"})], None))
    }

    async fn get_function(&self, name: &str) -> Result<Value, GatewayError> {
        match name {
            "ingest" => Ok(json!({"functionName": "ingest"})),
            _ => Err(GatewayError::not_found(format!("function '{}' not found", name))),
        }
    }
}

/// IAM with an `ops` role holding two managed policies, one per page
struct FixtureRoles;

#[async_trait]
impl IamBackend for FixtureRoles {
    async fn list_roles(&self, _page_token: Option<String>) -> Result<Page, GatewayError> {
        Ok(Page::new(vec![json!({"roleName": "ops"})], None))
    }

    async fn get_role(&self, role_name: &str) -> Result<Value, GatewayError> {
        Ok(json!({"roleName": role_name}))
    }

    async fn list_attached_policies(&self, role_name: &str, page_token: Option<String>) -> Result<Page, GatewayError> {
        if role_name != "ops" {
            return Err(GatewayError::not_found(format!("role '{}' not found", role_name)));
        }
        match page_token.as_deref() {
            None => Ok(Page::new(
                vec![json!({"policyName": "ReadOnlyAccess"})],
                Some("p2".to_string()),
            )),
            Some(_) => Ok(Page::new(
                vec![json!({"policyName": "CloudWatchLogsFullAccess"})],
                None,
            )),
        }
    }
}

mod drive_tests {
    use super::*;

    fn drive_endpoints(count: usize) -> Endpoints {
        endpoints(Arc::new(DriveAdapter::new(Arc::new(FixtureDrive::with_files(count)))))
    }

    /// 25 matches come back as pages of 10, 10 and 5
    #[tokio::test]
    async fn test_search_paginates_until_exhausted() {
        let endpoints = drive_endpoints(25);
        let mut sizes = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = endpoints
                .gdrive_search("name contains 'report'", token.as_deref(), None)
                .await;
            assert!(response.is_success(), "{}", response.body);

            let files = response.data()["files"].as_array().unwrap().clone();
            sizes.push(files.len());
            seen.extend(files.into_iter().map(|f| f["id"].as_str().unwrap().to_string()));

            match response.next_page_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(seen.len(), 25);
        let distinct: HashSet<&str> = seen.iter().map(String::as_str).collect();
        assert_eq!(distinct.len(), 25, "pages overlap: {:?}", seen);
        assert_eq!(seen.first().map(String::as_str), Some("file-00"));
        assert_eq!(seen.last().map(String::as_str), Some("file-24"));
    }

    /// The last page has no nextPageToken key at all
    #[tokio::test]
    async fn test_last_page_omits_token() {
        let response = drive_endpoints(3).gdrive_search("trashed = false", None, Some(10)).await;
        assert!(response.is_success());
        assert!(response.body.get("nextPageToken").is_none());
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let response = drive_endpoints(3).gdrive_search("   ", None, None).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["kind"], "InvalidParameters");
    }

    #[tokio::test]
    async fn test_read_file_and_not_found() {
        let endpoints = drive_endpoints(0);

        let response = endpoints.gdrive_read_file("notes").await;
        assert!(response.is_success());
        assert_eq!(response.data()["content"], "hello");
        assert_eq!(response.data()["encoding"], "utf-8");

        let response = endpoints.gdrive_read_file("ghost").await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body["status"], "error");
        assert_eq!(response.body["error"]["httpStatus"], 404);
    }
}

mod sheets_tests {
    use super::*;

    fn sheets_endpoints() -> (Endpoints, Arc<FixtureSheets>) {
        let sheets = Arc::new(FixtureSheets::default());
        let adapter = SheetsAdapter::new(Arc::clone(&sheets) as Arc<dyn SheetsBackend>);
        (endpoints(Arc::new(adapter)), sheets)
    }

    /// A failing range is reported in place; the others still succeed
    #[tokio::test]
    async fn test_read_keeps_order_and_reports_partial_failure() {
        let (endpoints, _) = sheets_endpoints();

        let response = endpoints
            .gsheets_read("sheet-1", &["Sheet1!A1:B2", "Missing!D1:D1", "Sheet1!C1"], None)
            .await;

        assert!(response.is_success(), "{}", response.body);
        let ranges = response.data()["valueRanges"].as_array().unwrap();
        assert_eq!(ranges.len(), 3);

        assert_eq!(ranges[0]["range"], "Sheet1!A1:B2");
        assert_eq!(ranges[0]["status"], "success");
        assert_eq!(ranges[0]["values"], json!([["a", "b"], ["c", "d"]]));

        assert_eq!(ranges[1]["range"], "Missing!D1:D1");
        assert_eq!(ranges[1]["status"], "error");
        assert_eq!(ranges[1]["error"]["kind"], "InvalidParameters");

        assert_eq!(ranges[2]["range"], "Sheet1!C1");
        assert_eq!(ranges[2]["status"], "success");
    }

    /// Unqualified ranges are prefixed with the title of `sheetId`
    #[tokio::test]
    async fn test_sheet_id_qualifies_bare_ranges() {
        let (endpoints, sheets) = sheets_endpoints();

        let response = endpoints.gsheets_read("sheet-1", &["A1:B2", "Other!A1"], Some(0)).await;

        assert!(response.is_success());
        let requested = sheets.requested.lock().unwrap().clone();
        assert!(requested.contains(&"'Sheet1'!A1:B2".to_string()));
        assert!(requested.contains(&"Other!A1".to_string()));
        assert_eq!(response.data()["valueRanges"][0]["range"], "A1:B2");
    }

    /// An unknown sheetId fails the bare ranges only
    #[tokio::test]
    async fn test_unknown_sheet_id_is_reported_per_range() {
        let (endpoints, sheets) = sheets_endpoints();

        let response = endpoints.gsheets_read("sheet-1", &["A1:B2", "Other!A1"], Some(42)).await;

        assert!(response.is_success(), "{}", response.body);
        let ranges = response.data()["valueRanges"].as_array().unwrap();
        assert_eq!(ranges[0]["status"], "error");
        assert_eq!(ranges[0]["error"]["kind"], "NotFound");
        assert_eq!(ranges[0]["error"]["httpStatus"], 404);
        assert_eq!(ranges[1]["status"], "success");
        assert_eq!(*sheets.requested.lock().unwrap(), vec!["Other!A1".to_string()]);
    }

    #[tokio::test]
    async fn test_update_without_value_never_calls_backend() {
        let (endpoints, sheets) = sheets_endpoints();

        let response = endpoints.gsheets_update_cell("sheet-1", "Sheet1!B2", Value::Null).await;

        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["kind"], "InvalidParameters");
        assert_eq!(sheets.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_writes_numbers_as_text() {
        let (endpoints, sheets) = sheets_endpoints();

        let response = endpoints.gsheets_update_cell("sheet-1", "Sheet1!B2", json!(42)).await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["value"], "42");
        assert_eq!(response.data()["updatedRange"], "Sheet1!B2");
        assert_eq!(sheets.updates.load(Ordering::SeqCst), 1);
    }
}

mod dynamodb_tests {
    use super::*;

    fn dynamodb_endpoints() -> Endpoints {
        dynamodb_endpoints_with_table().0
    }

    fn dynamodb_endpoints_with_table() -> (Endpoints, Arc<FixtureTable>) {
        let table = Arc::new(FixtureTable::default());
        let adapter = DynamoDbAdapter::new(Arc::clone(&table) as Arc<dyn DynamoDbBackend>);
        (endpoints(Arc::new(adapter)), table)
    }

    #[tokio::test]
    async fn test_describe_table() {
        let response = dynamodb_endpoints()
            .call("dynamodb_describe_table", &json!({"table": "users"}))
            .await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["tableName"], "users");
        assert_eq!(response.data()["keySchema"][0]["keyType"], "HASH");

        let response = dynamodb_endpoints()
            .call("dynamodb_describe_table", &json!({"table": "orders"}))
            .await;
        assert_eq!(response.status, 404);
    }

    /// Key names and values containing `/` reach the backend intact
    #[tokio::test]
    async fn test_slashes_in_key_name_and_value() {
        let (endpoints, table) = dynamodb_endpoints_with_table();

        let response = endpoints
            .call(
                "dynamodb_get_item",
                &json!({"table": "docs", "keyName": "dept/id", "keyValue": "eng/42"}),
            )
            .await;

        assert!(response.is_success(), "{}", response.body);
        let keys = table.keys.lock().unwrap().clone();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "dept/id");
        assert_eq!(keys[0].value, "eng/42");
    }

    #[tokio::test]
    async fn test_table_name_with_slash_is_rejected() {
        let (endpoints, table) = dynamodb_endpoints_with_table();

        let response = endpoints
            .call("dynamodb_describe_table", &json!({"table": "users/extra"}))
            .await;

        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["kind"], "InvalidParameters");
        assert!(table.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_item_found() {
        let response = dynamodb_endpoints()
            .call("dynamodb_get_item", &json!({"table": "users", "keyName": "id", "keyValue": "u-1"}))
            .await;

        assert!(response.is_success());
        assert_eq!(response.data()["name"], json!({"S": "Ada"}));
    }

    /// A missing item is a successful, empty result rather than a 404
    #[tokio::test]
    async fn test_get_item_missing_is_empty_success() {
        let response = dynamodb_endpoints()
            .call("dynamodb_get_item", &json!({"table": "users", "keyName": "id", "keyValue": "u-404"}))
            .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["status"], "success");
        assert_eq!(response.data(), &json!({}));
    }

    /// The resource read path picks getItem for three-segment locators
    #[tokio::test]
    async fn test_read_resource_defaults_to_get_item() {
        let response = dynamodb_endpoints()
            .read_resource("dynamodb://users/id/u-1", None, &Default::default())
            .await;

        assert!(response.is_success());
        assert_eq!(response.data()["id"], json!({"S": "u-1"}));
    }

    #[tokio::test]
    async fn test_unregistered_scheme_is_unsupported() {
        let response = dynamodb_endpoints()
            .read_resource("s3://bucket", None, &Default::default())
            .await;

        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"]["kind"], "UnsupportedScheme");
    }
}

mod s3_tests {
    use super::*;

    fn s3_endpoints() -> Endpoints {
        endpoints(Arc::new(S3Adapter::new(Arc::new(FixtureBucket))))
    }

    #[tokio::test]
    async fn test_get_object_info_keeps_nested_key() {
        let response = s3_endpoints()
            .call("s3_get_object_info", &json!({"bucket": "logs", "key": "2024/01/app.log"}))
            .await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["key"], "2024/01/app.log");
        assert_eq!(response.data()["contentLength"], 7);
        assert!(response.data().get("content").is_none());
    }

    /// Object bodies are base64 even when they are valid UTF-8
    #[tokio::test]
    async fn test_get_object_is_always_base64() {
        let response = s3_endpoints()
            .call("s3_get_object", &json!({"bucket": "logs", "key": "2024/01/app.log"}))
            .await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["encoding"], "base64");
        assert_eq!(response.data()["content"], "c3RhcnRlZA==");
    }

    #[tokio::test]
    async fn test_get_object_info_missing() {
        let response = s3_endpoints()
            .call("s3_get_object_info", &json!({"bucket": "logs", "key": "nope.log"}))
            .await;

        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["kind"], "NotFound");
    }
}

mod cloudwatch_tests {
    use super::*;

    fn cloudwatch_endpoints() -> (Endpoints, Arc<FixtureWatch>) {
        let watch = Arc::new(FixtureWatch::default());
        let adapter = CloudWatchAdapter::new(
            Arc::clone(&watch) as Arc<dyn CloudWatchBackend>,
            Arc::clone(&watch) as Arc<dyn LogsBackend>,
        );
        (endpoints(Arc::new(adapter)), watch)
    }

    #[tokio::test]
    async fn test_list_metrics_pages_through_namespace() {
        let (endpoints, watch) = cloudwatch_endpoints();

        let first = endpoints
            .call("cloudwatch_list_metrics", &json!({"namespace": "AWS/Lambda"}))
            .await;
        assert!(first.is_success(), "{}", first.body);
        assert_eq!(first.data()["metrics"][0]["metricName"], "Invocations");
        let token = first.next_page_token().unwrap().to_string();

        let second = endpoints
            .call("cloudwatch_list_metrics", &json!({"namespace": "AWS/Lambda", "pageToken": token}))
            .await;
        assert_eq!(second.data()["metrics"][0]["metricName"], "Errors");
        assert_eq!(second.next_page_token(), None);

        assert_eq!(
            *watch.namespaces.lock().unwrap(),
            vec!["AWS/Lambda".to_string(), "AWS/Lambda".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_log_groups_by_prefix() {
        let (endpoints, _) = cloudwatch_endpoints();

        let response = endpoints
            .call("cloudwatch_list_log_groups", &json!({"prefix": "/aws/lambda"}))
            .await;

        assert!(response.is_success(), "{}", response.body);
        let groups = response.data()["logGroups"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["logGroupName"], "/aws/lambda/ingest");

        let response = endpoints.call("cloudwatch_list_log_groups", &json!({})).await;
        assert_eq!(response.data()["logGroups"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_logs_returns_rows_and_statistics() {
        let (endpoints, watch) = cloudwatch_endpoints();

        let response = endpoints
            .call(
                "cloudwatch_query_logs",
                &json!({
                    "logGroupName": "/aws/lambda/ingest",
                    "query": "fields @timestamp, @message | filter @message like /ERROR/",
                    "hours": 6,
                }),
            )
            .await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["status"], "Complete");
        assert_eq!(response.data()["statistics"]["recordsMatched"], 1.0);
        assert_eq!(response.data()["results"][0]["@message"], "ERROR timeout");
        assert_eq!(response.data()["logGroupName"], "/aws/lambda/ingest");

        let query = watch.log_queries.lock().unwrap()[0].clone();
        assert_eq!((query.end - query.start).num_hours(), 6);
        assert_eq!(query.limit, 1000);
    }

    #[tokio::test]
    async fn test_query_logs_requires_query() {
        let (endpoints, watch) = cloudwatch_endpoints();

        let response = endpoints
            .call("cloudwatch_query_logs", &json!({"logGroupName": "/aws/lambda/ingest"}))
            .await;

        assert_eq!(response.status, 400);
        assert!(watch.log_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_logs_unknown_group() {
        let (endpoints, _) = cloudwatch_endpoints();

        let response = endpoints
            .call(
                "cloudwatch_query_logs",
                &json!({"logGroupName": "/missing", "query": "fields @message"}),
            )
            .await;

        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["kind"], "NotFound");
    }
}

mod lambda_tests {
    use super::*;

    fn lambda_endpoints() -> (Endpoints, Arc<FixtureWatch>) {
        let watch = Arc::new(FixtureWatch::default());
        let lambda = LambdaAdapter::new(
            Arc::new(FixtureFunctions),
            Arc::clone(&watch) as Arc<dyn CloudWatchBackend>,
        );
        (endpoints(Arc::new(lambda)), watch)
    }

    #[tokio::test]
    async fn test_get_invocations_defaults_to_one_day() {
        let (endpoints, watch) = lambda_endpoints();

        let response = endpoints
            .call("lambda_get_invocations", &json!({"functionName": "ingest"}))
            .await;

        assert!(response.is_success(), "{}", response.body);
        assert_eq!(response.data()["days"], 1);
        assert_eq!(
            response.data()["datapoints"],
            json!([
                {"timestamp": "2026-10-16T00:00:00Z", "invocations": 12.0},
                {"timestamp": "2026-10-16T01:00:00Z", "invocations": 3.0},
            ])
        );

        let query = watch.metric_queries.lock().unwrap()[0].clone();
        assert_eq!(query.namespace, "AWS/Lambda");
        assert_eq!(query.metric_name, "Invocations");
        assert_eq!(query.statistics, vec![MetricStatistic::Sum]);
        assert_eq!(query.dimensions, vec![("FunctionName".to_string(), "ingest".to_string())]);
        assert_eq!((query.end - query.start).num_days(), 1);
    }

    #[tokio::test]
    async fn test_get_invocations_rejects_long_windows() {
        let (endpoints, watch) = lambda_endpoints();

        let response = endpoints
            .call("lambda_get_invocations", &json!({"functionName": "ingest", "days": 90}))
            .await;

        assert_eq!(response.status, 400);
        assert!(watch.metric_queries.lock().unwrap().is_empty());
    }

    /// Lambda and CloudWatch share one metrics backend
    #[tokio::test]
    async fn test_shared_metrics_backend() {
        let watch = Arc::new(FixtureWatch::default());
        let metrics = Arc::clone(&watch) as Arc<dyn CloudWatchBackend>;
        let lambda: Arc<dyn ServiceAdapter> =
            Arc::new(LambdaAdapter::new(Arc::new(FixtureFunctions), Arc::clone(&metrics)));
        let cloudwatch: Arc<dyn ServiceAdapter> = Arc::new(CloudWatchAdapter::new(
            metrics,
            Arc::clone(&watch) as Arc<dyn LogsBackend>,
        ));
        let endpoints = endpoints_for(vec![lambda, cloudwatch]);

        let invocations = endpoints
            .call("lambda_get_invocations", &json!({"functionName": "ingest", "days": 2}))
            .await;
        let metrics = endpoints
            .call("cloudwatch_list_metrics", &json!({"namespace": "AWS/Lambda"}))
            .await;

        assert!(invocations.is_success());
        assert!(metrics.is_success());
        assert_eq!(watch.metric_queries.lock().unwrap().len(), 1);
        assert_eq!(watch.namespaces.lock().unwrap().len(), 1);
    }
}

mod iam_tests {
    use super::*;

    fn iam_endpoints() -> Endpoints {
        endpoints(Arc::new(IamAdapter::new(Arc::new(FixtureRoles))))
    }

    #[tokio::test]
    async fn test_list_attached_policies_paginates() {
        let endpoints = iam_endpoints();

        let first = endpoints
            .call("iam_list_attached_policies", &json!({"roleName": "ops"}))
            .await;
        assert!(first.is_success(), "{}", first.body);
        assert_eq!(first.data()["policies"][0]["policyName"], "ReadOnlyAccess");
        assert_eq!(first.next_page_token(), Some("p2"));

        let second = endpoints
            .call("iam_list_attached_policies", &json!({"roleName": "ops", "pageToken": "p2"}))
            .await;
        assert_eq!(second.data()["policies"][0]["policyName"], "CloudWatchLogsFullAccess");
        assert!(second.body.get("nextPageToken").is_none());
    }

    #[tokio::test]
    async fn test_list_attached_policies_unknown_role() {
        let response = iam_endpoints()
            .call("iam_list_attached_policies", &json!({"roleName": "ghost"}))
            .await;
        assert_eq!(response.status, 404);
    }
}
