//! Google Sheets adapter
//!
//! - `gsheets://{spreadsheetId}` - readRange (`ranges`, `sheetId`), updateCell (`range`, `value`)
//!
//! readRange fetches every requested A1 range independently and reports the
//! outcome per range, in request order. One bad range never fails the call.

use super::{
    expect_segments, optional_i64, required_segment, required_str, required_str_list,
    unsupported_operation, ServiceAdapter,
};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::google::GoogleClient;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["readRange", "updateCell"];

/// Values are written as typed, never parsed as formulas
const VALUE_INPUT_OPTION: &str = "RAW";

/// Calls the Sheets adapter needs
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// `values.get` for one A1 range
    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Value, GatewayError>;

    /// Title of the tab with the numeric `sheet_id`
    async fn sheet_title(&self, spreadsheet_id: &str, sheet_id: i64) -> Result<String, GatewayError>;

    /// `values.update` of a single cell
    async fn update_cell(&self, spreadsheet_id: &str, range: &str, value: String) -> Result<Value, GatewayError>;
}

pub struct SheetsAdapter {
    backend: Arc<dyn SheetsBackend>,
}

impl SheetsAdapter {
    pub fn new(backend: Arc<dyn SheetsBackend>) -> Self {
        Self { backend }
    }

    async fn read_ranges(
        &self,
        spreadsheet_id: &str,
        ranges: Vec<String>,
        sheet_id: Option<i64>,
    ) -> Result<NormalizedResult, GatewayError> {
        // A failed title lookup only fails the ranges that needed it
        let title = match sheet_id {
            Some(id) if ranges.iter().any(|r| !r.contains('!')) => {
                Some(self.backend.sheet_title(spreadsheet_id, id).await)
            },
            _ => None,
        };

        let requests = ranges.iter().map(|range| {
            let resolved = match &title {
                Some(Err(err)) if !range.contains('!') => Err(err),
                Some(Ok(title)) => Ok(qualify_range(range, Some(title))),
                _ => Ok(range.clone()),
            };
            async move {
                match resolved {
                    Ok(resolved) => {
                        let outcome = self.backend.read_range(spreadsheet_id, &resolved).await;
                        range_entry(range, outcome)
                    },
                    Err(err) => error_entry(range, err),
                }
            }
        });
        let entries = join_all(requests).await;

        let failed = entries.iter().filter(|e| e["status"] == "error").count();
        if failed > 0 {
            tracing::warn!(
                "{} of {} ranges failed for spreadsheet {}",
                failed,
                entries.len(),
                spreadsheet_id
            );
        }

        Ok(NormalizedResult::new(json!({
            "spreadsheetId": spreadsheet_id,
            "valueRanges": entries,
        })))
    }
}

/// Prefix an unqualified A1 range with a quoted sheet title
pub fn qualify_range(range: &str, title: Option<&str>) -> String {
    match title {
        Some(title) if !range.contains('!') => {
            format!("'{}'!{}", title.replace('\'', "''"), range)
        },
        _ => range.to_string(),
    }
}

fn range_entry(range: &str, outcome: Result<Value, GatewayError>) -> Value {
    match outcome {
        Ok(value_range) => json!({
            "range": range,
            "status": "success",
            "resolvedRange": value_range.get("range").cloned().unwrap_or(Value::Null),
            "values": value_range.get("values").cloned().unwrap_or_else(|| json!([])),
        }),
        Err(err) => error_entry(range, &err),
    }
}

fn error_entry(range: &str, err: &GatewayError) -> Value {
    json!({
        "range": range,
        "status": "error",
        "error": err.to_json(),
    })
}

/// Cell value as the string Sheets stores
fn cell_value(params: &Params) -> Result<String, GatewayError> {
    match params.get("value") {
        None | Some(Value::Null) => Err(GatewayError::missing_field("value")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(GatewayError::invalid_parameters(
            "field 'value' must be a string, number or boolean",
        )),
    }
}

#[async_trait]
impl ServiceAdapter for SheetsAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::GSheets
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        match operation {
            "readRange" => {
                expect_segments(locator, 1, "gsheets://{spreadsheetId}")?;
                let spreadsheet_id = required_segment(locator, 0, "spreadsheet id")?;
                let ranges = required_str_list(params, "ranges")?;
                let sheet_id = optional_i64(params, "sheetId")?;
                self.read_ranges(spreadsheet_id, ranges, sheet_id).await
            },
            "updateCell" => {
                expect_segments(locator, 1, "gsheets://{spreadsheetId}")?;
                let spreadsheet_id = required_segment(locator, 0, "spreadsheet id")?;
                let range = required_str(params, "range")?;
                if range.trim().is_empty() {
                    return Err(GatewayError::invalid_parameters("range must not be empty"));
                }
                let value = cell_value(params)?;
                let update = self.backend.update_cell(spreadsheet_id, range, value).await?;
                Ok(NormalizedResult::new(update))
            },
            other => Err(unsupported_operation(Scheme::GSheets, other)),
        }
    }
}

/// Sheets v4 over REST
pub struct RestSheetsBackend {
    client: GoogleClient,
}

impl RestSheetsBackend {
    pub fn new(client: GoogleClient) -> Self {
        Self { client }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        let path = format!(
            "spreadsheets/{}/values/{}",
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        );
        self.client.endpoints().sheets_url(&path)
    }
}

#[async_trait]
impl SheetsBackend for RestSheetsBackend {
    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Value, GatewayError> {
        self.client
            .get_json(&self.values_url(spreadsheet_id, range), &[])
            .await
    }

    async fn sheet_title(&self, spreadsheet_id: &str, sheet_id: i64) -> Result<String, GatewayError> {
        let path = format!("spreadsheets/{}", urlencoding::encode(spreadsheet_id));
        let url = self.client.endpoints().sheets_url(&path);
        let metadata = self
            .client
            .get_json(&url, &[("fields", "sheets.properties(sheetId,title)".to_string())])
            .await?;

        metadata["sheets"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|sheet| &sheet["properties"])
            .find(|props| props["sheetId"].as_i64() == Some(sheet_id))
            .and_then(|props| props["title"].as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "spreadsheet '{}' has no sheet with id {}",
                    spreadsheet_id, sheet_id
                ))
            })
    }

    async fn update_cell(&self, spreadsheet_id: &str, range: &str, value: String) -> Result<Value, GatewayError> {
        let body = json!({
            "range": range,
            "values": [[value]],
        });
        let response = self
            .client
            .put_json(
                &self.values_url(spreadsheet_id, range),
                &[("valueInputOption", VALUE_INPUT_OPTION.to_string())],
                &body,
            )
            .await?;

        tracing::info!("Updated {} in spreadsheet {}", range, spreadsheet_id);

        Ok(json!({
            "spreadsheetId": spreadsheet_id,
            "updatedRange": response.get("updatedRange"),
            "updatedCells": response.get("updatedCells"),
            "updatedRows": response.get("updatedRows"),
            "updatedColumns": response.get("updatedColumns"),
        }))
    }
}
