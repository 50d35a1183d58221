//! DynamoDB adapter
//!
//! - `dynamodb://*` - listTables
//! - `dynamodb://{table}` - describeTable
//! - `dynamodb://{table}/{keyName}/{keyValue...}` - getItem, queryTable
//! - `dynamodb://{table}/{keyValue...}` with a `keyName` param - getItem, queryTable
//!
//! Items are returned in DynamoDB's typed JSON form (`{"S": "..."}`). A
//! point lookup that finds nothing succeeds with an empty object.

use super::{
    expect_collection, expect_segments, optional_str, optional_u32, page_token, required_segment,
    unsupported_operation, Page, ServiceAdapter,
};
use crate::aws::{format_time, map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, KeyType as SdkKeyType};
use aws_sdk_dynamodb::Client;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["listTables", "describeTable", "getItem", "queryTable"];

/// Items returned by queryTable when no limit is given
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

const MAX_QUERY_LIMIT: u32 = 1000;

/// Scalar type of the addressed key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    Number,
}

impl KeyType {
    fn parse(raw: Option<&str>) -> Result<Self, GatewayError> {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            None | Some("S") => Ok(KeyType::String),
            Some("N") => Ok(KeyType::Number),
            Some(other) => Err(GatewayError::invalid_parameters(format!(
                "keyType must be 'S' or 'N', got '{}'",
                other
            ))),
        }
    }
}

/// `keyName = keyValue` condition
///
/// The key name is the second segment unless a `keyName` param is given,
/// in which case every segment after the table is the value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub name: String,
    pub value: String,
    pub key_type: KeyType,
}

impl KeyCondition {
    fn from_locator(locator: &ResourceLocator, params: &Params) -> Result<Self, GatewayError> {
        let (name, value) = match optional_str(params, "keyName")? {
            Some(name) if name.is_empty() => {
                return Err(GatewayError::invalid_parameters("field 'keyName' must not be empty"))
            },
            Some(name) => (name.to_string(), locator.tail(1)),
            None => (
                required_segment(locator, 1, "key name")?.to_string(),
                locator.tail(2),
            ),
        };
        let value = value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                GatewayError::invalid_parameters(format!("'{}' is missing the key value", locator))
            })?;
        let key_type = KeyType::parse(optional_str(params, "keyType")?)?;

        if key_type == KeyType::Number && value.parse::<f64>().is_err() {
            return Err(GatewayError::invalid_parameters(format!(
                "key value '{}' is not a number",
                value
            )));
        }

        Ok(Self {
            name,
            value,
            key_type,
        })
    }

    fn attribute_value(&self) -> AttributeValue {
        match self.key_type {
            KeyType::String => AttributeValue::S(self.value.clone()),
            KeyType::Number => AttributeValue::N(self.value.clone()),
        }
    }
}

/// Calls the DynamoDB adapter needs
#[async_trait]
pub trait DynamoDbBackend: Send + Sync {
    async fn list_tables(&self, limit: Option<u32>, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn describe_table(&self, table: &str) -> Result<Value, GatewayError>;

    /// `None` when no item has this key
    async fn get_item(&self, table: &str, key: &KeyCondition) -> Result<Option<Value>, GatewayError>;

    async fn query(
        &self,
        table: &str,
        key: &KeyCondition,
        limit: u32,
        page_token: Option<String>,
    ) -> Result<Page, GatewayError>;
}

pub struct DynamoDbAdapter {
    backend: Arc<dyn DynamoDbBackend>,
}

impl DynamoDbAdapter {
    pub fn new(backend: Arc<dyn DynamoDbBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ServiceAdapter for DynamoDbAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::DynamoDb
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        if locator.is_collection() {
            return Some("listTables");
        }
        match locator.segments().len() {
            1 => Some("describeTable"),
            n if n >= 3 => Some("getItem"),
            _ => None,
        }
    }

    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        match operation {
            "listTables" => {
                expect_collection(locator, operation)?;
                let limit = optional_u32(params, "limit")?;
                let page = self.backend.list_tables(limit, page_token(params)?).await?;
                Ok(page.into_result("tables"))
            },
            "describeTable" => {
                expect_segments(locator, 1, "dynamodb://{table}")?;
                let table = required_segment(locator, 0, "table")?;
                let description = self.backend.describe_table(table).await?;
                Ok(NormalizedResult::new(description))
            },
            "getItem" => {
                let table = required_segment(locator, 0, "table")?;
                let key = KeyCondition::from_locator(locator, params)?;
                let item = self.backend.get_item(table, &key).await?;
                Ok(NormalizedResult::new(
                    item.unwrap_or_else(|| Value::Object(Map::new())),
                ))
            },
            "queryTable" => {
                let table = required_segment(locator, 0, "table")?;
                let key = KeyCondition::from_locator(locator, params)?;
                let limit = match optional_u32(params, "limit")? {
                    None => DEFAULT_QUERY_LIMIT,
                    Some(0) => {
                        return Err(GatewayError::invalid_parameters("limit must be at least 1"))
                    },
                    Some(n) => n.min(MAX_QUERY_LIMIT),
                };
                let page = self
                    .backend
                    .query(table, &key, limit, page_token(params)?)
                    .await?;
                Ok(page.into_result("items"))
            },
            other => Err(unsupported_operation(Scheme::DynamoDb, other)),
        }
    }
}

/// Typed DynamoDB JSON for one attribute
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => json!({ "S": s }),
        AttributeValue::N(n) => json!({ "N": n }),
        AttributeValue::B(b) => json!({ "B": BASE64.encode(b.as_ref()) }),
        AttributeValue::Bool(b) => json!({ "BOOL": b }),
        AttributeValue::Null(_) => json!({ "NULL": true }),
        AttributeValue::M(m) => json!({ "M": item_to_json(m) }),
        AttributeValue::L(l) => json!({ "L": l.iter().map(attribute_to_json).collect::<Vec<_>>() }),
        AttributeValue::Ss(ss) => json!({ "SS": ss }),
        AttributeValue::Ns(ns) => json!({ "NS": ns }),
        AttributeValue::Bs(bs) => json!({
            "BS": bs.iter().map(|b| BASE64.encode(b.as_ref())).collect::<Vec<_>>()
        }),
        _ => Value::Null,
    }
}

pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        item.iter()
            .map(|(name, value)| (name.clone(), attribute_to_json(value)))
            .collect(),
    )
}

fn invalid_page_token() -> GatewayError {
    GatewayError::invalid_parameters("pageToken is not a valid DynamoDB query cursor")
}

/// Opaque cursor for a query's `LastEvaluatedKey` (key attributes are S, N or B)
pub fn encode_start_key(key: &HashMap<String, AttributeValue>) -> String {
    URL_SAFE_NO_PAD.encode(item_to_json(key).to_string())
}

pub fn decode_start_key(token: &str) -> Result<HashMap<String, AttributeValue>, GatewayError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| invalid_page_token())?;
    let value: Value = serde_json::from_slice(&raw).map_err(|_| invalid_page_token())?;
    let Value::Object(attributes) = value else {
        return Err(invalid_page_token());
    };

    attributes
        .into_iter()
        .map(|(name, typed)| {
            let attribute = match (typed.get("S"), typed.get("N"), typed.get("B")) {
                (Some(Value::String(s)), _, _) => AttributeValue::S(s.clone()),
                (_, Some(Value::String(n)), _) => AttributeValue::N(n.clone()),
                (_, _, Some(Value::String(b))) => {
                    AttributeValue::B(Blob::new(BASE64.decode(b).map_err(|_| invalid_page_token())?))
                },
                _ => return Err(invalid_page_token()),
            };
            Ok((name, attribute))
        })
        .collect()
}

/// DynamoDB through the AWS SDK
pub struct SdkDynamoDbBackend {
    aws: AwsContext,
}

impl SdkDynamoDbBackend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl DynamoDbBackend for SdkDynamoDbBackend {
    async fn list_tables(&self, limit: Option<u32>, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_tables()
            .set_limit(limit.map(|n| n.clamp(1, 100) as i32))
            .set_exclusive_start_table_name(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("DynamoDB ListTables", err));
        let output = self.aws.observe(outcome).await?;

        let tables = output.table_names().iter().map(|name| json!(name)).collect();
        Ok(Page::new(
            tables,
            output.last_evaluated_table_name().map(str::to_string),
        ))
    }

    async fn describe_table(&self, table: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|err| map_sdk_error("DynamoDB DescribeTable", err));
        let output = self.aws.observe(outcome).await?;

        let Some(description) = output.table() else {
            return Err(GatewayError::not_found(format!("table '{}' not found", table)));
        };

        let key_schema: Vec<Value> = description
            .key_schema()
            .iter()
            .map(|element| {
                let key_type: Option<&SdkKeyType> = element.key_type().into();
                json!({
                    "attributeName": element.attribute_name(),
                    "keyType": key_type.map(|k| k.as_str()),
                })
            })
            .collect();

        let throughput = description.provisioned_throughput();

        Ok(json!({
            "tableName": description.table_name(),
            "status": description.table_status().map(|s| s.as_str()),
            "provisionedThroughput": {
                "readCapacityUnits": throughput.and_then(|t| t.read_capacity_units()),
                "writeCapacityUnits": throughput.and_then(|t| t.write_capacity_units()),
            },
            "keySchema": key_schema,
            "itemCount": description.item_count(),
            "creationDateTime": format_time(description.creation_date_time()),
            "tableSizeBytes": description.table_size_bytes(),
        }))
    }

    async fn get_item(&self, table: &str, key: &KeyCondition) -> Result<Option<Value>, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .get_item()
            .table_name(table)
            .key(&key.name, key.attribute_value())
            .send()
            .await
            .map_err(|err| map_sdk_error("DynamoDB GetItem", err));
        let output = self.aws.observe(outcome).await?;

        Ok(output.item().map(item_to_json))
    }

    async fn query(
        &self,
        table: &str,
        key: &KeyCondition,
        limit: u32,
        page_token: Option<String>,
    ) -> Result<Page, GatewayError> {
        let start_key = page_token.as_deref().map(decode_start_key).transpose()?;

        let client = self.client().await?;
        let outcome = client
            .query()
            .table_name(table)
            .key_condition_expression("#k = :value")
            .expression_attribute_names("#k", &key.name)
            .expression_attribute_values(":value", key.attribute_value())
            .limit(limit as i32)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|err| map_sdk_error("DynamoDB Query", err));
        let output = self.aws.observe(outcome).await?;

        let items = output.items().iter().map(item_to_json).collect();
        Ok(Page::new(
            items,
            output.last_evaluated_key().map(encode_start_key),
        ))
    }
}
