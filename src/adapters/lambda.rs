//! Lambda adapter
//!
//! - `lambda://*` - listFunctions
//! - `lambda://{functionName}` - getFunction, getInvocations
//!
//! Environment variables are reported by name only. Invocation counts come
//! from the CloudWatch `AWS/Lambda` namespace. Read-only.

use super::cloudwatch::{CloudWatchBackend, MetricQuery};
use super::{
    expect_collection, expect_segments, optional_u32, page_token, required_segment, unsupported_operation, Page,
    ServiceAdapter,
};
use crate::aws::{map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_lambda::types::FunctionConfiguration;
use aws_sdk_lambda::Client;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["listFunctions", "getFunction", "getInvocations"];

/// Days of invocation history when `days` is not given
pub const DEFAULT_INVOCATION_DAYS: u32 = 1;

/// 60 days of hourly buckets is the GetMetricStatistics datapoint cap
const MAX_INVOCATION_DAYS: u32 = 60;

/// Calls the Lambda adapter needs
#[async_trait]
pub trait LambdaBackend: Send + Sync {
    async fn list_functions(&self, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn get_function(&self, name: &str) -> Result<Value, GatewayError>;
}

pub struct LambdaAdapter {
    backend: Arc<dyn LambdaBackend>,
    metrics: Arc<dyn CloudWatchBackend>,
}

impl LambdaAdapter {
    pub fn new(backend: Arc<dyn LambdaBackend>, metrics: Arc<dyn CloudWatchBackend>) -> Self {
        Self { backend, metrics }
    }
}

fn invocation_days(params: &Params) -> Result<u32, GatewayError> {
    match optional_u32(params, "days")? {
        None => Ok(DEFAULT_INVOCATION_DAYS),
        Some(days) if (1..=MAX_INVOCATION_DAYS).contains(&days) => Ok(days),
        Some(days) => Err(GatewayError::invalid_parameters(format!(
            "days must be between 1 and {}, got {}",
            MAX_INVOCATION_DAYS, days
        ))),
    }
}

#[async_trait]
impl ServiceAdapter for LambdaAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::Lambda
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        match (locator.is_collection(), locator.segments().len()) {
            (true, _) => Some("listFunctions"),
            (false, 1) => Some("getFunction"),
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
            "listFunctions" => {
                expect_collection(locator, operation)?;
                let page = self.backend.list_functions(page_token(params)?).await?;
                Ok(page.into_result("functions"))
            },
            "getFunction" => {
                expect_segments(locator, 1, "lambda://{functionName}")?;
                let name = required_segment(locator, 0, "function name")?;
                let function = self.backend.get_function(name).await?;
                Ok(NormalizedResult::new(function))
            },
            "getInvocations" => {
                expect_segments(locator, 1, "lambda://{functionName}")?;
                let name = required_segment(locator, 0, "function name")?;
                let days = invocation_days(params)?;

                let query = MetricQuery::lambda_invocations(name, days, Utc::now());
                let datapoints: Vec<Value> = self
                    .metrics
                    .get_metric_statistics(&query)
                    .await?
                    .into_iter()
                    .map(|point| {
                        json!({
                            "timestamp": point["timestamp"],
                            "invocations": point["sum"],
                        })
                    })
                    .collect();

                Ok(NormalizedResult::new(json!({
                    "functionName": name,
                    "days": days,
                    "periodSeconds": query.period_seconds,
                    "startTime": query.start.to_rfc3339(),
                    "endTime": query.end.to_rfc3339(),
                    "datapoints": datapoints,
                })))
            },
            other => Err(unsupported_operation(Scheme::Lambda, other)),
        }
    }
}

fn summary(function: &FunctionConfiguration) -> Value {
    json!({
        "functionName": function.function_name(),
        "runtime": function.runtime().map(|r| r.as_str()),
        "handler": function.handler(),
        "lastModified": function.last_modified(),
        "memorySize": function.memory_size(),
        "timeout": function.timeout(),
    })
}

fn details(function: &FunctionConfiguration) -> Value {
    let mut variables: Vec<&str> = function
        .environment()
        .and_then(|env| env.variables())
        .map(|vars| vars.keys().map(String::as_str).collect())
        .unwrap_or_default();
    variables.sort_unstable();

    json!({
        "functionName": function.function_name(),
        "functionArn": function.function_arn(),
        "runtime": function.runtime().map(|r| r.as_str()),
        "handler": function.handler(),
        "codeSize": function.code_size(),
        "description": function.description(),
        "timeout": function.timeout(),
        "memorySize": function.memory_size(),
        "lastModified": function.last_modified(),
        "role": function.role(),
        "environmentVariables": variables,
    })
}

/// Lambda through the AWS SDK
pub struct SdkLambdaBackend {
    aws: AwsContext,
}

impl SdkLambdaBackend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl LambdaBackend for SdkLambdaBackend {
    async fn list_functions(&self, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_functions()
            .set_marker(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("Lambda ListFunctions", err));
        let output = self.aws.observe(outcome).await?;

        let functions = output.functions().iter().map(summary).collect();
        Ok(Page::new(functions, output.next_marker().map(str::to_string)))
    }

    async fn get_function(&self, name: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|err| map_sdk_error("Lambda GetFunction", err));
        let output = self.aws.observe(outcome).await?;

        output
            .configuration()
            .map(details)
            .ok_or_else(|| GatewayError::not_found(format!("function '{}' not found", name)))
    }
}
