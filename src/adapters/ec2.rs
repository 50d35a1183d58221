//! EC2 adapter
//!
//! - `ec2://*` - listInstances
//! - `ec2://{instanceId}` - getInstance, getInstanceStatus
//!
//! Read-only.

use super::{
    expect_collection, expect_segments, optional_u32, page_token, required_segment,
    unsupported_operation, Page, ServiceAdapter,
};
use crate::aws::{format_time, map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_ec2::types::{Instance, InstanceStatus};
use aws_sdk_ec2::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["listInstances", "getInstance", "getInstanceStatus"];

/// EC2 page size bounds for DescribeInstances
const MIN_PAGE_SIZE: u32 = 5;
const MAX_PAGE_SIZE: u32 = 1000;

/// Calls the EC2 adapter needs
#[async_trait]
pub trait Ec2Backend: Send + Sync {
    async fn list_instances(&self, max_results: Option<u32>, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn get_instance(&self, instance_id: &str) -> Result<Value, GatewayError>;

    async fn get_instance_status(&self, instance_id: &str) -> Result<Value, GatewayError>;
}

pub struct Ec2Adapter {
    backend: Arc<dyn Ec2Backend>,
}

impl Ec2Adapter {
    pub fn new(backend: Arc<dyn Ec2Backend>) -> Self {
        Self { backend }
    }
}

fn instance_id(locator: &ResourceLocator) -> Result<&str, GatewayError> {
    expect_segments(locator, 1, "ec2://{instanceId}")?;
    required_segment(locator, 0, "instance id")
}

#[async_trait]
impl ServiceAdapter for Ec2Adapter {
    fn scheme(&self) -> Scheme {
        Scheme::Ec2
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        match (locator.is_collection(), locator.segments().len()) {
            (true, _) => Some("listInstances"),
            (false, 1) => Some("getInstance"),
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
            "listInstances" => {
                expect_collection(locator, operation)?;
                let max_results = optional_u32(params, "maxResults")?
                    .map(|n| n.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE));
                let page = self
                    .backend
                    .list_instances(max_results, page_token(params)?)
                    .await?;
                Ok(page.into_result("instances"))
            },
            "getInstance" => {
                let id = instance_id(locator)?;
                Ok(NormalizedResult::new(self.backend.get_instance(id).await?))
            },
            "getInstanceStatus" => {
                let id = instance_id(locator)?;
                Ok(NormalizedResult::new(
                    self.backend.get_instance_status(id).await?,
                ))
            },
            other => Err(unsupported_operation(Scheme::Ec2, other)),
        }
    }
}

fn name_tag(instance: &Instance) -> &str {
    instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .unwrap_or_default()
}

fn instance_summary(instance: &Instance) -> Value {
    json!({
        "instanceId": instance.instance_id(),
        "instanceType": instance.instance_type().map(|t| t.as_str()),
        "state": instance.state().and_then(|s| s.name()).map(|n| n.as_str()),
        "publicIpAddress": instance.public_ip_address(),
        "privateIpAddress": instance.private_ip_address(),
        "name": name_tag(instance),
    })
}

fn instance_details(instance: &Instance) -> Value {
    let security_groups: Vec<Option<&str>> = instance
        .security_groups()
        .iter()
        .map(|group| group.group_name())
        .collect();

    let tags: Map<String, Value> = instance
        .tags()
        .iter()
        .filter_map(|tag| Some((tag.key()?.to_string(), json!(tag.value()))))
        .collect();

    json!({
        "instanceId": instance.instance_id(),
        "instanceType": instance.instance_type().map(|t| t.as_str()),
        "state": instance.state().and_then(|s| s.name()).map(|n| n.as_str()),
        "launchTime": format_time(instance.launch_time()),
        "publicIpAddress": instance.public_ip_address(),
        "privateIpAddress": instance.private_ip_address(),
        "securityGroups": security_groups,
        "tags": tags,
    })
}

fn status_details(status: &InstanceStatus) -> Value {
    let events: Vec<Value> = status
        .events()
        .iter()
        .map(|event| {
            json!({
                "code": event.code().map(|c| c.as_str()),
                "description": event.description(),
                "notBefore": format_time(event.not_before()),
                "notAfter": format_time(event.not_after()),
            })
        })
        .collect();

    json!({
        "instanceId": status.instance_id(),
        "instanceState": status.instance_state().and_then(|s| s.name()).map(|n| n.as_str()),
        "instanceStatus": status.instance_status().and_then(|s| s.status()).map(|s| s.as_str()),
        "systemStatus": status.system_status().and_then(|s| s.status()).map(|s| s.as_str()),
        "events": events,
    })
}

/// EC2 through the AWS SDK
pub struct SdkEc2Backend {
    aws: AwsContext,
}

impl SdkEc2Backend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl Ec2Backend for SdkEc2Backend {
    async fn list_instances(&self, max_results: Option<u32>, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_instances()
            .set_max_results(max_results.map(|n| n as i32))
            .set_next_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("EC2 DescribeInstances", err));
        let output = self.aws.observe(outcome).await?;

        let instances = output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(instance_summary)
            .collect();

        Ok(Page::new(instances, output.next_token().map(str::to_string)))
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("EC2 DescribeInstances", err));
        let output = self.aws.observe(outcome).await?;

        output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .next()
            .map(instance_details)
            .ok_or_else(|| GatewayError::not_found(format!("no instance found with id '{}'", instance_id)))
    }

    async fn get_instance_status(&self, instance_id: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .describe_instance_status()
            .instance_ids(instance_id)
            .include_all_instances(true)
            .send()
            .await
            .map_err(|err| map_sdk_error("EC2 DescribeInstanceStatus", err));
        let output = self.aws.observe(outcome).await?;

        output
            .instance_statuses()
            .first()
            .map(status_details)
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "no status information available for instance '{}'",
                    instance_id
                ))
            })
    }
}
