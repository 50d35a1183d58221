//! IAM adapter
//!
//! - `iam://*` - listRoles
//! - `iam://{roleName}` - getRole, listAttachedPolicies
//!
//! Read-only. Trust policies come back URL-encoded from IAM and are decoded
//! into JSON when possible.

use super::{
    expect_collection, expect_segments, page_token, required_segment, unsupported_operation,
    Page, ServiceAdapter,
};
use crate::aws::{format_time, map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_iam::types::Role;
use aws_sdk_iam::Client;
use aws_smithy_types::DateTime;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["listRoles", "getRole", "listAttachedPolicies"];

/// Calls the IAM adapter needs
#[async_trait]
pub trait IamBackend: Send + Sync {
    async fn list_roles(&self, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn get_role(&self, role_name: &str) -> Result<Value, GatewayError>;

    async fn list_attached_policies(&self, role_name: &str, page_token: Option<String>) -> Result<Page, GatewayError>;
}

pub struct IamAdapter {
    backend: Arc<dyn IamBackend>,
}

impl IamAdapter {
    pub fn new(backend: Arc<dyn IamBackend>) -> Self {
        Self { backend }
    }
}

fn role_name(locator: &ResourceLocator) -> Result<&str, GatewayError> {
    expect_segments(locator, 1, "iam://{roleName}")?;
    required_segment(locator, 0, "role name")
}

#[async_trait]
impl ServiceAdapter for IamAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::Iam
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        match (locator.is_collection(), locator.segments().len()) {
            (true, _) => Some("listRoles"),
            (false, 1) => Some("getRole"),
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
            "listRoles" => {
                expect_collection(locator, operation)?;
                let page = self.backend.list_roles(page_token(params)?).await?;
                Ok(page.into_result("roles"))
            },
            "getRole" => {
                let name = role_name(locator)?;
                Ok(NormalizedResult::new(self.backend.get_role(name).await?))
            },
            "listAttachedPolicies" => {
                let name = role_name(locator)?;
                let page = self
                    .backend
                    .list_attached_policies(name, page_token(params)?)
                    .await?;
                Ok(page.into_result("policies"))
            },
            other => Err(unsupported_operation(Scheme::Iam, other)),
        }
    }
}

/// IAM returns policy documents URL-encoded
pub fn decode_policy_document(raw: &str) -> Value {
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    serde_json::from_str(&decoded).unwrap_or(Value::String(decoded))
}

fn role_details(role: &Role) -> Value {
    let created: Option<&DateTime> = role.create_date().into();
    json!({
        "roleName": role.role_name(),
        "roleId": role.role_id(),
        "arn": role.arn(),
        "path": role.path(),
        "description": role.description(),
        "createDate": format_time(created),
        "assumeRolePolicyDocument": role.assume_role_policy_document().map(decode_policy_document),
    })
}

/// IAM through the AWS SDK
pub struct SdkIamBackend {
    aws: AwsContext,
}

impl SdkIamBackend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        Ok(Client::new(&self.aws.sdk_config().await?))
    }
}

#[async_trait]
impl IamBackend for SdkIamBackend {
    async fn list_roles(&self, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_roles()
            .set_marker(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("IAM ListRoles", err));
        let output = self.aws.observe(outcome).await?;

        let roles = output
            .roles()
            .iter()
            .map(|role| {
                let created: Option<&DateTime> = role.create_date().into();
                json!({
                    "roleName": role.role_name(),
                    "path": role.path(),
                    "createDate": format_time(created),
                })
            })
            .collect();

        Ok(Page::new(roles, output.marker().map(str::to_string)))
    }

    async fn get_role(&self, role_name: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|err| map_sdk_error("IAM GetRole", err));
        let output = self.aws.observe(outcome).await?;

        let role: Option<&Role> = output.role().into();
        role.map(role_details)
            .ok_or_else(|| GatewayError::not_found(format!("role '{}' not found", role_name)))
    }

    async fn list_attached_policies(&self, role_name: &str, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_attached_role_policies()
            .role_name(role_name)
            .set_marker(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("IAM ListAttachedRolePolicies", err));
        let output = self.aws.observe(outcome).await?;

        let policies = output
            .attached_policies()
            .iter()
            .map(|policy| {
                json!({
                    "policyName": policy.policy_name(),
                    "policyArn": policy.policy_arn(),
                })
            })
            .collect();

        Ok(Page::new(policies, output.marker().map(str::to_string)))
    }
}
