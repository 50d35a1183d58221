//! S3 adapter
//!
//! - `s3://*` - listBuckets
//! - `s3://{bucket}` - listObjects (`prefix`, `maxKeys`, `pageToken`)
//! - `s3://{bucket}/{key...}` - getObject, getObjectInfo
//!
//! Object keys are the remaining segments re-joined with `/`. Object content
//! is returned base64 encoded together with its content type; decoding is
//! left to the caller.

use super::{
    expect_collection, optional_str, optional_u32, page_token, required_segment,
    unsupported_operation, Page, ServiceAdapter,
};
use crate::aws::{format_time, map_sdk_error, AwsContext};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["listBuckets", "listObjects", "getObject", "getObjectInfo"];

/// Downloaded object body
#[derive(Debug, Clone, Default)]
pub struct ObjectContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Calls the S3 adapter needs
#[async_trait]
pub trait S3Backend: Send + Sync {
    async fn list_buckets(&self, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<String>,
        max_keys: Option<u32>,
        page_token: Option<String>,
    ) -> Result<Page, GatewayError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, GatewayError>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Value, GatewayError>;
}

pub struct S3Adapter {
    backend: Arc<dyn S3Backend>,
}

impl S3Adapter {
    pub fn new(backend: Arc<dyn S3Backend>) -> Self {
        Self { backend }
    }
}

fn object_key(locator: &ResourceLocator) -> Result<String, GatewayError> {
    locator
        .tail(1)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            GatewayError::invalid_parameters(format!("'{}' does not name an object key", locator))
        })
}

#[async_trait]
impl ServiceAdapter for S3Adapter {
    fn scheme(&self) -> Scheme {
        Scheme::S3
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        if locator.is_collection() {
            return Some("listBuckets");
        }
        match locator.tail(1) {
            Some(key) if !key.is_empty() => Some("getObject"),
            _ => Some("listObjects"),
        }
    }

    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        match operation {
            "listBuckets" => {
                expect_collection(locator, operation)?;
                let page = self.backend.list_buckets(page_token(params)?).await?;
                Ok(page.into_result("buckets"))
            },
            "listObjects" => {
                let bucket = required_segment(locator, 0, "bucket")?;
                let prefix = optional_str(params, "prefix")?
                    .map(str::to_string)
                    .or_else(|| locator.tail(1).filter(|p| !p.is_empty()));
                let max_keys = optional_u32(params, "maxKeys")?;
                let page = self
                    .backend
                    .list_objects(bucket, prefix, max_keys, page_token(params)?)
                    .await?;
                Ok(page.into_result("objects"))
            },
            "getObject" => {
                let bucket = required_segment(locator, 0, "bucket")?;
                let key = object_key(locator)?;
                let object = self.backend.get_object(bucket, &key).await?;
                Ok(NormalizedResult::new(json!({
                    "bucket": bucket,
                    "key": key,
                    "contentType": object.content_type,
                    "contentLength": object.bytes.len(),
                    "encoding": "base64",
                    "content": BASE64.encode(&object.bytes),
                })))
            },
            "getObjectInfo" => {
                let bucket = required_segment(locator, 0, "bucket")?;
                let key = object_key(locator)?;
                let info = self.backend.head_object(bucket, &key).await?;
                Ok(NormalizedResult::new(info))
            },
            other => Err(unsupported_operation(Scheme::S3, other)),
        }
    }
}

/// S3 through the AWS SDK
pub struct SdkS3Backend {
    aws: AwsContext,
}

impl SdkS3Backend {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }

    async fn client(&self) -> Result<Client, GatewayError> {
        let config = self.aws.sdk_config().await?;
        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        // Endpoint overrides (LocalStack, MinIO) need path-style addressing
        if config.endpoint_url().is_some() {
            builder = builder.force_path_style(true);
        }
        Ok(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl S3Backend for SdkS3Backend {
    async fn list_buckets(&self, page_token: Option<String>) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_buckets()
            .set_continuation_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("S3 ListBuckets", err));
        let output = self.aws.observe(outcome).await?;

        let buckets = output
            .buckets()
            .iter()
            .map(|bucket| {
                json!({
                    "name": bucket.name(),
                    "creationDate": format_time(bucket.creation_date()),
                })
            })
            .collect();

        Ok(Page::new(buckets, output.continuation_token().map(str::to_string)))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<String>,
        max_keys: Option<u32>,
        page_token: Option<String>,
    ) -> Result<Page, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix)
            .set_max_keys(max_keys.map(|n| n.min(i32::MAX as u32) as i32))
            .set_continuation_token(page_token)
            .send()
            .await
            .map_err(|err| map_sdk_error("S3 ListObjectsV2", err));
        let output = self.aws.observe(outcome).await?;

        let objects = output
            .contents()
            .iter()
            .map(|object| {
                json!({
                    "key": object.key(),
                    "size": object.size(),
                    "lastModified": format_time(object.last_modified()),
                    "storageClass": object.storage_class().map(|c| c.as_str()),
                    "etag": object.e_tag(),
                })
            })
            .collect();

        Ok(Page::new(
            objects,
            output.next_continuation_token().map(str::to_string),
        ))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error("S3 GetObject", err));
        let output = self.aws.observe(outcome).await?;

        let content_type = output.content_type().map(str::to_string);
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| {
                GatewayError::unavailable(format!("S3 GetObject: body of '{}' could not be read", key))
                    .with_cause(err)
            })?
            .into_bytes();

        tracing::debug!("Downloaded s3://{}/{} ({} bytes)", bucket, key, bytes.len());

        Ok(ObjectContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Value, GatewayError> {
        let client = self.client().await?;
        let outcome = client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error("S3 HeadObject", err));
        let output = self.aws.observe(outcome).await?;

        Ok(json!({
            "bucket": bucket,
            "key": key,
            "contentLength": output.content_length(),
            "contentType": output.content_type(),
            "lastModified": format_time(output.last_modified()),
            "metadata": output.metadata().cloned().unwrap_or_default(),
            "storageClass": output.storage_class().map(|c| c.as_str()),
            "etag": output.e_tag(),
        }))
    }
}
