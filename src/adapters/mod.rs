//! Service adapters
//!
//! One adapter per scheme. Each translates `(locator, operation, params)`
//! into a call on its backend and maps the outcome into the normalized
//! result/error shape. Backend-specific error types stop here.
//!
//! # Module Structure
//!
//! - [`gdrive`] / [`gsheets`] - Google REST backends behind [`crate::google`]
//! - [`s3`], [`dynamodb`], [`cloudwatch`], [`lambda`], [`ec2`], [`iam`] -
//!   AWS SDK backends sharing [`crate::aws`] error translation
//! - [`cloudwatch_logs`] - log groups and Insights queries behind the
//!   CloudWatch adapter
//!
//! Every adapter is generic over a small backend trait so the dispatch core
//! can be exercised with in-process fakes.

pub mod cloudwatch;
pub mod cloudwatch_logs;
pub mod dynamodb;
pub mod ec2;
pub mod gdrive;
pub mod gsheets;
pub mod iam;
pub mod lambda;
pub mod s3;

use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// Capability shared by every backend adapter
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Scheme this adapter owns
    fn scheme(&self) -> Scheme;

    /// Names accepted by [`ServiceAdapter::resolve`]
    fn operations(&self) -> &'static [&'static str];

    /// Operation performed when `locator` is read without naming one
    fn default_operation(&self, _locator: &ResourceLocator) -> Option<&'static str> {
        None
    }

    /// Validate, call the backend, normalize
    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError>;
}

/// One page of a backend listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
}

impl Page {
    pub fn new(items: Vec<Value>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token,
        }
    }

    /// Wrap the items under `key` and surface the cursor as pagination
    pub fn into_result(self, key: &str) -> NormalizedResult {
        let mut payload = serde_json::Map::new();
        payload.insert(key.to_string(), Value::Array(self.items));
        NormalizedResult::new(Value::Object(payload)).with_next_page(self.next_page_token)
    }
}

pub(crate) fn unsupported_operation(scheme: Scheme, operation: &str) -> GatewayError {
    GatewayError::invalid_parameters(format!(
        "operation '{}' is not supported for {}://",
        operation, scheme
    ))
}

/// Fail unless `locator` is exactly `scheme://*`
pub(crate) fn expect_collection(locator: &ResourceLocator, operation: &str) -> Result<(), GatewayError> {
    if locator.is_collection() {
        Ok(())
    } else {
        Err(GatewayError::invalid_parameters(format!(
            "{} expects '{}://*', got '{}'",
            operation,
            locator.scheme(),
            locator
        )))
    }
}

/// Non-empty segment at `index`
pub(crate) fn required_segment<'a>(
    locator: &'a ResourceLocator,
    index: usize,
    name: &str,
) -> Result<&'a str, GatewayError> {
    match locator.segment(index) {
        Some(segment) if !segment.is_empty() && segment != crate::locator::COLLECTION_SEGMENT => {
            Ok(segment)
        },
        _ => Err(GatewayError::invalid_parameters(format!(
            "'{}' is missing the {} segment",
            locator, name
        ))),
    }
}

/// Exactly `count` segments
pub(crate) fn expect_segments(
    locator: &ResourceLocator,
    count: usize,
    shape: &str,
) -> Result<(), GatewayError> {
    if locator.segments().len() == count {
        Ok(())
    } else {
        Err(GatewayError::invalid_parameters(format!(
            "'{}' does not match {}",
            locator, shape
        )))
    }
}

pub(crate) fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, GatewayError> {
    optional_str(params, key)?.ok_or_else(|| GatewayError::missing_field(key))
}

pub(crate) fn optional_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, GatewayError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(GatewayError::invalid_parameters(format!(
            "field '{}' must be a string",
            key
        ))),
    }
}

/// Non-negative integer, also accepted in string form ("10")
pub(crate) fn optional_u32(params: &Params, key: &str) -> Result<Option<u32>, GatewayError> {
    let invalid = || {
        GatewayError::invalid_parameters(format!("field '{}' must be a non-negative integer", key))
    };

    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

pub(crate) fn optional_i64(params: &Params, key: &str) -> Result<Option<i64>, GatewayError> {
    let invalid = || GatewayError::invalid_parameters(format!("field '{}' must be an integer", key));

    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Non-empty list of strings
pub(crate) fn required_str_list(params: &Params, key: &str) -> Result<Vec<String>, GatewayError> {
    let Some(value) = params.get(key).filter(|v| !v.is_null()) else {
        return Err(GatewayError::missing_field(key));
    };

    let Some(items) = value.as_array() else {
        return Err(GatewayError::invalid_parameters(format!(
            "field '{}' must be a list of strings",
            key
        )));
    };

    if items.is_empty() {
        return Err(GatewayError::invalid_parameters(format!(
            "field '{}' must not be empty",
            key
        )));
    }

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                GatewayError::invalid_parameters(format!("field '{}' must only contain strings", key))
            })
        })
        .collect()
}

/// Content payload: UTF-8 text when the bytes allow it, base64 otherwise
pub(crate) fn encode_content(bytes: Vec<u8>) -> (&'static str, String) {
    match String::from_utf8(bytes) {
        Ok(text) => ("utf-8", text),
        Err(err) => ("base64", BASE64.encode(err.into_bytes())),
    }
}

/// Opaque cursor from a previous page, empty string treated as absent
pub(crate) fn page_token(params: &Params) -> Result<Option<String>, GatewayError> {
    Ok(optional_str(params, "pageToken")?
        .filter(|t| !t.is_empty())
        .map(str::to_string))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_required_str() {
        let p = params(json!({"bucket": "logs", "size": 3}));
        assert_eq!(required_str(&p, "bucket").unwrap(), "logs");
        assert_eq!(required_str(&p, "key").unwrap_err().kind, ErrorKind::InvalidParameters);
        assert_eq!(required_str(&p, "size").unwrap_err().kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_optional_u32_accepts_numeric_strings() {
        let p = params(json!({"a": 10, "b": "25", "c": -1, "d": "ten"}));
        assert_eq!(optional_u32(&p, "a").unwrap(), Some(10));
        assert_eq!(optional_u32(&p, "b").unwrap(), Some(25));
        assert!(optional_u32(&p, "c").is_err());
        assert!(optional_u32(&p, "d").is_err());
        assert_eq!(optional_u32(&p, "missing").unwrap(), None);
    }

    #[test]
    fn test_required_str_list() {
        let p = params(json!({"ranges": ["A1:B2", "C3"], "empty": [], "mixed": ["A1", 3]}));
        assert_eq!(required_str_list(&p, "ranges").unwrap(), vec!["A1:B2", "C3"]);
        assert!(required_str_list(&p, "empty").is_err());
        assert!(required_str_list(&p, "mixed").is_err());
        assert!(required_str_list(&p, "absent").is_err());
    }

    #[test]
    fn test_required_segment_rejects_collection_and_empty() {
        let locator = ResourceLocator::parse("s3://*").unwrap();
        assert!(required_segment(&locator, 0, "bucket").is_err());

        let locator = ResourceLocator::parse("s3://bucket/").unwrap();
        assert_eq!(required_segment(&locator, 0, "bucket").unwrap(), "bucket");
        assert!(required_segment(&locator, 1, "key").is_err());
    }

    #[test]
    fn test_page_into_result() {
        let page = Page::new(vec![json!(1), json!(2)], Some("next".to_string()));
        let result = page.into_result("items");
        assert_eq!(result.payload, json!({"items": [1, 2]}));
        assert_eq!(result.next_page_token(), Some("next"));
    }

    #[test]
    fn test_encode_content() {
        assert_eq!(encode_content(b"hello".to_vec()), ("utf-8", "hello".to_string()));
        assert_eq!(encode_content(vec![0xff, 0xfe]), ("base64", "//4=".to_string()));
    }

    #[test]
    fn test_empty_page_token_is_absent() {
        let p = params(json!({"pageToken": ""}));
        assert_eq!(page_token(&p).unwrap(), None);
    }
}
