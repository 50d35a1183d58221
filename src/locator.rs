//! Resource Locator Parser
//!
//! Splits `scheme://segment/segment...` into a known [`Scheme`] and its raw
//! path segments. Segment meaning is owned by the adapter for that scheme;
//! this module only performs the outer split.

use crate::error::{ErrorKind, GatewayError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delimiter between scheme and path
pub const SCHEME_DELIMITER: &str = "://";

/// Segment addressing a whole collection (`s3://*`, `lambda://*`)
pub const COLLECTION_SEGMENT: &str = "*";

/// Backend family owning the credentials for a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    Aws,
    Google,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::Aws => f.write_str("aws"),
            BackendFamily::Google => f.write_str("google"),
        }
    }
}

/// Fixed set of addressable services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    S3,
    DynamoDb,
    CloudWatch,
    Lambda,
    Ec2,
    Iam,
    GDrive,
    GSheets,
}

impl Scheme {
    pub const ALL: [Scheme; 8] = [
        Scheme::S3,
        Scheme::DynamoDb,
        Scheme::CloudWatch,
        Scheme::Lambda,
        Scheme::Ec2,
        Scheme::Iam,
        Scheme::GDrive,
        Scheme::GSheets,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::S3 => "s3",
            Scheme::DynamoDb => "dynamodb",
            Scheme::CloudWatch => "cloudwatch",
            Scheme::Lambda => "lambda",
            Scheme::Ec2 => "ec2",
            Scheme::Iam => "iam",
            Scheme::GDrive => "gdrive",
            Scheme::GSheets => "gsheets",
        }
    }

    pub fn family(self) -> BackendFamily {
        match self {
            Scheme::GDrive | Scheme::GSheets => BackendFamily::Google,
            _ => BackendFamily::Aws,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scheme::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| LocatorError::UnknownScheme(s.to_string()))
    }
}

/// Reasons a raw locator string is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("locator '{0}' is missing the '://' delimiter")]
    MissingDelimiter(String),

    #[error("locator '{0}' has an empty scheme")]
    EmptyScheme(String),

    #[error("locator '{0}' has no path segments")]
    EmptyPath(String),

    #[error("unknown scheme '{0}'")]
    UnknownScheme(String),
}

impl From<LocatorError> for GatewayError {
    fn from(err: LocatorError) -> Self {
        let kind = match &err {
            LocatorError::UnknownScheme(_) => ErrorKind::UnsupportedScheme,
            _ => ErrorKind::InvalidParameters,
        };
        GatewayError::new(kind, err.to_string()).with_cause(err)
    }
}

/// Parsed, immutable resource address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceLocator {
    scheme: Scheme,
    segments: Vec<String>,
}

impl ResourceLocator {
    /// Build a locator from already-split segments
    pub fn new<I, S>(scheme: Scheme, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scheme,
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Locator addressing the whole collection of a scheme
    pub fn collection(scheme: Scheme) -> Self {
        Self::new(scheme, [COLLECTION_SEGMENT])
    }

    /// Parse `scheme://segment/segment...`
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let (scheme, path) = raw
            .split_once(SCHEME_DELIMITER)
            .ok_or_else(|| LocatorError::MissingDelimiter(raw.to_string()))?;

        if scheme.is_empty() {
            return Err(LocatorError::EmptyScheme(raw.to_string()));
        }
        if path.is_empty() {
            return Err(LocatorError::EmptyPath(raw.to_string()));
        }

        let scheme = scheme.parse::<Scheme>()?;
        let segments = path.split('/').map(str::to_string).collect();

        Ok(Self { scheme, segments })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Segments re-joined with `/`
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Segments from `index` onwards re-joined with `/`
    pub fn tail(&self, index: usize) -> Option<String> {
        if index >= self.segments.len() {
            return None;
        }
        Some(self.segments[index..].join("/"))
    }

    /// True for `scheme://*`
    pub fn is_collection(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == COLLECTION_SEGMENT
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_DELIMITER, self.path())
    }
}

impl FromStr for ResourceLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
