//! Dispatch core
//!
//! Maps a parsed [`ResourceLocator`](crate::locator::ResourceLocator) to the
//! adapter owning its scheme and returns that adapter's outcome untouched.
//!
//! # Module Structure
//!
//! - [`registry`] - Immutable scheme to adapter table built at start-up
//! - [`router`] - Lookup plus invocation, no retries, no error rewriting

pub mod registry;
pub mod router;

pub use registry::{AdapterRegistry, RegistryBuilder};
pub use router::Router;

use serde::Serialize;
use serde_json::{Map, Value};

/// Operation parameters as received from the endpoint layer
pub type Params = Map<String, Value>;

/// Cursor returned by paginated operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub next_page_token: String,
}

/// Successful adapter outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl NormalizedResult {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            pagination: None,
        }
    }

    /// Attach a continuation token; `None` marks the last page
    pub fn with_next_page(mut self, token: Option<String>) -> Self {
        self.pagination = token
            .filter(|t| !t.is_empty())
            .map(|next_page_token| Pagination { next_page_token });
        self
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .map(|p| p.next_page_token.as_str())
    }
}
