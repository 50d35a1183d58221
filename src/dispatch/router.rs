//! Dispatch Router
//!
//! Pure routing indirection: registry lookup, adapter invocation, and the
//! adapter's normalized outcome handed back as-is.

use super::{AdapterRegistry, NormalizedResult, Params};
use crate::error::GatewayError;
use crate::locator::ResourceLocator;
use std::sync::Arc;
use tracing::Instrument;

/// Routes locators to the adapter registered for their scheme
#[derive(Clone)]
pub struct Router {
    registry: Arc<AdapterRegistry>,
}

impl Router {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Resolve `locator` through its adapter
    pub async fn dispatch(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        let scheme = locator.scheme();
        let Some(adapter) = self.registry.get(scheme) else {
            tracing::warn!("dispatch: no adapter for scheme {}", scheme);
            return Err(GatewayError::unsupported_scheme(scheme.as_str()));
        };

        let span = tracing::info_span!(
            "dispatch",
            request_id = %uuid::Uuid::new_v4(),
            scheme = %scheme,
            operation = operation,
        );

        async {
            tracing::debug!("dispatch: {}", locator);
            let outcome = adapter.resolve(locator, operation, params).await;
            match &outcome {
                Ok(result) => tracing::info!(
                    has_next_page = result.pagination.is_some(),
                    "dispatch succeeded"
                ),
                Err(err) => tracing::info!(
                    kind = %err.kind,
                    status = err.status(),
                    "dispatch failed: {}",
                    err.message
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Parse `raw` then dispatch; unknown schemes never reach an adapter
    pub async fn dispatch_raw(
        &self,
        raw: &str,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        let locator = ResourceLocator::parse(raw)?;
        self.dispatch(&locator, operation, params).await
    }

    /// Operation an adapter performs for a bare resource read of `locator`
    pub fn default_operation(&self, locator: &ResourceLocator) -> Result<&'static str, GatewayError> {
        let adapter = self
            .registry
            .get(locator.scheme())
            .ok_or_else(|| GatewayError::unsupported_scheme(locator.scheme().as_str()))?;

        adapter.default_operation(locator).ok_or_else(|| {
            GatewayError::invalid_parameters(format!(
                "'{}' does not address a readable {} resource",
                locator,
                locator.scheme()
            ))
        })
    }
}
