//! Tool catalogue
//!
//! One MCP tool per endpoint in [`crate::handlers::ENDPOINTS`], limited to
//! schemes that have an adapter registered.

use super::protocol::{ToolAnnotations, ToolDefinition};
use crate::dispatch::AdapterRegistry;
use crate::handlers::{EndpointDef, Target, ENDPOINTS};

/// Tool definition for one endpoint
pub fn tool_definition(endpoint: &EndpointDef) -> ToolDefinition {
    ToolDefinition {
        name: endpoint.name.to_string(),
        description: endpoint.description.to_string(),
        input_schema: endpoint.input_schema(),
        annotations: ToolAnnotations {
            read_only_hint: endpoint.read_only(),
            open_world_hint: true,
        },
    }
}

fn is_available(endpoint: &EndpointDef, registry: &AdapterRegistry) -> bool {
    match endpoint.target {
        Target::Operation { scheme, .. } => registry.contains(scheme),
        Target::AnyResource => !registry.is_empty(),
    }
}

/// Tools backed by a registered adapter, in declaration order
pub fn list_tools(registry: &AdapterRegistry) -> Vec<ToolDefinition> {
    ENDPOINTS
        .iter()
        .filter(|endpoint| is_available(endpoint, registry))
        .map(tool_definition)
        .collect()
}
