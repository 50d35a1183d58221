//! MCP transport shell
//!
//! Exposes the endpoint surface as MCP tools, resources and prompts over a
//! newline-delimited JSON-RPC stdio transport.
//!
//! # Module Structure
//!
//! - [`protocol`] - JSON-RPC and MCP message types
//! - [`server`] - Request loop and method handlers
//! - [`tools`] - Tool catalogue generated from the endpoint table
//! - [`resources`] - Collection resources and URI templates
//! - [`prompts`] - Canned analysis prompts

pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;

pub use server::McpServer;
