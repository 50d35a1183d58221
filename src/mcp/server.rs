//! MCP server
//!
//! Newline-delimited JSON-RPC over stdio. Every request is handled on its own
//! tokio task; responses funnel through one channel into a single writer so
//! lines never interleave.

use super::protocol::*;
use super::{prompts, resources, tools};
use crate::dispatch::Params;
use crate::handlers::{EndpointResponse, Endpoints};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

pub struct McpServer {
    endpoints: Endpoints,
}

impl McpServer {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Serve on the process stdin/stdout until EOF or `shutdown`
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        tracing::info!("Starting MCP server with stdio transport");
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        self.serve(stdin, &mut stdout).await
    }

    /// Serve requests read from `reader`, writing responses to `writer`
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let read_loop = async move {
            let mut lines = reader.lines();
            while let Some(line) = lines.next_line().await.context("failed to read request")? {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }

                let request: JsonRpcRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(err) => {
                        tracing::warn!("Unparseable request: {}", err);
                        let response = JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", err));
                        send(&tx, &response);
                        continue;
                    },
                };

                if request.method == "shutdown" {
                    tracing::info!("Shutdown requested");
                    send(&tx, &JsonRpcResponse::success(request.id, json!({})));
                    break;
                }

                let server = Arc::clone(&self);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = server.handle_request(request).await {
                        send(&tx, &response);
                    }
                });
            }
            Ok::<(), anyhow::Error>(())
        };

        let write_loop = async {
            while let Some(line) = rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (read_result, write_result) = tokio::join!(read_loop, write_loop);
        read_result?;
        write_result.context("failed to write response")?;
        tracing::info!("MCP server stopped");
        Ok(())
    }

    /// Handle one message; notifications produce no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        tracing::debug!("MCP request: {}", method);

        if jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version '{}'", jsonrpc),
            ));
        }

        let response = match method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" | "notifications/initialized" => {
                if is_notification {
                    return None;
                }
                JsonRpcResponse::success(id, json!({}))
            },
            "ping" | "shutdown" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, params).await,
            "resources/list" => {
                let registry = self.endpoints.router().registry();
                JsonRpcResponse::success(id, json!({"resources": resources::list_resources(registry)}))
            },
            "resources/templates/list" => {
                let registry = self.endpoints.router().registry();
                JsonRpcResponse::success(
                    id,
                    json!({"resourceTemplates": resources::list_templates(registry)}),
                )
            },
            "resources/read" => self.handle_read_resource(id, params).await,
            "prompts/list" => JsonRpcResponse::success(id, json!({"prompts": prompts::list_prompts()})),
            "prompts/get" => self.handle_get_prompt(id, params),
            method if is_notification => {
                tracing::debug!("Ignoring notification {}", method);
                return None;
            },
            method => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method)),
        };

        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "cloudmux",
                "version": crate::VERSION,
            },
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {"subscribe": false, "listChanged": false},
                "prompts": {"listChanged": false},
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = tools::list_tools(self.endpoints.router().registry());
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
        };

        let available = tools::list_tools(self.endpoints.router().registry())
            .iter()
            .any(|tool| tool.name == params.name);
        if !available {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Tool not found: {}", params.name));
        }

        let response = self.endpoints.call(&params.name, &params.arguments).await;
        JsonRpcResponse::success(id, tool_result(response))
    }

    async fn handle_read_resource(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
        };

        match self.endpoints.read(&params.uri, None, &Params::new()).await {
            Ok(result) => {
                let body = EndpointResponse::success(result).body;
                JsonRpcResponse::success(id, resources::contents(&params.uri, &body))
            },
            Err(err) => JsonRpcResponse::gateway_error(id, &err),
        }
    }

    fn handle_get_prompt(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: GetPromptParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
        };

        match prompts::get_prompt(&params.name, &params.arguments) {
            Ok(prompt) => JsonRpcResponse::success(id, prompt),
            Err(err) => JsonRpcResponse::gateway_error(id, &err),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    let params = params.ok_or_else(|| "Missing params".to_string())?;
    serde_json::from_value(params).map_err(|e| format!("Invalid params: {}", e))
}

/// Endpoint envelope as an MCP tool result
fn tool_result(response: EndpointResponse) -> Value {
    let text = serde_json::to_string_pretty(&response.body).unwrap_or_else(|_| response.body.to_string());
    let result = CallToolResponse {
        content: vec![ToolContent::Text { text }],
        is_error: !response.is_success(),
        structured_content: Some(response.body),
    };
    serde_json::to_value(result).unwrap_or_else(|_| json!({"content": [], "isError": true}))
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                tracing::warn!("Response dropped, writer closed");
            }
        },
        Err(err) => tracing::error!("Failed to serialize response: {}", err),
    }
}
