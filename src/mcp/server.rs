// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::knowledge::KnowledgeManager;
use crate::mcp::knowledge::KnowledgeProvider;
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpError, PARSE_ERROR};

/// Line-delimited JSON-RPC server exposing the knowledge tools
pub struct McpServer {
    knowledge: KnowledgeProvider,
}

impl McpServer {
    pub fn new(manager: Arc<KnowledgeManager>) -> Self {
        Self {
            knowledge: KnowledgeProvider::new(manager),
        }
    }

    /// Run the MCP server on stdio
    pub async fn run(&self) -> Result<()> {
        self.serve(BufReader::new(stdin()), stdout()).await
    }

    /// Serve requests from `reader` until EOF
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                debug!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!("Received request: {}", trimmed);

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError {
                        code: PARSE_ERROR,
                        message: format!("Parse error: {}", e),
                        data: None,
                    },
                )),
            };

            // Notifications get no reply
            let Some(response) = response else {
                continue;
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        if id.is_none() && request.method.starts_with("notifications/") {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {
                        "tools": {}
                    },
                    "serverInfo": {
                        "name": "unibrain",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),

            "ping" => JsonRpcResponse::success(id, json!({})),

            "tools/list" => {
                let tools = KnowledgeProvider::get_tool_definitions();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }

            "tools/call" => {
                let params = request.params.unwrap_or(json!({}));
                let tool_name = params["name"].as_str().unwrap_or("");
                let arguments = &params["arguments"];

                let result = match tool_name {
                    "ask_question" => self.knowledge.execute_ask_question(arguments).await,
                    "index_knowledge" => self.knowledge.execute_index_knowledge(arguments).await,
                    _ => Err(McpError::method_not_found(
                        format!("Unknown tool: {}", tool_name),
                        "tools/call",
                    )),
                };

                match result {
                    Ok(content) => JsonRpcResponse::success(
                        id,
                        json!({
                            "content": [{
                                "type": "text",
                                "text": content
                            }]
                        }),
                    ),
                    Err(e) => {
                        tracing::warn!(tool = %tool_name, error = %e, "Tool call failed");
                        JsonRpcResponse::failure(id, e.into_jsonrpc())
                    }
                }
            }

            _ => JsonRpcResponse::failure(
                id,
                McpError::method_not_found(
                    format!("Method not found: {}", request.method),
                    &request.method,
                )
                .into_jsonrpc(),
            ),
        };

        Some(response)
    }
}
