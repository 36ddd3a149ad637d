//! stdio JSON-RPC 2.0 transport. stdout is reserved for protocol frames;
//! all logs go to stderr via `tracing`. Grounded in
//! `examples/odgrim-abathur-swarm/src/adapters/mcp/stdio_server.rs`'s
//! read-loop and `initialize`/`tools/list`/`tools/call` dispatch.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, warn};

use super::handlers::ToolHandlers;

const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct StdioServer {
    handlers: Arc<ToolHandlers>,
}

impl StdioServer {
    pub fn new(handlers: Arc<ToolHandlers>) -> Self {
        Self { handlers }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Value>(&line) {
                Ok(message) => self.handle_message(message).await,
                Err(err) => {
                    warn!(error = %err, "failed to parse JSON-RPC message");
                    Some(json!({
                        "jsonrpc": "2.0",
                        "id": Value::Null,
                        "error": { "code": -32700, "message": "Parse error" },
                    }))
                }
            };
            if let Some(response) = response {
                let mut serialized = serde_json::to_string(&response).unwrap_or_default();
                serialized.push('\n');
                if let Err(err) = stdout.write_all(serialized.as_bytes()).await {
                    error!(error = %err, "failed to write stdio response");
                    break;
                }
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    async fn handle_message(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str)?;

        match method {
            "initialize" => Some(self.handle_initialize(id)),
            "notifications/initialized" => None,
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, message.get("params").cloned()).await),
            other => Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {other}") },
            })),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "aiswarm-kernel", "version": env!("CARGO_PKG_VERSION") },
            }
        })
    }

    fn handle_tools_list(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": tool_schemas() }
        })
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> Value {
        let params = params.unwrap_or(Value::Null);
        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32602, "message": "Invalid params: missing tool name" },
            });
        };
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let result = self.handlers.call(tool_name, args).await;
        let is_error = result.get("success").and_then(Value::as_bool) == Some(false);
        let text = serde_json::to_string(&result).unwrap_or_default();

        let mut content = json!({ "content": [{ "type": "text", "text": text }] });
        if is_error {
            content["isError"] = json!(true);
        }
        json!({ "jsonrpc": "2.0", "id": id, "result": content })
    }
}

/// Tool schema list surfaced to `tools/list`, covering the table in
/// spec §4.8.
pub(crate) fn tool_schemas() -> Value {
    json!([
        {
            "name": "register_agent",
            "description": "Register a new agent with the swarm and receive its assigned agent id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "persona": { "type": "string", "description": "Routing persona tag, e.g. 'reviewer'." },
                    "agentType": { "type": "string", "description": "Identifier for the LLM CLI this agent runs." },
                    "workingDirectory": { "type": "string", "description": "Filesystem path the agent operates in." },
                    "model": { "type": "string", "description": "Optional model identifier." },
                    "worktree": { "type": "string", "description": "Optional git worktree name." }
                },
                "required": ["persona", "agentType", "workingDirectory"]
            }
        },
        {
            "name": "heartbeat",
            "description": "Record a liveness heartbeat for an agent.",
            "inputSchema": {
                "type": "object",
                "properties": { "agentId": { "type": "string" } },
                "required": ["agentId"]
            }
        },
        {
            "name": "kill_agent",
            "description": "Transition an agent to the Killed state.",
            "inputSchema": {
                "type": "object",
                "properties": { "agentId": { "type": "string" } },
                "required": ["agentId"]
            }
        },
        {
            "name": "list_agents",
            "description": "List known agents, optionally filtered by status or persona.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "status": { "type": "string" },
                    "personaId": { "type": "string" }
                }
            }
        },
        {
            "name": "create_task",
            "description": "Create a new work item, optionally pinned to an agent or a persona.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "description": { "type": "string" },
                    "agentId": { "type": "string" },
                    "personaId": { "type": "string" },
                    "priority": { "type": "string", "enum": ["Low", "Normal", "High", "Critical"] }
                },
                "required": ["description"]
            }
        },
        {
            "name": "get_next_task",
            "description": "Long-poll for the next eligible pending task, claiming it atomically.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agentId": { "type": "string" },
                    "waitMs": { "type": "integer" },
                    "pollMs": { "type": "integer" }
                },
                "required": ["agentId"]
            }
        },
        {
            "name": "report_task_completion",
            "description": "Report a claimed task as completed or failed.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "agentId": { "type": "string" },
                    "result": { "type": "string" },
                    "success": { "type": "boolean" }
                },
                "required": ["taskId", "agentId", "success"]
            }
        },
        {
            "name": "get_task_status",
            "description": "Fetch a single task by id.",
            "inputSchema": {
                "type": "object",
                "properties": { "taskId": { "type": "string" } },
                "required": ["taskId"]
            }
        },
        {
            "name": "get_tasks_by_status",
            "description": "List tasks in a given status.",
            "inputSchema": {
                "type": "object",
                "properties": { "status": { "type": "string" } },
                "required": ["status"]
            }
        },
        {
            "name": "save_memory",
            "description": "Upsert a namespaced keyed memory entry.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "value": { "type": "string" },
                    "namespace": { "type": "string" },
                    "type": { "type": "string" },
                    "metadata": { "type": "object" }
                },
                "required": ["key", "value"]
            }
        },
        {
            "name": "read_memory",
            "description": "Read a namespaced keyed memory entry, updating its access count.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "namespace": { "type": "string" }
                },
                "required": ["key"]
            }
        },
        {
            "name": "list_memory",
            "description": "List memory entries, optionally filtered by namespace.",
            "inputSchema": {
                "type": "object",
                "properties": { "namespace": { "type": "string" } }
            }
        },
        {
            "name": "wait_for_memory_key",
            "description": "Long-poll until a memory key is written or the timeout elapses.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "namespace": { "type": "string" },
                    "timeoutMs": { "type": "integer" }
                },
                "required": ["key", "timeoutMs"]
            }
        }
    ])
}
