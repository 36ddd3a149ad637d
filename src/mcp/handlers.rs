//! Thin MCP tool adapters: validate, call services, shape result objects —
//! spec §4.8. Shared by both the stdio and HTTP transports, grounded in
//! `examples/odgrim-abathur-swarm/src/adapters/mcp/stdio_server.rs`'s
//! `tool_*` dispatch methods.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::Config;
use crate::domain::agent::AgentFilter;
use crate::domain::{AgentStatus, TaskPriority, TaskStatus};
use crate::error::{CoordinationError, CoordinationResult};
use crate::services::task_service::{GetNextConfig, GetNextOutcome};
use crate::services::{AgentService, MemoryService, TaskService};

pub struct ToolHandlers {
    pub agents: Arc<AgentService>,
    pub tasks: Arc<TaskService>,
    pub memory: Arc<MemoryService>,
    pub config: Arc<Config>,
}

fn require_str(args: &Value, field: &str) -> CoordinationResult<String> {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoordinationError::invalid_input(format!("missing or blank required field: {field}")))
}

fn optional_str(args: &Value, field: &str) -> Option<String> {
    args.get(field).and_then(Value::as_str).map(str::to_string)
}

fn require_uuid(args: &Value, field: &str) -> CoordinationResult<Uuid> {
    let raw = require_str(args, field)?;
    Uuid::parse_str(&raw).map_err(|_| CoordinationError::invalid_input(format!("{field} is not a valid id: {raw}")))
}

fn require_bool(args: &Value, field: &str) -> CoordinationResult<bool> {
    args.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| CoordinationError::invalid_input(format!("missing or non-boolean required field: {field}")))
}

fn optional_uuid(args: &Value, field: &str) -> CoordinationResult<Option<Uuid>> {
    match args.get(field).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| CoordinationError::invalid_input(format!("{field} is not a valid id: {raw}"))),
    }
}

fn parse_priority(args: &Value) -> CoordinationResult<TaskPriority> {
    match args.get("priority").and_then(Value::as_str) {
        None => Ok(TaskPriority::Normal),
        Some("Low") | Some("low") => Ok(TaskPriority::Low),
        Some("Normal") | Some("normal") => Ok(TaskPriority::Normal),
        Some("High") | Some("high") => Ok(TaskPriority::High),
        Some("Critical") | Some("critical") => Ok(TaskPriority::Critical),
        Some(other) => Err(CoordinationError::invalid_input(format!("unknown priority: {other}"))),
    }
}

fn parse_status(raw: &str) -> CoordinationResult<TaskStatus> {
    match raw {
        "Pending" | "pending" => Ok(TaskStatus::Pending),
        "InProgress" | "inprogress" | "in_progress" => Ok(TaskStatus::InProgress),
        "Completed" | "completed" => Ok(TaskStatus::Completed),
        "Failed" | "failed" => Ok(TaskStatus::Failed),
        other => Err(CoordinationError::invalid_input(format!("unknown task status: {other}"))),
    }
}

fn parse_agent_status(raw: &str) -> CoordinationResult<AgentStatus> {
    match raw {
        "Starting" | "starting" => Ok(AgentStatus::Starting),
        "Running" | "running" => Ok(AgentStatus::Running),
        "Stopping" | "stopping" => Ok(AgentStatus::Stopping),
        "Stopped" | "stopped" => Ok(AgentStatus::Stopped),
        "Failed" | "failed" => Ok(AgentStatus::Failed),
        "Killed" | "killed" => Ok(AgentStatus::Killed),
        "Unhealthy" | "unhealthy" => Ok(AgentStatus::Unhealthy),
        other => Err(CoordinationError::invalid_input(format!("unknown agent status: {other}"))),
    }
}

fn ok_result(mut fields: Value) -> Value {
    fields["success"] = json!(true);
    fields
}

fn err_result(err: &CoordinationError) -> Value {
    json!({ "success": false, "errorMessage": err.message() })
}

impl ToolHandlers {
    /// Dispatches a named tool invocation to the matching handler and
    /// always returns a JSON object — never an `Err`, per spec §4.8 rule 4
    /// ("translate exceptions to Failure(message), never propagate to the
    /// transport").
    pub async fn call(&self, tool: &str, args: Value) -> Value {
        let result = match tool {
            "register_agent" => self.register_agent(args).await,
            "heartbeat" => self.heartbeat(args).await,
            "kill_agent" => self.kill_agent(args).await,
            "list_agents" => self.list_agents(args).await,
            "create_task" => self.create_task(args).await,
            "get_next_task" => self.get_next_task(args).await,
            "report_task_completion" => self.report_task_completion(args).await,
            "get_task_status" => self.get_task_status(args).await,
            "get_tasks_by_status" => self.get_tasks_by_status(args).await,
            "save_memory" => self.save_memory(args).await,
            "read_memory" => self.read_memory(args).await,
            "list_memory" => self.list_memory(args).await,
            "wait_for_memory_key" => self.wait_for_memory_key(args).await,
            other => Err(CoordinationError::invalid_input(format!("unknown tool: {other}"))),
        };
        match result {
            Ok(value) => ok_result(value),
            Err(err) => err_result(&err),
        }
    }

    async fn register_agent(&self, args: Value) -> CoordinationResult<Value> {
        let persona = require_str(&args, "persona")?;
        let agent_type = require_str(&args, "agentType")?;
        let working_directory = require_str(&args, "workingDirectory")?;
        let model = optional_str(&args, "model");
        let worktree = optional_str(&args, "worktree");
        let agent_id = self.agents.register(persona, agent_type, working_directory, model, worktree).await?;
        Ok(json!({ "agentId": agent_id }))
    }

    async fn heartbeat(&self, args: Value) -> CoordinationResult<Value> {
        let agent_id = require_uuid(&args, "agentId")?;
        let found = self.agents.heartbeat(agent_id).await?;
        if !found {
            return Err(CoordinationError::not_found(format!("agent not found: {agent_id}")));
        }
        Ok(json!({}))
    }

    async fn kill_agent(&self, args: Value) -> CoordinationResult<Value> {
        let agent_id = require_uuid(&args, "agentId")?;
        self.agents.kill(agent_id).await?;
        Ok(json!({}))
    }

    async fn list_agents(&self, args: Value) -> CoordinationResult<Value> {
        let filter = AgentFilter {
            status: args
                .get("status")
                .and_then(Value::as_str)
                .map(parse_agent_status)
                .transpose()?,
            persona_id: optional_str(&args, "personaId"),
        };
        let agents = self.agents.list(&filter).await?;
        Ok(json!({ "agents": agents }))
    }

    async fn create_task(&self, args: Value) -> CoordinationResult<Value> {
        let description = require_str(&args, "description")?;
        let agent_id = optional_uuid(&args, "agentId")?;
        let persona_id = optional_str(&args, "personaId");
        let priority = parse_priority(&args)?;
        let task_id = self.tasks.create(agent_id, persona_id, description, priority).await?;
        Ok(json!({ "taskId": task_id }))
    }

    async fn get_next_task(&self, args: Value) -> CoordinationResult<Value> {
        let agent_id = require_uuid(&args, "agentId")?;
        let wait_ms = args.get("waitMs").and_then(Value::as_u64).unwrap_or(self.config.default_task_wait_secs * 1000);
        let poll_ms = args
            .get("pollMs")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_polling_interval_ms);
        let outcome = self
            .tasks
            .get_next(
                agent_id,
                GetNextConfig {
                    poll_interval: Duration::from_millis(poll_ms),
                    wait_timeout: Duration::from_millis(wait_ms),
                },
                CancellationToken::new(),
            )
            .await?;
        Ok(match outcome {
            GetNextOutcome::Claimed(task) => json!({
                "taskId": task.id,
                "personaId": task.persona_id,
                "description": task.description,
                "message": "Task claimed. Call report_task_completion when finished.",
            }),
            GetNextOutcome::NoTasksAvailable { requery_id, message } => json!({
                "taskId": requery_id,
                "description": "No tasks available.",
                "message": message,
            }),
        })
    }

    async fn report_task_completion(&self, args: Value) -> CoordinationResult<Value> {
        let task_id = require_uuid(&args, "taskId")?;
        let agent_id = require_uuid(&args, "agentId")?;
        let result = optional_str(&args, "result");
        let success = require_bool(&args, "success")?;
        self.tasks.report_completion(task_id, agent_id, result, success).await?;
        Ok(json!({}))
    }

    async fn get_task_status(&self, args: Value) -> CoordinationResult<Value> {
        let task_id = require_uuid(&args, "taskId")?;
        let task = self
            .tasks
            .get_status(task_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found(format!("task not found: {task_id}")))?;
        Ok(json!({ "task": task }))
    }

    async fn get_tasks_by_status(&self, args: Value) -> CoordinationResult<Value> {
        let status = parse_status(&require_str(&args, "status")?)?;
        let tasks = self.tasks.get_by_status(status).await?;
        Ok(json!({ "tasks": tasks }))
    }

    async fn save_memory(&self, args: Value) -> CoordinationResult<Value> {
        let key = require_str(&args, "key")?;
        let value = require_str(&args, "value")?;
        let namespace = optional_str(&args, "namespace");
        let value_type = optional_str(&args, "type");
        let metadata = args.get("metadata").cloned();
        let entry = self.memory.save(key, value, namespace, value_type, metadata).await?;
        Ok(json!({ "entry": entry }))
    }

    async fn read_memory(&self, args: Value) -> CoordinationResult<Value> {
        let key = require_str(&args, "key")?;
        let namespace = optional_str(&args, "namespace");
        match self.memory.read(&key, namespace).await? {
            Some(entry) => Ok(json!({ "found": true, "entry": entry })),
            None => Ok(json!({ "found": false })),
        }
    }

    async fn list_memory(&self, args: Value) -> CoordinationResult<Value> {
        let namespace = optional_str(&args, "namespace");
        let entries = self.memory.list(namespace).await?;
        Ok(json!({ "entries": entries }))
    }

    async fn wait_for_memory_key(&self, args: Value) -> CoordinationResult<Value> {
        let key = require_str(&args, "key")?;
        let namespace = optional_str(&args, "namespace");
        let timeout_ms = args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_task_wait_secs * 1000);
        let entry = self
            .memory
            .wait_for_key(&key, namespace, Duration::from_millis(timeout_ms), CancellationToken::new())
            .await?;
        Ok(json!({ "entry": entry }))
    }
}
