//! End-to-end scenarios from spec §8, exercised through `ToolHandlers`
//! (the same entry point both MCP transports dispatch through) against an
//! in-memory SQLite store.

use std::sync::Arc;
use std::time::Duration;

use aiswarm_kernel::bus::agent_bus::AgentBus;
use aiswarm_kernel::bus::memory_bus::MemoryBus;
use aiswarm_kernel::bus::task_bus::TaskBus;
use aiswarm_kernel::bus::FullMode;
use aiswarm_kernel::clock::SystemClock;
use aiswarm_kernel::config::Config;
use aiswarm_kernel::mcp::handlers::ToolHandlers;
use aiswarm_kernel::notifications::{AgentNotificationService, MemoryNotificationService, WorkItemNotificationService};
use aiswarm_kernel::services::{AgentService, MemoryService, TaskService};
use aiswarm_kernel::store::migrations::Migrator;
use aiswarm_kernel::store::sqlite::SqliteStore;
use aiswarm_kernel::store::create_test_pool;
use serde_json::json;

async fn handlers() -> Arc<ToolHandlers> {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(&pool).run().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));

    let task_bus = TaskBus::new(64, FullMode::Wait);
    let agent_bus = AgentBus::new(64, FullMode::Wait);
    let memory_bus = MemoryBus::new(64, FullMode::Wait);

    let agents = Arc::new(AgentService::new(
        store.clone(),
        AgentNotificationService::new(agent_bus),
        Arc::new(SystemClock),
    ));
    let tasks = Arc::new(TaskService::new(
        store.clone(),
        store.clone(),
        WorkItemNotificationService::new(task_bus),
        Arc::new(SystemClock),
    ));
    let memory = Arc::new(MemoryService::new(
        store,
        MemoryNotificationService::new(memory_bus),
        Arc::new(SystemClock),
    ));

    Arc::new(ToolHandlers {
        agents,
        tasks,
        memory,
        config: Arc::new(Config::default()),
    })
}

#[tokio::test]
async fn scenario_1_happy_dispatch() {
    let handlers = handlers().await;
    let register = handlers
        .call(
            "register_agent",
            json!({ "persona": "reviewer", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    assert_eq!(register["success"], true);
    let agent_id = register["agentId"].as_str().unwrap().to_string();

    let created = handlers
        .call("create_task", json!({ "description": "review PR #1", "personaId": "reviewer" }))
        .await;
    assert_eq!(created["success"], true);

    let claimed = handlers
        .call("get_next_task", json!({ "agentId": agent_id, "waitMs": 500 }))
        .await;
    assert_eq!(claimed["success"], true);
    assert!(!claimed["taskId"].as_str().unwrap().starts_with("system:requery:"));
}

#[tokio::test]
async fn scenario_2_persona_case_insensitive_routing() {
    let handlers = handlers().await;
    let register = handlers
        .call(
            "register_agent",
            json!({ "persona": "Reviewer", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    let agent_id = register["agentId"].as_str().unwrap().to_string();

    handlers
        .call("create_task", json!({ "description": "x", "personaId": "reviewer" }))
        .await;

    let claimed = handlers
        .call("get_next_task", json!({ "agentId": agent_id, "waitMs": 500 }))
        .await;
    assert_eq!(claimed["success"], true);
    assert!(!claimed["taskId"].as_str().unwrap().starts_with("system:requery:"));
}

#[tokio::test]
async fn scenario_3_long_poll_wakeup() {
    let handlers = handlers().await;
    let register = handlers
        .call(
            "register_agent",
            json!({ "persona": "planner", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    let agent_id = register["agentId"].as_str().unwrap().to_string();

    let waiting_handlers = handlers.clone();
    let waiting_agent = agent_id.clone();
    let wait_handle = tokio::spawn(async move {
        waiting_handlers
            .call("get_next_task", json!({ "agentId": waiting_agent, "waitMs": 500, "pollMs": 50 }))
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    handlers
        .call("create_task", json!({ "description": "y", "personaId": "planner" }))
        .await;

    let result = wait_handle.await.unwrap();
    assert_eq!(result["success"], true);
    assert!(!result["taskId"].as_str().unwrap().starts_with("system:requery:"));
}

#[tokio::test]
async fn scenario_4_long_poll_timeout_returns_requery_id() {
    let handlers = handlers().await;
    let register = handlers
        .call(
            "register_agent",
            json!({ "persona": "idle", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    let agent_id = register["agentId"].as_str().unwrap().to_string();

    let result = handlers
        .call("get_next_task", json!({ "agentId": agent_id, "waitMs": 150, "pollMs": 30 }))
        .await;
    assert_eq!(result["success"], true);
    assert!(result["taskId"].as_str().unwrap().starts_with("system:requery:"));
    assert!(result["message"].as_str().unwrap().to_lowercase().contains("again"));
}

#[tokio::test]
async fn scenario_5_claim_race_exactly_one_winner() {
    let handlers = handlers().await;
    let a4 = handlers
        .call(
            "register_agent",
            json!({ "persona": "shared", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    let a5 = handlers
        .call(
            "register_agent",
            json!({ "persona": "shared", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    handlers
        .call("create_task", json!({ "description": "only one", "personaId": "shared" }))
        .await;

    let h1 = handlers.clone();
    let id1 = a4["agentId"].as_str().unwrap().to_string();
    let h2 = handlers.clone();
    let id2 = a5["agentId"].as_str().unwrap().to_string();

    let (r1, r2) = tokio::join!(
        h1.call("get_next_task", json!({ "agentId": id1, "waitMs": 200, "pollMs": 20 })),
        h2.call("get_next_task", json!({ "agentId": id2, "waitMs": 200, "pollMs": 20 })),
    );

    let r1_claimed = !r1["taskId"].as_str().unwrap().starts_with("system:requery:");
    let r2_claimed = !r2["taskId"].as_str().unwrap().starts_with("system:requery:");
    assert_ne!(r1_claimed, r2_claimed, "exactly one caller should claim the task");
}

#[tokio::test]
async fn scenario_7_memory_wait_wakes_on_concurrent_save() {
    let handlers = handlers().await;
    let waiting = handlers.clone();
    let wait_handle = tokio::spawn(async move {
        waiting
            .call("wait_for_memory_key", json!({ "key": "k", "namespace": "ns", "timeoutMs": 500 }))
            .await
    });

    tokio::time::sleep(Duration::from_millis(80)).await;
    handlers
        .call("save_memory", json!({ "key": "k", "value": "v", "namespace": "ns" }))
        .await;

    let result = wait_handle.await.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["entry"]["value"], "v");
}

#[tokio::test]
async fn scenario_8_terminal_mutation_is_rejected() {
    let handlers = handlers().await;
    let register = handlers
        .call(
            "register_agent",
            json!({ "persona": "closer", "agentType": "claude-cli", "workingDirectory": "/tmp" }),
        )
        .await;
    let agent_id = register["agentId"].as_str().unwrap().to_string();
    let created = handlers
        .call("create_task", json!({ "description": "finish", "agentId": agent_id }))
        .await;
    let task_id = created["taskId"].as_str().unwrap().to_string();

    let claimed = handlers
        .call("get_next_task", json!({ "agentId": agent_id, "waitMs": 200 }))
        .await;
    assert_eq!(claimed["taskId"], task_id);

    let first = handlers
        .call("report_task_completion", json!({ "taskId": task_id, "agentId": agent_id, "success": true }))
        .await;
    assert_eq!(first["success"], true);

    let second = handlers
        .call("report_task_completion", json!({ "taskId": task_id, "agentId": agent_id, "success": true }))
        .await;
    assert_eq!(second["success"], false);
}
