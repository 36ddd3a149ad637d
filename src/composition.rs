//! Wires the whole kernel together: pool → migrator → store → buses →
//! event logger → notification services → domain services → MCP handlers →
//! transports + heartbeat sweep. Mirrors
//! `examples/odgrim-abathur-swarm/src/main.rs`'s sequential construction
//! order, generalized to the bus/notification layers the teacher's CLI
//! product doesn't have.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bus::agent_bus::AgentBus;
use crate::bus::memory_bus::MemoryBus;
use crate::bus::task_bus::TaskBus;
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::CoordinationResult;
use crate::event_logger::EventLogger;
use crate::mcp::http::HttpConfig;
use crate::mcp::stdio::StdioServer;
use crate::mcp::ToolHandlers;
use crate::notifications::{AgentNotificationService, MemoryNotificationService, WorkItemNotificationService};
use crate::services::{AgentService, MemoryService, TaskService};
use crate::store::migrations::Migrator;
use crate::store::sqlite::SqliteStore;
use crate::store::{create_pool, PoolConfig};

pub struct Kernel {
    pub config: Arc<Config>,
    pub handlers: Arc<ToolHandlers>,
    pub task_bus: TaskBus,
    pub agent_bus: AgentBus,
    pub memory_bus: MemoryBus,
}

impl Kernel {
    pub async fn build(config: Config) -> CoordinationResult<Self> {
        let config = Arc::new(config);
        let pool = create_pool(&config.database_path(), PoolConfig::default())
            .await
            .map_err(|e| crate::error::CoordinationError::internal(format!("failed to open database: {e}")))?;
        Migrator::new(&pool)
            .run()
            .await
            .map_err(|e| crate::error::CoordinationError::internal(format!("migration failed: {e}")))?;
        let store = Arc::new(SqliteStore::new(pool));

        let full_mode = config.event_bus.full_mode.clone().into();
        let task_bus = TaskBus::new(config.event_bus.capacity, full_mode);
        let agent_bus = AgentBus::new(config.event_bus.capacity, full_mode);
        let memory_bus = MemoryBus::new(config.event_bus.capacity, full_mode);

        let event_logger = Arc::new(EventLogger::new(store.clone()));
        event_logger.spawn(&task_bus, &agent_bus, &memory_bus);

        let clock: SharedClock = Arc::new(SystemClock);

        let agent_service = Arc::new(AgentService::new(
            store.clone(),
            AgentNotificationService::new(agent_bus.clone()),
            clock.clone(),
        ));
        let task_service = Arc::new(TaskService::new(
            store.clone(),
            store.clone(),
            WorkItemNotificationService::new(task_bus.clone()),
            clock.clone(),
        ));
        let memory_service = Arc::new(MemoryService::new(
            store.clone(),
            MemoryNotificationService::new(memory_bus.clone()),
            clock,
        ));

        let handlers = Arc::new(ToolHandlers {
            agents: agent_service.clone(),
            tasks: task_service,
            memory: memory_service,
            config: config.clone(),
        });

        spawn_heartbeat_sweep(agent_service, Duration::from_secs(config.heartbeat_timeout_secs));

        Ok(Self {
            config,
            handlers,
            task_bus,
            agent_bus,
            memory_bus,
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let stdio = StdioServer::new(self.handlers.clone());
        let http_config = HttpConfig {
            host: "127.0.0.1".to_string(),
            port: self.config.http.port,
            fallback_scan_limit: self.config.http.fallback_scan_limit,
            enable_cors: self.config.http.enable_cors,
        };

        let stdio_task = tokio::spawn(async move { stdio.run().await });
        let http_task = tokio::spawn(crate::mcp::http::serve(self.handlers.clone(), http_config));

        tokio::select! {
            result = stdio_task => {
                result??;
            }
            result = http_task => {
                result??;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, disposing event buses");
            }
        }

        self.task_bus.dispose();
        self.agent_bus.dispose();
        self.memory_bus.dispose();
        Ok(())
    }
}

/// Background sweep driven every `heartbeat_timeout / 6` (SPEC_FULL.md
/// supplemented feature), flipping stale `Running` agents to `Unhealthy`.
fn spawn_heartbeat_sweep(agent_service: Arc<AgentService>, heartbeat_timeout: Duration) {
    let interval_duration = (heartbeat_timeout / 6).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval_duration);
        loop {
            ticker.tick().await;
            match agent_service.sweep_unhealthy(heartbeat_timeout).await {
                Ok(flipped) if !flipped.is_empty() => {
                    info!(count = flipped.len(), "flipped stale agents to unhealthy");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "heartbeat sweep failed"),
            }
        }
    });
}
