//! HTTP MCP transport, co-hosted with the stdio transport (spec §6).
//! Grounded in `examples/odgrim-abathur-swarm/src/adapters/mcp/tasks_http.rs`'s
//! axum router / config shape.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::ToolHandlers;
use super::stdio::tool_schemas;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Highest port to try if `port` is already bound (spec §6: "fallback
    /// scan 8081-9000").
    pub fallback_scan_limit: u16,
    pub enable_cors: bool,
}

pub fn router(handlers: Arc<ToolHandlers>, config: &HttpConfig) -> Router {
    let mut router = Router::new()
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/tools/:name", post(call_tool))
        .route("/healthz", get(|| async { Json(json!({ "status": "ok" })) }))
        .with_state(handlers)
        .layer(TraceLayer::new_for_http());
    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": tool_schemas() }))
}

async fn call_tool(Path(name): Path<String>, State(handlers): State<Arc<ToolHandlers>>, Json(args): Json<Value>) -> Json<Value> {
    Json(handlers.call(&name, args).await)
}

/// Binds and serves the HTTP transport. Long-poll calls (`get_next_task`,
/// `wait_for_memory_key`) can legitimately hold a connection open for
/// minutes; axum/hyper's default keep-alive has no idle cap that would
/// interrupt them, so no extra timeout wiring is needed here.
///
/// If `config.port` is already taken, scans upward one port at a time
/// through `config.fallback_scan_limit` (spec §6) before giving up.
pub async fn serve(handlers: Arc<ToolHandlers>, config: HttpConfig) -> std::io::Result<()> {
    let app = router(Arc::clone(&handlers), &config);
    let listener = bind_with_fallback(&config.host, config.port, config.fallback_scan_limit).await?;
    info!(addr = %listener.local_addr()?, "starting MCP HTTP transport");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn bind_with_fallback(host: &str, port: u16, fallback_scan_limit: u16) -> std::io::Result<tokio::net::TcpListener> {
    let mut candidate = port;
    loop {
        let addr: SocketAddr = format!("{host}:{candidate}")
            .parse()
            .expect("invalid HTTP bind address");
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && candidate < fallback_scan_limit => {
                info!(port = candidate, "port in use, scanning next port");
                candidate += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
