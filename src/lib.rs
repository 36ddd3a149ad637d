//! Coordination kernel for a local swarm of AI coding agents: persistent
//! tracking of agents and work items, persona-based dispatch, a typed
//! bounded-backpressure event bus, and MCP tool handlers over stdio and
//! HTTP transports.

pub mod bus;
pub mod cancellation;
pub mod clock;
pub mod composition;
pub mod config;
pub mod domain;
pub mod error;
pub mod event_logger;
pub mod logging;
pub mod mcp;
pub mod notifications;
pub mod services;
pub mod store;
