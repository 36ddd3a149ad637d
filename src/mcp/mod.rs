pub mod handlers;
pub mod http;
pub mod stdio;

pub use handlers::ToolHandlers;
