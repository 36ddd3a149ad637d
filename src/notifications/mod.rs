pub mod agent_notifications;
pub mod memory_notifications;
pub mod task_notifications;

pub use agent_notifications::AgentNotificationService;
pub use memory_notifications::MemoryNotificationService;
pub use task_notifications::WorkItemNotificationService;
