pub mod error;
pub mod event;
pub mod task;
pub mod types;

pub use error::AgoraError;
pub use event::{EventBus, EventKind, ProtocolEvent};
pub use task::{TaskMetrics, TaskPriority, TaskRecord, TaskRequest, TaskStatus};
pub use types::{
    AgentCard, AgentCardPatch, AgentEndpoint, Capability, CapabilityConstraints,
    SerializationStyle, TransportKind,
};
