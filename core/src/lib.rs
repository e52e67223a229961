// Warden Core Library

pub mod confirm;
pub mod policy;
pub mod scheduler;
pub mod tools;

pub use confirm::{
    ConfirmError, ConfirmationBus, ConfirmationCoordinator, ConfirmationReply,
    PendingConfirmation, Subscription, Topic,
};
pub use policy::{Decision, PolicyEngine, PolicyError};
pub use scheduler::{OnAllComplete, ToolCallScheduler};
pub use tools::registry::{ToolHandler, ToolRegistry};
