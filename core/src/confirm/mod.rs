// Confirmation plumbing: pub/sub bus plus the correlated-response
// coordinator that sits between the scheduler and approval front ends.

pub mod bus;
pub mod coordinator;

pub use bus::{ConfirmationBus, Subscription, Topic};
pub use coordinator::{
    ConfirmError, ConfirmationCoordinator, ConfirmationReply, PendingConfirmation,
};
