// Warden Protocol Layer
// Shared wire types for tool calls and confirmations

pub mod call;
pub mod confirmation;

pub use call::{
    CallState, ErrorInfo, ErrorKind, ToolCallRequest, ToolCallStatus, ToolResult,
};
pub use confirmation::{
    ConfirmationMessage, ConfirmationOutcome, ConfirmationRequest, ConfirmationResponse,
};
