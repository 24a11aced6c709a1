pub mod approval;
pub mod continuation;
pub mod conversation;
pub mod message_filter;
pub mod session;
pub mod stream;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalHandler, ApprovalRequest, AutoApprove, AutoDecline,
};
pub use continuation::{ContinuationConfig, ContinuationDecision, ContinuationDetector};
pub use conversation::{
    ConversationLoop, DEFAULT_MAX_TOOL_CONCURRENCY, ToolResult, TurnConfig, TurnOutcome,
    TurnStatus,
};
pub use message_filter::filter_outbound;
pub use session::{FixedModeSelector, ModeSelector, PlanInfo, Session};
pub use stream::{
    ChannelEmitter, ConversationEvent, NullEmitter, StreamEmitter, ToolCallAccumulator,
};
