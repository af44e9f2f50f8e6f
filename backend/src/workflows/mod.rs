// Workflow Automation Engine
//
// Event-driven automation for the Flowdesk workspace: business events are
// matched against configured workflows, whose actions run in order.

pub mod actions;
pub mod engine;
pub mod executor;
pub mod matcher;
pub mod template;
pub mod triggers;

pub use actions::{
    Action, ActionOutcome, ActionStep, CreateTaskConfig, MoveCardConfig, SendChatMessageConfig,
    SendEmailConfig, UnrecognizedAction,
};
pub use engine::{
    ExecutionResult, ExecutionStatus, NewWorkflow, WorkflowDefinition, WorkflowEngine,
    WorkflowExecution,
};
pub use executor::{ActionError, ActionExecutor, ExecutionContext};
pub use matcher::match_workflows;
pub use template::interpolate;
pub use triggers::{
    BookingLinkFilter, ClientCreatedFilter, ClientFilter, EventData, EventSink, EventSource,
    FunnelStepFilter, InvoicePaidFilter, TaskCompletedFilter, Trigger, TriggerEvent, TriggerType,
};
