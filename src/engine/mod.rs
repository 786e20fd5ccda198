// ==========================================
// 首饰工厂订单流转系统 - 引擎层
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 流转引擎体系
// ==========================================
// 职责: 状态机、派工队列、工人名录、事件发布
// 红线: 状态迁移只走引擎,所有拒绝必须带原因
// ==========================================

pub mod directory;
pub mod error;
pub mod events;
pub mod locks;
pub mod queue;
pub mod workflow;

// 重导出核心引擎
pub use directory::WorkerDirectory;
pub use error::{WorkflowError, WorkflowResult};
pub use events::{
    AuditLogSink, ChannelEventPublisher, NoOpEventPublisher, OptionalEventPublisher,
    WorkflowEvent, WorkflowEventPublisher, WorkflowEventType,
};
pub use locks::KeyedLockRegistry;
pub use queue::AssignmentQueue;
pub use workflow::{retry_once_on_conflict, AssignmentOverride, WorkflowEngine};
