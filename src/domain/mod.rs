// ==========================================
// 首饰工厂订单流转系统 - 领域模型层
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 数据与状态体系
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit;
pub mod department;
pub mod order;
pub mod tracking;
pub mod types;
pub mod worker;

// 重导出核心类型
pub use audit::AuditEntry;
pub use department::{Department, DepartmentCatalog};
pub use order::Order;
pub use tracking::TrackingRecord;
pub use types::{OrderStatus, Priority, TrackingStatus, WorkerAvailability};
pub use worker::Worker;
