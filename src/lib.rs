// ==========================================
// 首饰工厂订单流转系统 - 核心库
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 系统宪法
// 系统定位: 订单在厂流转与派工的单一事实源
// 说明: 本库只暴露编程接口,HTTP/界面/推送通道均在库外实现
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 状态机与派工
pub mod engine;

// 配置层 - 流水线与派工策略
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/schema）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{OrderStatus, Priority, TrackingStatus, WorkerAvailability};

// 领域实体
pub use domain::{AuditEntry, Department, DepartmentCatalog, Order, TrackingRecord, Worker};

// 引擎
pub use engine::{
    retry_once_on_conflict, AssignmentOverride, AssignmentQueue, KeyedLockRegistry,
    WorkerDirectory, WorkflowEngine, WorkflowError, WorkflowEvent, WorkflowEventPublisher,
    WorkflowEventType, WorkflowResult,
};

// 配置
pub use config::{CrossDepartmentPolicy, WorkflowConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "首饰工厂订单流转系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
