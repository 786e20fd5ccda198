// ==========================================
// 首饰工厂订单流转系统 - 配置层
// ==========================================
// 职责: 流转引擎静态配置（部门流水线、派工策略）
// ==========================================

pub mod workflow_config;

// 重导出核心配置类型
pub use workflow_config::{
    ConfigError, CrossDepartmentPolicy, DepartmentSpec, WorkflowConfig,
};
