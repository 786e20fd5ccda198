// ==========================================
// 首饰工厂订单流转系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 可变实体写入一律走乐观锁（revision / 状态 CAS）
// ==========================================

pub mod audit_log_repo;
pub mod error;
pub mod order_repo;
pub mod tracking_repo;
pub mod worker_repo;

// 重导出核心仓储
pub use audit_log_repo::AuditLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use order_repo::OrderRepository;
pub use tracking_repo::TrackingRecordRepository;
pub use worker_repo::WorkerRepository;
