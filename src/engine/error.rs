// ==========================================
// 首饰工厂订单流转系统 - 引擎层错误类型
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 错误分级
// 红线: 错误一律作为值返回,不用于正常控制流
// 红线: 不变量违反绝不静默绕过
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 流转引擎错误类型
///
/// 分级:
/// - 非法迁移/业务冲突: 不重试,原样上抛给调用方
/// - 并发冲突: 瞬态,调用方退避重试一次后上抛
/// - 不变量违反: 表明上游存在 bug,最高级别日志后中止
#[derive(Error, Debug)]
pub enum WorkflowError {
    // ===== 状态机错误（不重试）=====
    #[error("非法状态迁移: tracking_id={tracking_id}, 当前状态={current}, 操作={operation}")]
    IllegalTransition {
        tracking_id: String,
        current: String,
        operation: String,
    },

    // ===== 业务规则错误（不重试）=====
    #[error("金重非法: tracking_id={tracking_id}, 进厂金重={weight_in}, 出厂金重={weight_out}（出不得大于进）")]
    InvalidWeight {
        tracking_id: String,
        weight_in: f64,
        weight_out: f64,
    },

    #[error("工人不可派工: worker_id={worker_id}, 原因={reason}")]
    WorkerUnavailable { worker_id: String, reason: String },

    #[error("重复派工: tracking_id={tracking_id} 已派给 worker_id={assigned_worker_id}")]
    AlreadyAssigned {
        tracking_id: String,
        assigned_worker_id: String,
    },

    // ===== 并发冲突（瞬态，重试一次）=====
    #[error("并发修改冲突: {entity} id={id}")]
    ConcurrentModification { entity: String, id: String },

    // ===== 不变量违反（上游 bug）=====
    #[error("不变量违反: {0}")]
    InvariantViolation(String),

    // ===== 通用错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("仓储错误: {0}")]
    Repository(RepositoryError),
}

impl WorkflowError {
    /// 是否为瞬态错误（调用方可退避重试一次）
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkflowError::ConcurrentModification { .. })
    }
}

// 乐观锁落空统一折算为并发冲突,其余仓储错误原样包裹
impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure { entity, id, .. } => {
                WorkflowError::ConcurrentModification { entity, id }
            }
            RepositoryError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            other => WorkflowError::Repository(other),
        }
    }
}

/// Result 类型别名
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimistic_lock_maps_to_concurrent_modification() {
        let err: WorkflowError = RepositoryError::OptimisticLockFailure {
            entity: "TrackingRecord".to_string(),
            id: "T1".to_string(),
            expected_revision: 3,
        }
        .into();
        assert!(err.is_transient());
        assert!(matches!(err, WorkflowError::ConcurrentModification { .. }));
    }

    #[test]
    fn test_illegal_transition_not_transient() {
        let err = WorkflowError::IllegalTransition {
            tracking_id: "T1".to_string(),
            current: "NOT_STARTED".to_string(),
            operation: "CompleteWork".to_string(),
        };
        assert!(!err.is_transient());
    }
}
