// ==========================================
// 首饰工厂订单流转系统 - 工人名录
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 工人名录接口
// 说明: 读路径供派工队列/引擎使用;写路径只允许引擎调用
// ==========================================

use crate::domain::types::WorkerAvailability;
use crate::domain::worker::Worker;
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::repository::worker_repo::WorkerRepository;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// WorkerDirectory - 工人名录
// ==========================================
pub struct WorkerDirectory {
    worker_repo: Arc<WorkerRepository>,
}

impl WorkerDirectory {
    /// 创建工人名录
    pub fn new(worker_repo: Arc<WorkerRepository>) -> Self {
        Self { worker_repo }
    }

    /// 按 id 取工人（不存在视为 NotFound）
    pub fn get(&self, worker_id: &str) -> WorkflowResult<Worker> {
        self.worker_repo
            .find_by_id(worker_id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "Worker".to_string(),
                id: worker_id.to_string(),
            })
    }

    /// 查部门下一个可派工人（最久未派工优先，摊平负载）
    pub fn find_available(&self, department_id: &str) -> WorkflowResult<Option<Worker>> {
        let mut workers = self.worker_repo.find_available_by_department(department_id)?;
        if workers.is_empty() {
            debug!("部门 {} 当前无空闲工人", department_id);
            return Ok(None);
        }
        Ok(Some(workers.remove(0)))
    }

    /// 标记工人忙碌并刷新最近派工时间
    pub fn mark_busy(&self, worker_id: &str) -> WorkflowResult<()> {
        self.worker_repo
            .update_availability(worker_id, WorkerAvailability::Busy, true)?;
        Ok(())
    }

    /// 标记工人空闲
    pub fn mark_available(&self, worker_id: &str) -> WorkflowResult<()> {
        self.worker_repo
            .update_availability(worker_id, WorkerAvailability::Available, false)?;
        Ok(())
    }
}
