// ==========================================
// 首饰工厂订单流转系统 - 派工队列
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 部门派工队列
// 红线: 每部门 queue_position 任意时刻都是 1..N 连续无重复
// 红线: Reindex 必须与移出队列的状态变更同事务执行
// ==========================================
// 队列序: 订单优先级降序, 入队时间升序
// 入队先落 count+1 的临时位置,同事务内 Reindex 校正,
// 使加急单插队与连续性两条规则同时成立
// ==========================================

use crate::domain::tracking::TrackingRecord;
use crate::domain::types::TrackingStatus;
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::engine::locks::{lock_keyed, KeyedLockRegistry};
use crate::repository::tracking_repo::TrackingRecordRepository;
use chrono::Utc;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::debug;

/// 部门队列锁键
pub fn department_lock_key(department_id: &str) -> String {
    format!("dept:{department_id}")
}

// ==========================================
// AssignmentQueue - 部门派工队列
// ==========================================
pub struct AssignmentQueue {
    tracking_repo: Arc<TrackingRecordRepository>,
    locks: Arc<KeyedLockRegistry>,
}

impl AssignmentQueue {
    /// 创建派工队列
    pub fn new(tracking_repo: Arc<TrackingRecordRepository>, locks: Arc<KeyedLockRegistry>) -> Self {
        Self {
            tracking_repo,
            locks,
        }
    }

    /// 为即将写入的记录落临时队列位置（事务内使用）
    ///
    /// 设置 `queue_position = 当前待派工数 + 1`，`queued_at = now`（未设置时）。
    /// 调用方随后必须在同一事务内持久化记录并 Reindex。
    ///
    /// # 错误
    /// - `WorkflowError::IllegalTransition`: 记录不处于 PENDING_ASSIGNMENT
    pub fn place_with_conn(
        &self,
        conn: &Connection,
        record: &mut TrackingRecord,
    ) -> WorkflowResult<()> {
        if record.status != TrackingStatus::PendingAssignment {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: record.tracking_id.clone(),
                current: record.status.to_string(),
                operation: "Enqueue".to_string(),
            });
        }

        let pending = TrackingRecordRepository::count_pending_with_conn(conn, &record.department_id)?;
        record.queue_position = Some(pending + 1);
        if record.queued_at.is_none() {
            record.queued_at = Some(Utc::now().naive_utc());
        }
        debug!(
            "入队: tracking_id={}, department={}, 临时位置={}",
            record.tracking_id,
            record.department_id,
            pending + 1
        );
        Ok(())
    }

    /// 重排部门队列位置（事务内使用）
    ///
    /// 按派工序（优先级降序, 入队时间升序）重写 queue_position 为连续 1..N。
    /// 任何记录离开/进入 PENDING_ASSIGNMENT 后必须在同一事务内调用,
    /// 否则会留下破坏顺序的空洞。
    ///
    /// # 返回
    /// 重排后的队列长度
    pub fn reindex_with_conn(&self, conn: &Connection, department_id: &str) -> WorkflowResult<u32> {
        let ordered =
            TrackingRecordRepository::list_pending_by_dispatch_order_with_conn(conn, department_id)?;

        // 位置未变的记录不写,避免无谓抬升 revision 干扰并发迁移
        for (i, (tracking_id, current)) in ordered.iter().enumerate() {
            let target = (i + 1) as u32;
            if *current != Some(target) {
                TrackingRecordRepository::set_queue_position_with_conn(conn, tracking_id, target)?;
            }
        }
        debug!(
            "重排队列: department={}, 队列长度={}",
            department_id,
            ordered.len()
        );
        Ok(ordered.len() as u32)
    }

    /// 查看部门队首记录（队列位置最小,入队时间兜底）
    ///
    /// 只读,不派工;派工需调用方显式走 AssignWorker
    pub fn next_for_worker(&self, department_id: &str) -> WorkflowResult<Option<TrackingRecord>> {
        let dept_lock = self.locks.handle(&department_lock_key(department_id));
        let _guard = lock_keyed(&dept_lock);

        let mut pending = self.tracking_repo.list_pending(department_id)?;
        if pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(pending.remove(0)))
    }

    /// 部门待派工队列快照（派工序）
    pub fn snapshot(&self, department_id: &str) -> WorkflowResult<Vec<TrackingRecord>> {
        let dept_lock = self.locks.handle(&department_lock_key(department_id));
        let _guard = lock_keyed(&dept_lock);
        Ok(self.tracking_repo.list_pending(department_id)?)
    }
}
