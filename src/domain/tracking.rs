// ==========================================
// 首饰工厂订单流转系统 - 流转记录领域模型
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 流转记录（订单×部门）
// 红线: 完成时必须满足 gold_weight_out = gold_weight_in - gold_loss
// 红线: 相邻部门金重链 in(n+1) = out(n)
// ==========================================

use crate::domain::types::TrackingStatus;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// TrackingRecord - 流转记录
// ==========================================
// 每 (订单, 部门) 一条,到达该部门时懒创建
// 对齐: schema tracking_record 表, UNIQUE(order_id, department_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    // ===== 主键与关联 =====
    pub tracking_id: String,   // 流转记录唯一标识
    pub order_id: String,      // 关联订单（FK）
    pub department_id: String, // 关联部门
    pub sequence_order: u32,   // 部门流水线序号（冗余,便于排序查询）

    // ===== 状态机字段 =====
    pub status: TrackingStatus,            // 当前状态
    pub assigned_worker_id: Option<String>, // 已派工人（可空）

    // ===== 队列字段 =====
    pub queue_position: Option<u32>,      // 待派工队列位置（1 起连续）
    pub queued_at: Option<NaiveDateTime>, // 入队时间

    // ===== 金重字段（克，3位小数）=====
    pub gold_weight_in: f64,          // 进入该部门的金重
    pub gold_weight_out: Option<f64>, // 离开该部门的金重（完成时写入）
    pub gold_loss: Option<f64>,       // 该部门损耗（完成时计算）

    // ===== 完工附件 =====
    pub notes: Option<String>, // 完工备注
    pub photos: Vec<String>,   // 完工照片存储键（JSON 数组持久化）

    // ===== 时间戳 =====
    pub started_at: Option<NaiveDateTime>,   // 开工时间
    pub completed_at: Option<NaiveDateTime>, // 完工时间
    pub created_at: NaiveDateTime,           // 记录创建时间
    pub updated_at: NaiveDateTime,           // 记录更新时间

    // ===== 并发控制 =====
    pub revision: i32, // 乐观锁版本号
}

impl TrackingRecord {
    /// 创建待派工的流转记录（订单到达该部门时调用）
    pub fn new_pending(
        order_id: String,
        department_id: String,
        sequence_order: u32,
        gold_weight_in: f64,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            tracking_id: Uuid::new_v4().to_string(),
            order_id,
            department_id,
            sequence_order,
            status: TrackingStatus::PendingAssignment,
            assigned_worker_id: None,
            queue_position: None,
            queued_at: Some(now),
            gold_weight_in,
            gold_weight_out: None,
            gold_loss: None,
            notes: None,
            photos: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// 是否处于可派工状态
    pub fn is_pending_assignment(&self) -> bool {
        self.status == TrackingStatus::PendingAssignment
    }

    /// 是否已完成
    pub fn is_completed(&self) -> bool {
        self.status == TrackingStatus::Completed
    }

    /// 是否有在派工人
    pub fn is_assigned(&self) -> bool {
        self.assigned_worker_id.is_some()
    }
}
