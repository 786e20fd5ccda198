// ==========================================
// 首饰工厂订单流转系统 - 工人领域模型
// ==========================================
// 红线: 可用状态只能经 WorkerDirectory 写路径变更
// ==========================================

use crate::domain::types::WorkerAvailability;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// Worker - 部门工人
// ==========================================
// 每个工人归属单一可派工部门;跨部门派工走管理员突破路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,                     // 工人唯一标识
    pub name: String,                          // 姓名
    pub department_id: String,                 // 归属部门
    pub availability: WorkerAvailability,      // 可用状态
    pub last_assigned_at: Option<NaiveDateTime>, // 最近派工时间（负载均衡依据）
    pub created_at: NaiveDateTime,             // 创建时间
    pub updated_at: NaiveDateTime,             // 更新时间
}

impl Worker {
    /// 创建空闲工人
    pub fn new(name: String, department_id: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            worker_id: Uuid::new_v4().to_string(),
            name,
            department_id,
            availability: WorkerAvailability::Available,
            last_assigned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否可接受派工
    pub fn is_available(&self) -> bool {
        self.availability == WorkerAvailability::Available
    }
}
