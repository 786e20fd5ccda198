// ==========================================
// 首饰工厂订单流转系统 - 审计日志领域模型
// ==========================================
// 红线: 所有状态迁移必须落审计
// 用途: 审计追踪,事后对账
// 对齐: schema audit_log 表
// ==========================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ==========================================
// AuditEntry - 审计条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    // ===== 主键 =====
    pub audit_id: String, // 审计条目ID

    // ===== 事件标识 =====
    pub event_type: String,            // 事件类型（存储为字符串）
    pub order_id: String,              // 关联订单
    pub department_id: Option<String>, // 关联部门（可选）
    pub worker_id: Option<String>,     // 关联工人（可选）

    // ===== 负载 =====
    pub payload_json: Option<JsonValue>, // 事件元数据（JSON）

    // ===== 时间戳 =====
    pub occurred_at: NaiveDateTime, // 事件发生时间
}

impl AuditEntry {
    /// 创建审计条目
    pub fn new(
        event_type: String,
        order_id: String,
        department_id: Option<String>,
        worker_id: Option<String>,
        payload_json: Option<JsonValue>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4().to_string(),
            event_type,
            order_id,
            department_id,
            worker_id,
            payload_json,
            occurred_at: Utc::now().naive_utc(),
        }
    }
}
