// ==========================================
// 首饰工厂订单流转系统 - 订单领域模型
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 订单聚合根
// 红线: current_department 为派生缓存,事实源是流转记录集合
// ==========================================

use crate::domain::types::{OrderStatus, Priority};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// Order - 订单聚合根
// ==========================================
// 对齐: schema orders 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // ===== 主键 =====
    pub order_id: String, // 订单唯一标识

    // ===== 基础信息 =====
    pub order_number: String,  // 订单号（业务唯一）
    pub status: OrderStatus,   // 订单状态
    pub priority: Priority,    // 优先级（排队依据）
    pub customer_name: Option<String>, // 客户名称

    // ===== 流转缓存 =====
    // 始终指向第一个未完成部门;完成后为 None
    pub current_department: Option<String>,

    // ===== 金重 =====
    pub gold_weight_initial: f64, // 进厂金重（克，3位小数）

    // ===== 审计字段 =====
    pub created_at: NaiveDateTime,           // 创建时间
    pub completed_at: Option<NaiveDateTime>, // 完成时间
    pub revision: i32,                       // 乐观锁版本号
}

impl Order {
    /// 创建草稿订单
    pub fn new_draft(order_number: String, priority: Priority, gold_weight_initial: f64) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            order_number,
            status: OrderStatus::Draft,
            priority,
            customer_name: None,
            current_department: None,
            gold_weight_initial,
            created_at: Utc::now().naive_utc(),
            completed_at: None,
            revision: 0,
        }
    }

    /// 订单是否已进厂
    pub fn is_in_factory(&self) -> bool {
        self.status == OrderStatus::InFactory
    }

    /// 订单是否已全部完成
    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed
    }
}
