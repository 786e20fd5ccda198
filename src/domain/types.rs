// ==========================================
// 首饰工厂订单流转系统 - 领域类型定义
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 状态体系
// 红线: 流转记录状态只能由 WorkflowEngine 变更
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order Status)
// ==========================================
// 不变量: COMPLETED ⇔ 该订单所有流转记录均为 COMPLETED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,     // 草稿（未进厂）
    InFactory, // 在厂流转中
    Completed, // 全部工序完成
}

impl OrderStatus {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(OrderStatus::Draft),
            "IN_FACTORY" => Some(OrderStatus::InFactory),
            "COMPLETED" => Some(OrderStatus::Completed),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::InFactory => "IN_FACTORY",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 流转记录状态 (Tracking Status)
// ==========================================
// 状态机: NOT_STARTED → PENDING_ASSIGNMENT → IN_PROGRESS → COMPLETED
//         ON_HOLD 仅可由 IN_PROGRESS 进入，恢复后回到 IN_PROGRESS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    NotStarted,        // 未开始（尚未进入该部门）
    PendingAssignment, // 待派工（排队中）
    InProgress,        // 加工中
    Completed,         // 已完成
    OnHold,            // 暂停（异常挂起）
}

impl TrackingStatus {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NOT_STARTED" => Some(TrackingStatus::NotStarted),
            "PENDING_ASSIGNMENT" => Some(TrackingStatus::PendingAssignment),
            "IN_PROGRESS" => Some(TrackingStatus::InProgress),
            "COMPLETED" => Some(TrackingStatus::Completed),
            "ON_HOLD" => Some(TrackingStatus::OnHold),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TrackingStatus::NotStarted => "NOT_STARTED",
            TrackingStatus::PendingAssignment => "PENDING_ASSIGNMENT",
            TrackingStatus::InProgress => "IN_PROGRESS",
            TrackingStatus::Completed => "COMPLETED",
            TrackingStatus::OnHold => "ON_HOLD",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 工人可用状态 (Worker Availability)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerAvailability {
    Available, // 空闲可派工
    Busy,      // 有在手工作
    Offline,   // 离线/请假
}

impl WorkerAvailability {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => Some(WorkerAvailability::Available),
            "BUSY" => Some(WorkerAvailability::Busy),
            "OFFLINE" => Some(WorkerAvailability::Offline),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WorkerAvailability::Available => "AVAILABLE",
            WorkerAvailability::Busy => "BUSY",
            WorkerAvailability::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for WorkerAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 订单优先级 (Order Priority)
// ==========================================
// 红线: 等级制,不是评分制
// 排队序: 优先级降序, 入队时间升序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,    // 低
    Normal, // 正常
    High,   // 加急
    Urgent, // 特急
}

impl Priority {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LOW" => Some(Priority::Low),
            "NORMAL" => Some(Priority::Normal),
            "HIGH" => Some(Priority::High),
            "URGENT" => Some(Priority::Urgent),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }

    /// 排序权重（数值越大越靠前）
    pub fn rank(&self) -> i32 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_status_roundtrip() {
        for status in [
            TrackingStatus::NotStarted,
            TrackingStatus::PendingAssignment,
            TrackingStatus::InProgress,
            TrackingStatus::Completed,
            TrackingStatus::OnHold,
        ] {
            assert_eq!(TrackingStatus::from_db_str(status.to_db_str()), Some(status));
        }
        assert_eq!(TrackingStatus::from_db_str("NO_SUCH"), None);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());
    }

    #[test]
    fn test_order_status_case_insensitive() {
        assert_eq!(OrderStatus::from_db_str("in_factory"), Some(OrderStatus::InFactory));
    }
}
