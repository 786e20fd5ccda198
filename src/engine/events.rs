// ==========================================
// 首饰工厂订单流转系统 - 引擎层事件发布
// ==========================================
// 职责: 定义流转事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，通知/推送层实现适配器
// 红线: 事件发布尽力而为,投递失败绝不回滚已提交的状态迁移
// ==========================================

use crate::domain::audit::AuditEntry;
use crate::repository::audit_log_repo::AuditLogRepository;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;

// ==========================================
// 流转事件类型
// ==========================================

/// 流转事件触发类型
///
/// Engine 层定义的事件类型，用于通知下游系统
/// （推送/邮件/大屏等投递通道在引擎之外实现）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEventType {
    /// 订单进厂
    OrderActivated,
    /// 部门有新待派工作
    NewWorkAvailable,
    /// 派工完成
    AssignmentCreated,
    /// 开工
    WorkStarted,
    /// 完工
    WorkCompleted,
    /// 挂起
    WorkOnHold,
    /// 恢复
    WorkResumed,
    /// 撤销派工
    WorkerUnassigned,
    /// 订单推进到下一部门
    OrderAdvanced,
    /// 订单全部完成
    OrderCompleted,
}

impl WorkflowEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEventType::OrderActivated => "OrderActivated",
            WorkflowEventType::NewWorkAvailable => "NewWorkAvailable",
            WorkflowEventType::AssignmentCreated => "AssignmentCreated",
            WorkflowEventType::WorkStarted => "WorkStarted",
            WorkflowEventType::WorkCompleted => "WorkCompleted",
            WorkflowEventType::WorkOnHold => "WorkOnHold",
            WorkflowEventType::WorkResumed => "WorkResumed",
            WorkflowEventType::WorkerUnassigned => "WorkerUnassigned",
            WorkflowEventType::OrderAdvanced => "OrderAdvanced",
            WorkflowEventType::OrderCompleted => "OrderCompleted",
        }
    }
}

/// 流转事件
///
/// Engine 在状态迁移持久化提交之后发布
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// 事件类型
    pub event_type: WorkflowEventType,
    /// 关联订单
    pub order_id: String,
    /// 关联部门（可选）
    pub department_id: Option<String>,
    /// 关联工人（可选）
    pub worker_id: Option<String>,
    /// 事件发生时间
    pub occurred_at: NaiveDateTime,
    /// 自由元数据（金重、暂停原因、突破授权人等）
    pub metadata: JsonMap<String, JsonValue>,
}

impl WorkflowEvent {
    /// 创建事件
    pub fn new(
        event_type: WorkflowEventType,
        order_id: impl Into<String>,
        department_id: Option<String>,
        worker_id: Option<String>,
    ) -> Self {
        Self {
            event_type,
            order_id: order_id.into(),
            department_id,
            worker_id,
            occurred_at: Utc::now().naive_utc(),
            metadata: JsonMap::new(),
        }
    }

    /// 附加元数据
    pub fn with_meta(mut self, key: &str, value: JsonValue) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 流转事件发布者 Trait
///
/// Engine 层定义，通知层实现
///
/// # 实现说明
/// - 发布必须快速返回,不得阻塞调用方的持久化路径
/// - 投递失败由实现方自行记录,Engine 只打 warn
pub trait WorkflowEventPublisher: Send + Sync {
    /// 发布流转事件
    fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl WorkflowEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - order_id={}, event_type={}",
            event.order_id,
            event.event_type.as_str()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn WorkflowEventPublisher>> 的使用
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn WorkflowEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn WorkflowEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 尽力发布事件
    ///
    /// 投递失败只打 warn 日志；已提交的状态迁移不受影响
    pub fn publish_best_effort(&self, event: WorkflowEvent) {
        if let Some(publisher) = &self.inner {
            if let Err(e) = publisher.publish(event.clone()) {
                tracing::warn!(
                    "事件发布失败(忽略): order_id={}, event_type={}, err={}",
                    event.order_id,
                    event.event_type.as_str(),
                    e
                );
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

// ==========================================
// 审计落库适配器
// ==========================================

/// 把流转事件追加写入 audit_log 表的发布者
///
/// 作为事件链路的事实存底;用户可在其外再包一层异步分发
pub struct AuditLogSink {
    audit_repo: Arc<AuditLogRepository>,
}

impl AuditLogSink {
    /// 创建审计落库发布者
    pub fn new(audit_repo: Arc<AuditLogRepository>) -> Self {
        Self { audit_repo }
    }
}

impl WorkflowEventPublisher for AuditLogSink {
    fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let payload = if event.metadata.is_empty() {
            None
        } else {
            Some(JsonValue::Object(event.metadata.clone()))
        };
        let entry = AuditEntry::new(
            event.event_type.as_str().to_string(),
            event.order_id.clone(),
            event.department_id.clone(),
            event.worker_id.clone(),
            payload,
        );
        self.audit_repo
            .insert(&entry)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        Ok(())
    }
}

// ==========================================
// 异步通道发布者
// ==========================================

/// 经 tokio 无界通道异步分发事件的发布者
///
/// publish 仅入队,真正投递在后台任务中执行,
/// 保证事件分发不占用持久化事务
///
/// # 前置条件
/// 必须在 tokio 运行时内创建（内部 spawn 分发任务）
pub struct ChannelEventPublisher {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventPublisher {
    /// 创建发布者并启动后台分发任务
    pub fn spawn(downstream: Arc<dyn WorkflowEventPublisher>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkflowEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = downstream.publish(event.clone()) {
                    tracing::warn!(
                        "异步事件投递失败: order_id={}, event_type={}, err={}",
                        event.order_id,
                        event.event_type.as_str(),
                        e
                    );
                }
            }
            tracing::debug!("ChannelEventPublisher: 分发任务退出");
        });
        Self { tx }
    }
}

impl WorkflowEventPublisher for ChannelEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.tx
            .send(event)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        Ok(())
    }
}
