// ==========================================
// 首饰工厂订单流转系统 - 流转状态机引擎
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 状态机与推进规则
// ==========================================
// 红线: 状态迁移要么整体成功要么原样保留,绝无半程落库
// 红线: 金重链 in(n+1) = out(n),完成时 out = in - loss
// 红线: 事件一律在事务提交之后发布
// 锁顺序: record 锁 → order 锁 → dept 锁 → 数据库连接锁
// ==========================================

use crate::config::CrossDepartmentPolicy;
use crate::domain::department::DepartmentCatalog;
use crate::domain::order::Order;
use crate::domain::tracking::TrackingRecord;
use crate::domain::types::{OrderStatus, TrackingStatus, WorkerAvailability};
use crate::engine::directory::WorkerDirectory;
use crate::engine::error::{WorkflowError, WorkflowResult};
use crate::engine::events::{
    OptionalEventPublisher, WorkflowEvent, WorkflowEventPublisher, WorkflowEventType,
};
use crate::engine::locks::{lock_keyed, KeyedLockRegistry};
use crate::engine::queue::{department_lock_key, AssignmentQueue};
use crate::repository::error::RepositoryError;
use crate::repository::order_repo::OrderRepository;
use crate::repository::tracking_repo::TrackingRecordRepository;
use crate::repository::worker_repo::WorkerRepository;
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 金重比较容差（克）
const WEIGHT_EPS: f64 = 1e-6;

/// 并发冲突重试退避
const CONFLICT_RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// 金重按 3 位小数舍入
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

// ==========================================
// AssignmentOverride - 管理员突破派工授权
// ==========================================
// 跨部门派工必须携带授权人,落审计并打 warn 日志
#[derive(Debug, Clone)]
pub struct AssignmentOverride {
    pub authorized_by: String,
}

// ==========================================
// WorkflowEngine - 流转状态机引擎
// ==========================================
pub struct WorkflowEngine {
    conn: Arc<Mutex<Connection>>,
    catalog: Arc<DepartmentCatalog>,
    policy: CrossDepartmentPolicy,
    order_repo: Arc<OrderRepository>,
    tracking_repo: Arc<TrackingRecordRepository>,
    directory: Arc<WorkerDirectory>,
    queue: Arc<AssignmentQueue>,
    locks: Arc<KeyedLockRegistry>,
    events: OptionalEventPublisher,
}

impl WorkflowEngine {
    /// 创建流转引擎实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        catalog: Arc<DepartmentCatalog>,
        policy: CrossDepartmentPolicy,
        order_repo: Arc<OrderRepository>,
        tracking_repo: Arc<TrackingRecordRepository>,
        worker_repo: Arc<WorkerRepository>,
        locks: Arc<KeyedLockRegistry>,
        event_publisher: Option<Arc<dyn WorkflowEventPublisher>>,
    ) -> Self {
        let events = match event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p),
            None => OptionalEventPublisher::none(),
        };
        let directory = Arc::new(WorkerDirectory::new(worker_repo));
        let queue = Arc::new(AssignmentQueue::new(tracking_repo.clone(), locks.clone()));

        Self {
            conn,
            catalog,
            policy,
            order_repo,
            tracking_repo,
            directory,
            queue,
            locks,
            events,
        }
    }

    /// 工人名录（读路径共享给调用方）
    pub fn directory(&self) -> &Arc<WorkerDirectory> {
        &self.directory
    }

    /// 派工队列（只读查询共享给调用方）
    pub fn queue(&self) -> &Arc<AssignmentQueue> {
        &self.queue
    }

    // ==========================================
    // 订单推进
    // ==========================================

    /// 订单进厂（Draft → InFactory，创建首部门流转记录并入队）
    pub fn activate_order(&self, order_id: &str) -> WorkflowResult<Order> {
        let order_lock = self.locks.handle(&format!("order:{order_id}"));
        let _guard = lock_keyed(&order_lock);

        let order = self.load_order(order_id)?;
        if order.status != OrderStatus::Draft {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: order_id.to_string(),
                current: order.status.to_string(),
                operation: "ActivateOrder".to_string(),
            });
        }
        self.advance_locked(order)
    }

    /// 推进订单到下一部门（或在末部门完成后整单收尾）
    ///
    /// # 前置条件
    /// 当前部门流转记录必须已 COMPLETED（违反视为上游 bug，不变量错误）
    pub fn advance_order(&self, order_id: &str) -> WorkflowResult<Order> {
        let order_lock = self.locks.handle(&format!("order:{order_id}"));
        let _guard = lock_keyed(&order_lock);

        let order = self.load_order(order_id)?;
        if order.status == OrderStatus::Completed {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: order_id.to_string(),
                current: order.status.to_string(),
                operation: "AdvanceOrder".to_string(),
            });
        }
        self.advance_locked(order)
    }

    /// 推进实现（调用方已持 order 锁）
    fn advance_locked(&self, mut order: Order) -> WorkflowResult<Order> {
        let records = self.tracking_repo.find_by_order(&order.order_id)?;
        let was_draft = order.status == OrderStatus::Draft;

        // 决定下一步: 首部门进入 / 中间推进 / 整单收尾
        let (next_department, gold_weight_in) = if records.is_empty() {
            if !was_draft {
                let msg = format!("在厂订单 {} 没有任何流转记录", order.order_id);
                error!("{msg}");
                return Err(WorkflowError::InvariantViolation(msg));
            }
            if !order.gold_weight_initial.is_finite() || order.gold_weight_initial < 0.0 {
                let msg = format!(
                    "订单 {} 进厂金重非法: {}",
                    order.order_id, order.gold_weight_initial
                );
                error!("{msg}");
                return Err(WorkflowError::InvariantViolation(msg));
            }
            (self.catalog.first().clone(), order.gold_weight_initial)
        } else {
            let last = match records.last() {
                Some(r) => r,
                None => {
                    return Err(WorkflowError::InvariantViolation(
                        "流转记录集合为空".to_string(),
                    ))
                }
            };
            if last.status != TrackingStatus::Completed {
                let msg = format!(
                    "推进前置条件违反: tracking_id={} 状态为 {} 而非 COMPLETED",
                    last.tracking_id, last.status
                );
                error!("{msg}");
                return Err(WorkflowError::InvariantViolation(msg));
            }

            if self.catalog.is_last(&last.department_id) {
                return self.finalize_locked(order, &records);
            }

            let next = self
                .catalog
                .next(&last.department_id)
                .ok_or_else(|| {
                    WorkflowError::InvariantViolation(format!(
                        "部门 {} 不在流水线目录中",
                        last.department_id
                    ))
                })?
                .clone();
            let weight_out = last.gold_weight_out.ok_or_else(|| {
                WorkflowError::InvariantViolation(format!(
                    "已完成记录 {} 缺少出厂金重",
                    last.tracking_id
                ))
            })?;
            (next, weight_out)
        };

        // 创建下一部门流转记录,入队并刷新订单流转缓存（单事务）
        let mut record = TrackingRecord::new_pending(
            order.order_id.clone(),
            next_department.id.clone(),
            next_department.sequence_index,
            gold_weight_in,
        );

        let dept_lock = self.locks.handle(&department_lock_key(&next_department.id));
        let _dept_guard = lock_keyed(&dept_lock);

        order.status = OrderStatus::InFactory;
        order.current_department = Some(next_department.id.clone());

        self.with_tx(|tx| {
            self.queue.place_with_conn(tx, &mut record)?;
            TrackingRecordRepository::insert_with_conn(tx, &record)?;
            self.queue.reindex_with_conn(tx, &next_department.id)?;
            OrderRepository::update_progress_with_conn(tx, &order)?;
            Ok(())
        })?;

        info!(
            "订单推进: order_id={}, department={}, gold_weight_in={}",
            order.order_id, next_department.id, gold_weight_in
        );

        // 事务已提交,事件尽力而为
        let activation_event = if was_draft {
            WorkflowEventType::OrderActivated
        } else {
            WorkflowEventType::OrderAdvanced
        };
        self.events.publish_best_effort(
            WorkflowEvent::new(
                activation_event,
                order.order_id.clone(),
                Some(next_department.id.clone()),
                None,
            )
            .with_meta("gold_weight_in", serde_json::json!(gold_weight_in)),
        );
        self.notify_new_work(&order.order_id, &next_department.id);

        self.load_order(&order.order_id)
    }

    /// 整单收尾（调用方已持 order 锁;全部门完成门禁在此强制）
    fn finalize_locked(
        &self,
        mut order: Order,
        records: &[TrackingRecord],
    ) -> WorkflowResult<Order> {
        let all_completed = records.len() == self.catalog.len()
            && records.iter().all(|r| r.status == TrackingStatus::Completed);
        if !all_completed {
            let msg = format!(
                "完成门禁违反: order_id={} 存在未完成流转记录,不得收尾",
                order.order_id
            );
            error!("{msg}");
            return Err(WorkflowError::InvariantViolation(msg));
        }

        let total_loss: f64 = round3(records.iter().filter_map(|r| r.gold_loss).sum());
        let final_weight = records.last().and_then(|r| r.gold_weight_out);

        order.status = OrderStatus::Completed;
        order.current_department = None;
        order.completed_at = Some(Utc::now().naive_utc());

        self.with_tx(|tx| {
            OrderRepository::update_progress_with_conn(tx, &order)?;
            Ok(())
        })?;

        info!(
            "订单完成: order_id={}, 总损耗={}, 出厂金重={:?}",
            order.order_id, total_loss, final_weight
        );

        self.events.publish_best_effort(
            WorkflowEvent::new(
                WorkflowEventType::OrderCompleted,
                order.order_id.clone(),
                None,
                None,
            )
            .with_meta("total_gold_loss", serde_json::json!(total_loss))
            .with_meta("final_gold_weight", serde_json::json!(final_weight)),
        );

        self.load_order(&order.order_id)
    }

    // ==========================================
    // 派工
    // ==========================================

    /// 派工
    ///
    /// # 前置条件
    /// - 记录处于 PENDING_ASSIGNMENT 且未派工
    /// - 工人 AVAILABLE,且归属记录所在部门（跨部门仅限管理员突破）
    pub fn assign_worker(
        &self,
        tracking_id: &str,
        worker_id: &str,
        admin_override: Option<AssignmentOverride>,
    ) -> WorkflowResult<TrackingRecord> {
        let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
        let _guard = lock_keyed(&record_lock);

        let record = self.load_record(tracking_id)?;
        if record.status != TrackingStatus::PendingAssignment {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "AssignWorker".to_string(),
            });
        }
        if let Some(assigned) = &record.assigned_worker_id {
            return Err(WorkflowError::AlreadyAssigned {
                tracking_id: tracking_id.to_string(),
                assigned_worker_id: assigned.clone(),
            });
        }

        let worker = self.directory.get(worker_id)?;
        if !worker.is_available() {
            return Err(WorkflowError::WorkerUnavailable {
                worker_id: worker_id.to_string(),
                reason: format!("当前状态 {}", worker.availability),
            });
        }

        let mut override_meta: Option<String> = None;
        if worker.department_id != record.department_id {
            match (&self.policy, admin_override) {
                (CrossDepartmentPolicy::AdministrativeOverride, Some(ov)) => {
                    warn!(
                        "跨部门突破派工: tracking_id={}, 记录部门={}, 工人部门={}, 授权人={}",
                        tracking_id, record.department_id, worker.department_id, ov.authorized_by
                    );
                    override_meta = Some(ov.authorized_by);
                }
                _ => {
                    return Err(WorkflowError::WorkerUnavailable {
                        worker_id: worker_id.to_string(),
                        reason: format!(
                            "部门不匹配: 工人归属 {}, 记录属于 {}（未授权突破）",
                            worker.department_id, record.department_id
                        ),
                    });
                }
            }
        }

        let dept_lock = self.locks.handle(&department_lock_key(&record.department_id));
        let _dept_guard = lock_keyed(&dept_lock);

        let mut updated = record.clone();
        updated.assigned_worker_id = Some(worker_id.to_string());
        updated.queue_position = None;

        self.with_tx(|tx| {
            TrackingRecordRepository::update_with_cas_conn(
                tx,
                &updated,
                TrackingStatus::PendingAssignment,
            )?;
            self.queue.reindex_with_conn(tx, &record.department_id)?;
            WorkerRepository::update_availability_with_conn(
                tx,
                worker_id,
                WorkerAvailability::Busy,
                true,
            )?;
            Ok(())
        })?;

        debug!(
            "派工完成: tracking_id={}, worker_id={}, department={}",
            tracking_id, worker_id, record.department_id
        );

        let mut event = WorkflowEvent::new(
            WorkflowEventType::AssignmentCreated,
            record.order_id.clone(),
            Some(record.department_id.clone()),
            Some(worker_id.to_string()),
        );
        if let Some(authorized_by) = override_meta {
            event = event.with_meta("override_authorized_by", serde_json::json!(authorized_by));
        }
        self.events.publish_best_effort(event);

        self.load_record(tracking_id)
    }

    /// 撤销派工（回到待派工队尾,释放工人）
    pub fn unassign(&self, tracking_id: &str) -> WorkflowResult<TrackingRecord> {
        let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
        let _guard = lock_keyed(&record_lock);

        let record = self.load_record(tracking_id)?;
        let worker_id = record.assigned_worker_id.clone().ok_or_else(|| {
            WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "Unassign(未派工)".to_string(),
            }
        })?;

        if !matches!(
            record.status,
            TrackingStatus::InProgress | TrackingStatus::OnHold | TrackingStatus::PendingAssignment
        ) {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "Unassign".to_string(),
            });
        }

        let dept_lock = self.locks.handle(&department_lock_key(&record.department_id));
        let _dept_guard = lock_keyed(&dept_lock);

        let expected = record.status;
        let mut updated = record.clone();
        updated.assigned_worker_id = None;
        updated.status = TrackingStatus::PendingAssignment;
        updated.queued_at = Some(Utc::now().naive_utc());

        self.with_tx(|tx| {
            self.queue.place_with_conn(tx, &mut updated)?;
            TrackingRecordRepository::update_with_cas_conn(tx, &updated, expected)?;
            self.queue.reindex_with_conn(tx, &record.department_id)?;
            WorkerRepository::update_availability_with_conn(
                tx,
                &worker_id,
                WorkerAvailability::Available,
                false,
            )?;
            Ok(())
        })?;

        info!(
            "撤销派工: tracking_id={}, worker_id={}, 原状态={}",
            tracking_id, worker_id, expected
        );

        self.events.publish_best_effort(WorkflowEvent::new(
            WorkflowEventType::WorkerUnassigned,
            record.order_id.clone(),
            Some(record.department_id.clone()),
            Some(worker_id),
        ));
        self.notify_new_work(&record.order_id, &record.department_id);

        self.load_record(tracking_id)
    }

    // ==========================================
    // 开工 / 完工
    // ==========================================

    /// 开工（幂等: 已开工记录重复调用直接返回当前状态）
    pub fn start_work(&self, tracking_id: &str) -> WorkflowResult<TrackingRecord> {
        let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
        let _guard = lock_keyed(&record_lock);

        let record = self.load_record(tracking_id)?;

        // 幂等路径: 客户端超时重试 / 系统重启后恢复
        if record.status == TrackingStatus::InProgress && record.is_assigned() {
            debug!("开工幂等命中: tracking_id={} 已处于 IN_PROGRESS", tracking_id);
            return Ok(record);
        }

        if record.status != TrackingStatus::PendingAssignment || !record.is_assigned() {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "StartWork".to_string(),
            });
        }

        let mut updated = record.clone();
        updated.status = TrackingStatus::InProgress;
        if updated.started_at.is_none() {
            updated.started_at = Some(Utc::now().naive_utc());
        }
        self.tracking_repo
            .update_with_cas(&updated, TrackingStatus::PendingAssignment)?;

        info!(
            "开工: tracking_id={}, worker_id={:?}",
            tracking_id, record.assigned_worker_id
        );

        self.events.publish_best_effort(WorkflowEvent::new(
            WorkflowEventType::WorkStarted,
            record.order_id.clone(),
            Some(record.department_id.clone()),
            record.assigned_worker_id.clone(),
        ));

        self.load_record(tracking_id)
    }

    /// 完工
    ///
    /// 计算损耗,释放工人,随后自动推进订单。
    /// 出厂金重大于进厂金重直接拒绝（金子不会变多）,不做静默截断。
    pub fn complete_work(
        &self,
        tracking_id: &str,
        gold_weight_out: f64,
        notes: Option<String>,
        photos: Vec<String>,
    ) -> WorkflowResult<TrackingRecord> {
        let order_id;
        {
            let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
            let _guard = lock_keyed(&record_lock);

            let record = self.load_record(tracking_id)?;
            if record.status != TrackingStatus::InProgress {
                return Err(WorkflowError::IllegalTransition {
                    tracking_id: tracking_id.to_string(),
                    current: record.status.to_string(),
                    operation: "CompleteWork".to_string(),
                });
            }
            let worker_id = record.assigned_worker_id.clone().ok_or_else(|| {
                WorkflowError::IllegalTransition {
                    tracking_id: tracking_id.to_string(),
                    current: "IN_PROGRESS(未派工)".to_string(),
                    operation: "CompleteWork".to_string(),
                }
            })?;

            if !gold_weight_out.is_finite()
                || gold_weight_out < 0.0
                || gold_weight_out > record.gold_weight_in + WEIGHT_EPS
            {
                return Err(WorkflowError::InvalidWeight {
                    tracking_id: tracking_id.to_string(),
                    weight_in: record.gold_weight_in,
                    weight_out: gold_weight_out,
                });
            }

            let gold_loss = round3((record.gold_weight_in - gold_weight_out).max(0.0));

            let mut updated = record.clone();
            updated.status = TrackingStatus::Completed;
            updated.completed_at = Some(Utc::now().naive_utc());
            updated.gold_weight_out = Some(gold_weight_out);
            updated.gold_loss = Some(gold_loss);
            updated.notes = notes;
            updated.photos = photos;

            self.with_tx(|tx| {
                TrackingRecordRepository::update_with_cas_conn(
                    tx,
                    &updated,
                    TrackingStatus::InProgress,
                )?;
                WorkerRepository::update_availability_with_conn(
                    tx,
                    &worker_id,
                    WorkerAvailability::Available,
                    false,
                )?;
                Ok(())
            })?;

            info!(
                "完工: tracking_id={}, department={}, gold_weight_out={}, gold_loss={}",
                tracking_id, record.department_id, gold_weight_out, gold_loss
            );

            self.events.publish_best_effort(
                WorkflowEvent::new(
                    WorkflowEventType::WorkCompleted,
                    record.order_id.clone(),
                    Some(record.department_id.clone()),
                    Some(worker_id),
                )
                .with_meta("gold_weight_out", serde_json::json!(gold_weight_out))
                .with_meta("gold_loss", serde_json::json!(gold_loss)),
            );

            order_id = record.order_id;
            // record 锁在此释放,推进走 order 锁
        }

        self.advance_order(&order_id)?;
        self.load_record(tracking_id)
    }

    // ==========================================
    // 挂起 / 恢复
    // ==========================================

    /// 挂起（IN_PROGRESS → ON_HOLD,不释放工人、不动金重）
    pub fn put_on_hold(&self, tracking_id: &str, reason: &str) -> WorkflowResult<TrackingRecord> {
        let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
        let _guard = lock_keyed(&record_lock);

        let record = self.load_record(tracking_id)?;
        if record.status != TrackingStatus::InProgress {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "PutOnHold".to_string(),
            });
        }

        let mut updated = record.clone();
        updated.status = TrackingStatus::OnHold;
        self.tracking_repo
            .update_with_cas(&updated, TrackingStatus::InProgress)?;

        info!("挂起: tracking_id={}, reason={}", tracking_id, reason);

        self.events.publish_best_effort(
            WorkflowEvent::new(
                WorkflowEventType::WorkOnHold,
                record.order_id.clone(),
                Some(record.department_id.clone()),
                record.assigned_worker_id.clone(),
            )
            .with_meta("reason", serde_json::json!(reason)),
        );

        self.load_record(tracking_id)
    }

    /// 恢复（ON_HOLD → IN_PROGRESS,回到加工中而非重新排队）
    pub fn resume_from_hold(&self, tracking_id: &str) -> WorkflowResult<TrackingRecord> {
        let record_lock = self.locks.handle(&format!("rec:{tracking_id}"));
        let _guard = lock_keyed(&record_lock);

        let record = self.load_record(tracking_id)?;
        if record.status != TrackingStatus::OnHold {
            return Err(WorkflowError::IllegalTransition {
                tracking_id: tracking_id.to_string(),
                current: record.status.to_string(),
                operation: "ResumeFromHold".to_string(),
            });
        }

        let mut updated = record.clone();
        updated.status = TrackingStatus::InProgress;
        self.tracking_repo
            .update_with_cas(&updated, TrackingStatus::OnHold)?;

        info!("恢复: tracking_id={}", tracking_id);

        self.events.publish_best_effort(WorkflowEvent::new(
            WorkflowEventType::WorkResumed,
            record.order_id.clone(),
            Some(record.department_id.clone()),
            record.assigned_worker_id.clone(),
        ));

        self.load_record(tracking_id)
    }

    // ==========================================
    // 辅助
    // ==========================================

    /// 从流转记录集合重算订单当前部门（事实源校验用）
    ///
    /// orders.current_department 只是缓存,任何时刻都应与本函数结果一致
    pub fn derive_current_department(&self, records: &[TrackingRecord]) -> Option<String> {
        if records.is_empty() {
            return None;
        }
        if let Some(open) = records.iter().find(|r| r.status != TrackingStatus::Completed) {
            return Some(open.department_id.clone());
        }
        // 全部已完成: 覆盖全流水线则整单完成,否则下一部门尚未建记录
        if records.len() == self.catalog.len() {
            None
        } else {
            records
                .last()
                .and_then(|last| self.catalog.next(&last.department_id))
                .map(|d| d.id.clone())
        }
    }

    /// 新待派工作通知（部门有空闲工人时才发,派工仍需显式调用）
    fn notify_new_work(&self, order_id: &str, department_id: &str) {
        match self.directory.find_available(department_id) {
            Ok(Some(worker)) => {
                self.events.publish_best_effort(
                    WorkflowEvent::new(
                        WorkflowEventType::NewWorkAvailable,
                        order_id.to_string(),
                        Some(department_id.to_string()),
                        Some(worker.worker_id),
                    ),
                );
            }
            Ok(None) => {}
            Err(e) => warn!("查询空闲工人失败(通知跳过): {e}"),
        }
    }

    /// 加载订单（NotFound 上抛）
    fn load_order(&self, order_id: &str) -> WorkflowResult<Order> {
        self.order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })
    }

    /// 加载流转记录（NotFound 上抛）
    fn load_record(&self, tracking_id: &str) -> WorkflowResult<TrackingRecord> {
        self.tracking_repo
            .find_by_id(tracking_id)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "TrackingRecord".to_string(),
                id: tracking_id.to_string(),
            })
    }

    /// 在共享连接上执行事务（f 出错即整体回滚）
    fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> WorkflowResult<T>,
    ) -> WorkflowResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| WorkflowError::Internal(format!("连接锁获取失败: {e}")))?;
        let tx = conn.transaction().map_err(|e| {
            WorkflowError::Repository(RepositoryError::DatabaseTransactionError(e.to_string()))
        })?;
        let out = f(&tx)?;
        tx.commit().map_err(|e| {
            WorkflowError::Repository(RepositoryError::DatabaseTransactionError(e.to_string()))
        })?;
        Ok(out)
    }
}

// ==========================================
// 并发冲突重试辅助
// ==========================================

/// 对瞬态并发冲突退避重试一次,其余错误原样上抛
///
/// 调用方纪律: ConcurrentModification 重试一次,仍冲突则上抛
pub fn retry_once_on_conflict<T>(
    mut op: impl FnMut() -> WorkflowResult<T>,
) -> WorkflowResult<T> {
    match op() {
        Err(err) if err.is_transient() => {
            debug!("并发冲突,退避重试一次: {err}");
            std::thread::sleep(CONFLICT_RETRY_BACKOFF);
            op()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.1234), 0.123);
        assert_eq!(round3(0.1235), 0.124);
        assert_eq!(round3(50.0 - 49.5), 0.5);
    }

    #[test]
    fn test_retry_once_gives_up_after_second_conflict() {
        let mut calls = 0;
        let result: WorkflowResult<()> = retry_once_on_conflict(|| {
            calls += 1;
            Err(WorkflowError::ConcurrentModification {
                entity: "TrackingRecord".to_string(),
                id: "T1".to_string(),
            })
        });
        assert_eq!(calls, 2);
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_once_recovers() {
        let mut calls = 0;
        let result = retry_once_on_conflict(|| {
            calls += 1;
            if calls == 1 {
                Err(WorkflowError::ConcurrentModification {
                    entity: "TrackingRecord".to_string(),
                    id: "T1".to_string(),
                })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_does_not_retry_business_errors() {
        let mut calls = 0;
        let result: WorkflowResult<()> = retry_once_on_conflict(|| {
            calls += 1;
            Err(WorkflowError::InvalidWeight {
                tracking_id: "T1".to_string(),
                weight_in: 50.0,
                weight_out: 51.0,
            })
        });
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }
}
