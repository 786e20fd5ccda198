// ==========================================
// 首饰工厂订单流转系统 - 演示数据种子脚本
// ==========================================
// 用途: 建库、种工人、走通一张订单的全流水线
// 运行: cargo run --bin seed_demo_flow [db_path]
// ==========================================

use anyhow::{Context, Result};
use jewelry_workflow::db;
use jewelry_workflow::domain::Worker;
use jewelry_workflow::engine::{AuditLogSink, ChannelEventPublisher, WorkflowEngine};
use jewelry_workflow::logging;
use jewelry_workflow::repository::{
    AuditLogRepository, OrderRepository, TrackingRecordRepository, WorkerRepository,
};
use jewelry_workflow::{KeyedLockRegistry, Order, Priority, WorkflowConfig, WorkflowEventPublisher};
use std::sync::{Arc, Mutex};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo_jewelry.db".to_string());
    info!("建库: {db_path}");

    let conn = db::open_sqlite_connection(&db_path).context("打开数据库失败")?;
    db::init_schema(&conn).context("初始化 schema 失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let config = WorkflowConfig::default();
    let catalog = Arc::new(config.build_catalog());

    let order_repo = Arc::new(OrderRepository::new(conn.clone()));
    let tracking_repo = Arc::new(TrackingRecordRepository::new(conn.clone()));
    let worker_repo = Arc::new(WorkerRepository::new(conn.clone()));
    let audit_repo = Arc::new(AuditLogRepository::new(conn.clone()));
    let locks = Arc::new(KeyedLockRegistry::new());

    // 事件链路: 引擎 → 异步通道 → 审计落库
    let audit_sink: Arc<dyn WorkflowEventPublisher> = Arc::new(AuditLogSink::new(audit_repo.clone()));
    let publisher: Arc<dyn WorkflowEventPublisher> =
        Arc::new(ChannelEventPublisher::spawn(audit_sink));

    let engine = WorkflowEngine::new(
        conn.clone(),
        catalog.clone(),
        config.cross_department_policy,
        order_repo.clone(),
        tracking_repo.clone(),
        worker_repo.clone(),
        locks,
        Some(publisher),
    );

    // 每个部门种两名工人
    for dept in catalog.departments() {
        for n in 1..=2 {
            let worker = Worker::new(format!("{}-师傅{}", dept.name, n), dept.id.clone());
            worker_repo.create(&worker)?;
        }
    }
    info!("已种 {} 名工人", catalog.len() * 2);

    // 一张加急订单走通全流水线
    let order = Order::new_draft("JW-2026-0001".to_string(), Priority::High, 50.0);
    let order_id = order_repo.create(&order)?;
    let mut order = engine.activate_order(&order_id)?;
    info!("订单进厂: {}", order.order_number);

    let mut weight = order.gold_weight_initial;
    while let Some(dept_id) = order.current_department.clone() {
        let record = engine
            .queue()
            .next_for_worker(&dept_id)?
            .context("队列意外为空")?;
        let worker = engine
            .directory()
            .find_available(&dept_id)?
            .context("部门无空闲工人")?;

        engine.assign_worker(&record.tracking_id, &worker.worker_id, None)?;
        engine.start_work(&record.tracking_id)?;
        weight -= 0.05; // 每道工序演示损耗 0.05 克
        engine.complete_work(
            &record.tracking_id,
            weight,
            Some(format!("{dept_id} 完工")),
            vec![],
        )?;
        info!("{} 完工, 出厂金重 {:.3}", dept_id, weight);

        order = order_repo
            .find_by_id(&order_id)?
            .context("订单查询失败")?;
    }

    info!(
        "订单完成: {}, 总损耗 {:.3} 克",
        order.order_number,
        order.gold_weight_initial - weight
    );

    // 等待异步事件落库后输出审计轨迹
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    for entry in audit_repo.find_by_order(&order_id)? {
        info!("审计: {} @ {}", entry.event_type, entry.occurred_at);
    }

    Ok(())
}
