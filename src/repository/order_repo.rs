// ==========================================
// 首饰工厂订单流转系统 - 订单仓储
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 持久化接口
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::order::Order;
use crate::domain::types::{OrderStatus, Priority};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    /// 创建新的 OrderRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建订单
    pub fn create(&self, order: &Order) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO orders (
                order_id, order_number, status, priority, customer_name,
                current_department, gold_weight_initial, created_at, completed_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &order.order_id,
                &order.order_number,
                order.status.to_db_str(),
                order.priority.to_db_str(),
                &order.customer_name,
                &order.current_department,
                order.gold_weight_initial,
                order.created_at.format(TS_FMT).to_string(),
                order.completed_at.map(|t| t.format(TS_FMT).to_string()),
                order.revision,
            ],
        )?;
        Ok(order.order_id.clone())
    }

    /// 按 order_id 查询订单
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        Self::find_by_id_with_conn(&conn, order_id)
    }

    /// 按 order_id 查询订单（事务内使用）
    pub fn find_by_id_with_conn(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Option<Order>> {
        match conn.query_row(
            r#"SELECT order_id, order_number, status, priority, customer_name,
                      current_department, gold_weight_initial, created_at, completed_at, revision
               FROM orders WHERE order_id = ?"#,
            params![order_id],
            Self::map_row,
        ) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按订单号查询订单
    pub fn find_by_order_number(&self, order_number: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            r#"SELECT order_id, order_number, status, priority, customer_name,
                      current_department, gold_weight_initial, created_at, completed_at, revision
               FROM orders WHERE order_number = ?"#,
            params![order_number],
            Self::map_row,
        ) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 更新订单流转进度 (带乐观锁检查)
    ///
    /// 写入字段: status / current_department / completed_at
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::NotFound`: order_id 不存在
    pub fn update_progress(&self, order: &Order) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::update_progress_with_conn(&conn, order)
    }

    /// 更新订单流转进度（事务内使用，带乐观锁检查）
    pub fn update_progress_with_conn(conn: &Connection, order: &Order) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE orders
               SET status = ?, current_department = ?, completed_at = ?, revision = revision + 1
               WHERE order_id = ? AND revision = ?"#,
            params![
                order.status.to_db_str(),
                &order.current_department,
                order.completed_at.map(|t| t.format(TS_FMT).to_string()),
                &order.order_id,
                order.revision,
            ],
        )?;

        if rows_affected == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM orders WHERE order_id = ?",
                    params![&order.order_id],
                    |_row| Ok(true),
                )
                .unwrap_or(false);
            if exists {
                return Err(RepositoryError::OptimisticLockFailure {
                    entity: "Order".to_string(),
                    id: order.order_id.clone(),
                    expected_revision: order.revision,
                });
            }
            return Err(RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order.order_id.clone(),
            });
        }
        Ok(())
    }

    /// 查询全部订单（按创建时间倒序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT order_id, order_number, status, priority, customer_name,
                      current_department, gold_weight_initial, created_at, completed_at, revision
               FROM orders ORDER BY created_at DESC"#,
        )?;
        let orders = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<Order>, _>>()?;
        Ok(orders)
    }

    /// 行映射
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let status_str: String = row.get(2)?;
        let priority_str: String = row.get(3)?;
        Ok(Order {
            order_id: row.get(0)?,
            order_number: row.get(1)?,
            status: OrderStatus::from_db_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("非法订单状态: {status_str}").into(),
                )
            })?,
            priority: Priority::from_db_str(&priority_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("非法优先级: {priority_str}").into(),
                )
            })?,
            customer_name: row.get(4)?,
            current_department: row.get(5)?,
            gold_weight_initial: row.get(6)?,
            created_at: parse_ts(row.get::<_, String>(7)?, 7)?,
            completed_at: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            revision: row.get(9)?,
        })
    }
}

/// 解析时间戳字段
fn parse_ts(s: String, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
