// ==========================================
// 首饰工厂订单流转系统 - 工人仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 写路径仅供 WorkerDirectory / WorkflowEngine 调用
// ==========================================

use crate::domain::types::WorkerAvailability;
use crate::domain::worker::Worker;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ==========================================
// WorkerRepository - 工人仓储
// ==========================================
pub struct WorkerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkerRepository {
    /// 创建新的 WorkerRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建工人
    pub fn create(&self, worker: &Worker) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO workers (
                worker_id, name, department_id, availability,
                last_assigned_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &worker.worker_id,
                &worker.name,
                &worker.department_id,
                worker.availability.to_db_str(),
                worker.last_assigned_at.map(|t| t.format(TS_FMT).to_string()),
                worker.created_at.format(TS_FMT).to_string(),
                worker.updated_at.format(TS_FMT).to_string(),
            ],
        )?;
        Ok(worker.worker_id.clone())
    }

    /// 按 worker_id 查询
    pub fn find_by_id(&self, worker_id: &str) -> RepositoryResult<Option<Worker>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            r#"SELECT worker_id, name, department_id, availability,
                      last_assigned_at, created_at, updated_at
               FROM workers WHERE worker_id = ?"#,
            params![worker_id],
            Self::map_row,
        ) {
            Ok(worker) => Ok(Some(worker)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询部门空闲工人（最久未派工优先，从未派工的排最前）
    pub fn find_available_by_department(
        &self,
        department_id: &str,
    ) -> RepositoryResult<Vec<Worker>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT worker_id, name, department_id, availability,
                      last_assigned_at, created_at, updated_at
               FROM workers
               WHERE department_id = ? AND availability = 'AVAILABLE'
               ORDER BY last_assigned_at IS NOT NULL, last_assigned_at ASC"#,
        )?;
        let workers = stmt
            .query_map(params![department_id], Self::map_row)?
            .collect::<Result<Vec<Worker>, _>>()?;
        Ok(workers)
    }

    /// 更新工人可用状态
    ///
    /// # 参数
    /// - `touch_last_assigned`: 置 true 时一并刷新 last_assigned_at（派工时用）
    pub fn update_availability(
        &self,
        worker_id: &str,
        availability: WorkerAvailability,
        touch_last_assigned: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::update_availability_with_conn(&conn, worker_id, availability, touch_last_assigned)
    }

    /// 更新工人可用状态（事务内使用）
    pub fn update_availability_with_conn(
        conn: &Connection,
        worker_id: &str,
        availability: WorkerAvailability,
        touch_last_assigned: bool,
    ) -> RepositoryResult<()> {
        let now = Utc::now().naive_utc().format(TS_FMT).to_string();
        let rows_affected = if touch_last_assigned {
            conn.execute(
                "UPDATE workers SET availability = ?, last_assigned_at = ?, updated_at = ? WHERE worker_id = ?",
                params![availability.to_db_str(), &now, &now, worker_id],
            )?
        } else {
            conn.execute(
                "UPDATE workers SET availability = ?, updated_at = ? WHERE worker_id = ?",
                params![availability.to_db_str(), &now, worker_id],
            )?
        };

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Worker".to_string(),
                id: worker_id.to_string(),
            });
        }
        Ok(())
    }

    /// 行映射
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Worker> {
        let availability_str: String = row.get(3)?;
        Ok(Worker {
            worker_id: row.get(0)?,
            name: row.get(1)?,
            department_id: row.get(2)?,
            availability: WorkerAvailability::from_db_str(&availability_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("非法工人状态: {availability_str}").into(),
                )
            })?,
            last_assigned_at: row
                .get::<_, Option<String>>(4)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            created_at: parse_ts(row.get::<_, String>(5)?, 5)?,
            updated_at: parse_ts(row.get::<_, String>(6)?, 6)?,
        })
    }
}

/// 解析时间戳字段
fn parse_ts(s: String, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
