// ==========================================
// 首饰工厂订单流转系统 - 流转记录仓储
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 持久化接口
// 依据: 并发控制设计（状态+revision 双条件 CAS）
// 红线: Repository 不含业务逻辑,状态迁移合法性由引擎判定
// ==========================================

use crate::domain::tracking::TrackingRecord;
use crate::domain::types::TrackingStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const SELECT_COLUMNS: &str = r#"tracking_id, order_id, department_id, sequence_order,
    status, assigned_worker_id, queue_position, queued_at,
    gold_weight_in, gold_weight_out, gold_loss, notes, photos_json,
    started_at, completed_at, created_at, updated_at, revision"#;

// ==========================================
// TrackingRecordRepository - 流转记录仓储
// ==========================================
pub struct TrackingRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TrackingRecordRepository {
    /// 创建新的 TrackingRecordRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建流转记录
    pub fn create(&self, record: &TrackingRecord) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_with_conn(&conn, record)
    }

    /// 创建流转记录（事务内使用）
    pub fn insert_with_conn(conn: &Connection, record: &TrackingRecord) -> RepositoryResult<String> {
        let photos_json = serde_json::to_string(&record.photos)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        conn.execute(
            r#"INSERT INTO tracking_record (
                tracking_id, order_id, department_id, sequence_order,
                status, assigned_worker_id, queue_position, queued_at,
                gold_weight_in, gold_weight_out, gold_loss, notes, photos_json,
                started_at, completed_at, created_at, updated_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &record.tracking_id,
                &record.order_id,
                &record.department_id,
                record.sequence_order,
                record.status.to_db_str(),
                &record.assigned_worker_id,
                record.queue_position,
                record.queued_at.map(|t| t.format(TS_FMT).to_string()),
                record.gold_weight_in,
                record.gold_weight_out,
                record.gold_loss,
                &record.notes,
                photos_json,
                record.started_at.map(|t| t.format(TS_FMT).to_string()),
                record.completed_at.map(|t| t.format(TS_FMT).to_string()),
                record.created_at.format(TS_FMT).to_string(),
                record.updated_at.format(TS_FMT).to_string(),
                record.revision,
            ],
        )?;
        Ok(record.tracking_id.clone())
    }

    /// 按 tracking_id 查询
    pub fn find_by_id(&self, tracking_id: &str) -> RepositoryResult<Option<TrackingRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_id_with_conn(&conn, tracking_id)
    }

    /// 按 tracking_id 查询（事务内使用）
    pub fn find_by_id_with_conn(
        conn: &Connection,
        tracking_id: &str,
    ) -> RepositoryResult<Option<TrackingRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tracking_record WHERE tracking_id = ?"
        );
        match conn.query_row(&sql, params![tracking_id], Self::map_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询订单的全部流转记录（按流水线序号升序）
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<TrackingRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_order_with_conn(&conn, order_id)
    }

    /// 查询订单的全部流转记录（事务内使用）
    pub fn find_by_order_with_conn(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Vec<TrackingRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tracking_record WHERE order_id = ? ORDER BY sequence_order ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![order_id], Self::map_row)?
            .collect::<Result<Vec<TrackingRecord>, _>>()?;
        Ok(records)
    }

    /// 查询订单在指定部门的流转记录
    pub fn find_by_order_and_department(
        &self,
        order_id: &str,
        department_id: &str,
    ) -> RepositoryResult<Option<TrackingRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tracking_record WHERE order_id = ? AND department_id = ?"
        );
        match conn.query_row(&sql, params![order_id, department_id], Self::map_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询部门待派工队列（queue_position 升序, 入队时间升序兜底）
    pub fn list_pending(&self, department_id: &str) -> RepositoryResult<Vec<TrackingRecord>> {
        let conn = self.get_conn()?;
        Self::list_pending_with_conn(&conn, department_id)
    }

    /// 查询部门待派工队列（事务内使用）
    pub fn list_pending_with_conn(
        conn: &Connection,
        department_id: &str,
    ) -> RepositoryResult<Vec<TrackingRecord>> {
        let sql = format!(
            r#"SELECT {SELECT_COLUMNS} FROM tracking_record
               WHERE department_id = ? AND status = 'PENDING_ASSIGNMENT'
                 AND assigned_worker_id IS NULL
               ORDER BY queue_position ASC, queued_at ASC"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![department_id], Self::map_row)?
            .collect::<Result<Vec<TrackingRecord>, _>>()?;
        Ok(records)
    }

    /// 按派工序查询部门待派工记录 id 与当前队列位置（事务内使用）
    ///
    /// 派工序: 订单优先级降序, 入队时间升序, 创建时间升序兜底
    /// Reindex 按此顺序重写 queue_position,位置未变的记录不动
    pub fn list_pending_by_dispatch_order_with_conn(
        conn: &Connection,
        department_id: &str,
    ) -> RepositoryResult<Vec<(String, Option<u32>)>> {
        let mut stmt = conn.prepare(
            r#"SELECT t.tracking_id, t.queue_position
               FROM tracking_record t
               JOIN orders o ON o.order_id = t.order_id
               WHERE t.department_id = ? AND t.status = 'PENDING_ASSIGNMENT'
                 AND t.assigned_worker_id IS NULL
               ORDER BY CASE o.priority
                            WHEN 'URGENT' THEN 3
                            WHEN 'HIGH' THEN 2
                            WHEN 'NORMAL' THEN 1
                            ELSE 0
                        END DESC,
                        t.queued_at ASC,
                        t.created_at ASC"#,
        )?;
        let rows = stmt
            .query_map(params![department_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<u32>>(1)?))
            })?
            .collect::<Result<Vec<(String, Option<u32>)>, _>>()?;
        Ok(rows)
    }

    /// 统计部门待派工数量（事务内使用）
    pub fn count_pending_with_conn(
        conn: &Connection,
        department_id: &str,
    ) -> RepositoryResult<u32> {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM tracking_record WHERE department_id = ? AND status = 'PENDING_ASSIGNMENT' AND assigned_worker_id IS NULL",
            params![department_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 查询工人在手的加工中记录（单派工不变量检查用）
    pub fn find_in_progress_by_worker(
        &self,
        worker_id: &str,
    ) -> RepositoryResult<Vec<TrackingRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {SELECT_COLUMNS} FROM tracking_record
               WHERE assigned_worker_id = ? AND status = 'IN_PROGRESS'"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![worker_id], Self::map_row)?
            .collect::<Result<Vec<TrackingRecord>, _>>()?;
        Ok(records)
    }

    /// 更新流转记录 (状态+revision 双条件 CAS)
    ///
    /// 以 `expected_status` 和 `record.revision` 为 CAS 条件写入全部可变字段。
    /// 命中后 revision 自增；内存中的 `record.revision` 不变，调用方需要时重新加载。
    ///
    /// # 并发控制
    /// 读取旧状态 → 条件写入新状态；任何并发修改都会使条件落空
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: 状态或 revision 已被并发修改
    /// - `RepositoryError::NotFound`: tracking_id 不存在
    pub fn update_with_cas(
        &self,
        record: &TrackingRecord,
        expected_status: TrackingStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::update_with_cas_conn(&conn, record, expected_status)
    }

    /// 更新流转记录（事务内使用，CAS 同上）
    pub fn update_with_cas_conn(
        conn: &Connection,
        record: &TrackingRecord,
        expected_status: TrackingStatus,
    ) -> RepositoryResult<()> {
        let photos_json = serde_json::to_string(&record.photos)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        let rows_affected = conn.execute(
            r#"UPDATE tracking_record
               SET status = ?, assigned_worker_id = ?, queue_position = ?, queued_at = ?,
                   gold_weight_out = ?, gold_loss = ?, notes = ?, photos_json = ?,
                   started_at = ?, completed_at = ?, updated_at = ?, revision = revision + 1
               WHERE tracking_id = ? AND status = ? AND revision = ?"#,
            params![
                record.status.to_db_str(),
                &record.assigned_worker_id,
                record.queue_position,
                record.queued_at.map(|t| t.format(TS_FMT).to_string()),
                record.gold_weight_out,
                record.gold_loss,
                &record.notes,
                photos_json,
                record.started_at.map(|t| t.format(TS_FMT).to_string()),
                record.completed_at.map(|t| t.format(TS_FMT).to_string()),
                Utc::now().naive_utc().format(TS_FMT).to_string(),
                &record.tracking_id,
                expected_status.to_db_str(),
                record.revision,
            ],
        )?;

        if rows_affected == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM tracking_record WHERE tracking_id = ?",
                    params![&record.tracking_id],
                    |_row| Ok(true),
                )
                .unwrap_or(false);
            if exists {
                return Err(RepositoryError::OptimisticLockFailure {
                    entity: "TrackingRecord".to_string(),
                    id: record.tracking_id.clone(),
                    expected_revision: record.revision,
                });
            }
            return Err(RepositoryError::NotFound {
                entity: "TrackingRecord".to_string(),
                id: record.tracking_id.clone(),
            });
        }
        Ok(())
    }

    /// 重写队列位置（事务内使用，仅作用于待派工记录）
    ///
    /// Reindex 专用：不走状态 CAS，但 revision 照常自增，
    /// 使持有旧快照的并发迁移在 CAS 处落空。
    pub fn set_queue_position_with_conn(
        conn: &Connection,
        tracking_id: &str,
        queue_position: u32,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE tracking_record
               SET queue_position = ?, updated_at = ?, revision = revision + 1
               WHERE tracking_id = ? AND status = 'PENDING_ASSIGNMENT'
                 AND assigned_worker_id IS NULL"#,
            params![
                queue_position,
                Utc::now().naive_utc().format(TS_FMT).to_string(),
                tracking_id,
            ],
        )?;
        if rows_affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TrackingRecord(PENDING_ASSIGNMENT)".to_string(),
                id: tracking_id.to_string(),
            });
        }
        Ok(())
    }

    /// 行映射
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<TrackingRecord> {
        let status_str: String = row.get(4)?;
        let photos_json: String = row.get(12)?;
        Ok(TrackingRecord {
            tracking_id: row.get(0)?,
            order_id: row.get(1)?,
            department_id: row.get(2)?,
            sequence_order: row.get(3)?,
            status: TrackingStatus::from_db_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("非法流转状态: {status_str}").into(),
                )
            })?,
            assigned_worker_id: row.get(5)?,
            queue_position: row.get(6)?,
            queued_at: row
                .get::<_, Option<String>>(7)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            gold_weight_in: row.get(8)?,
            gold_weight_out: row.get(9)?,
            gold_loss: row.get(10)?,
            notes: row.get(11)?,
            photos: serde_json::from_str(&photos_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            started_at: row
                .get::<_, Option<String>>(13)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            completed_at: row
                .get::<_, Option<String>>(14)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            created_at: parse_ts(row.get::<_, String>(15)?, 15)?,
            updated_at: parse_ts(row.get::<_, String>(16)?, 16)?,
            revision: row.get(17)?,
        })
    }
}

/// 解析时间戳字段
fn parse_ts(s: String, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
