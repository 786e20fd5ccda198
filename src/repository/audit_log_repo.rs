// ==========================================
// 首饰工厂订单流转系统 - 审计日志仓储
// ==========================================
// 红线: 审计日志只追加,不更新不删除
// ==========================================

use crate::domain::audit::AuditEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
pub struct AuditLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLogRepository {
    /// 创建新的 AuditLogRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加审计条目
    pub fn insert(&self, entry: &AuditEntry) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let payload = match &entry.payload_json {
            Some(v) => Some(
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::InternalError(e.to_string()))?,
            ),
            None => None,
        };
        conn.execute(
            r#"INSERT INTO audit_log (
                audit_id, event_type, order_id, department_id, worker_id,
                payload_json, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &entry.audit_id,
                &entry.event_type,
                &entry.order_id,
                &entry.department_id,
                &entry.worker_id,
                payload,
                entry.occurred_at.format(TS_FMT).to_string(),
            ],
        )?;
        Ok(entry.audit_id.clone())
    }

    /// 查询订单的审计轨迹（按时间升序）
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT audit_id, event_type, order_id, department_id, worker_id,
                      payload_json, occurred_at
               FROM audit_log WHERE order_id = ? ORDER BY occurred_at ASC, audit_id ASC"#,
        )?;
        let entries = stmt
            .query_map(params![order_id], Self::map_row)?
            .collect::<Result<Vec<AuditEntry>, _>>()?;
        Ok(entries)
    }

    /// 行映射
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
        let payload: Option<String> = row.get(5)?;
        Ok(AuditEntry {
            audit_id: row.get(0)?,
            event_type: row.get(1)?,
            order_id: row.get(2)?,
            department_id: row.get(3)?,
            worker_id: row.get(4)?,
            payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
            occurred_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(6)?, TS_FMT)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        })
    }
}
