// ==========================================
// 首饰工厂订单流转系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 集中建表语句，测试与种子脚本共用同一份 schema
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化数据库 schema（幂等）
///
/// 表结构:
/// - orders: 订单聚合根
/// - tracking_record: 流转记录（订单×部门）
/// - workers: 工人目录
/// - audit_log: 审计日志（只追加）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id            TEXT PRIMARY KEY,
            order_number        TEXT NOT NULL UNIQUE,
            status              TEXT NOT NULL,
            priority            TEXT NOT NULL,
            customer_name       TEXT,
            current_department  TEXT,
            gold_weight_initial REAL NOT NULL,
            created_at          TEXT NOT NULL,
            completed_at        TEXT,
            revision            INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS tracking_record (
            tracking_id        TEXT PRIMARY KEY,
            order_id           TEXT NOT NULL REFERENCES orders(order_id) ON DELETE CASCADE,
            department_id      TEXT NOT NULL,
            sequence_order     INTEGER NOT NULL,
            status             TEXT NOT NULL,
            assigned_worker_id TEXT,
            queue_position     INTEGER,
            queued_at          TEXT,
            gold_weight_in     REAL NOT NULL,
            gold_weight_out    REAL,
            gold_loss          REAL,
            notes              TEXT,
            photos_json        TEXT NOT NULL DEFAULT '[]',
            started_at         TEXT,
            completed_at       TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            revision           INTEGER NOT NULL DEFAULT 0,
            UNIQUE(order_id, department_id)
        );

        CREATE INDEX IF NOT EXISTS idx_tracking_dept_status
            ON tracking_record(department_id, status);
        CREATE INDEX IF NOT EXISTS idx_tracking_order
            ON tracking_record(order_id, sequence_order);

        CREATE TABLE IF NOT EXISTS workers (
            worker_id        TEXT PRIMARY KEY,
            name             TEXT NOT NULL,
            department_id    TEXT NOT NULL,
            availability     TEXT NOT NULL,
            last_assigned_at TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workers_dept_availability
            ON workers(department_id, availability);

        CREATE TABLE IF NOT EXISTS audit_log (
            audit_id      TEXT PRIMARY KEY,
            event_type    TEXT NOT NULL,
            order_id      TEXT NOT NULL,
            department_id TEXT,
            worker_id     TEXT,
            payload_json  TEXT,
            occurred_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_order ON audit_log(order_id, occurred_at);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('orders','tracking_record','workers','audit_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }
}
