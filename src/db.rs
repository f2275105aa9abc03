// ==========================================
// 生产执行引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 启动时幂等建表，并记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

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

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 幂等建表
///
/// 已存在的表不会被修改；首次建库时写入 CURRENT_SCHEMA_VERSION
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    match read_schema_version(conn)? {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [CURRENT_SCHEMA_VERSION],
            )?;
        }
        Some(v) if v < CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                found = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema_version 低于当前版本，未执行自动迁移"
            );
        }
        Some(_) => {}
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS production_order (
    order_id TEXT PRIMARY KEY,
    product_ref TEXT NOT NULL,
    line TEXT NOT NULL,
    shift TEXT NOT NULL,
    input_ids_json TEXT NOT NULL DEFAULT '[]',
    planned_quantity REAL NOT NULL,
    target_rate REAL NOT NULL,
    max_producible_quantity REAL,
    replenished_quantity REAL NOT NULL DEFAULT 0,
    state TEXT NOT NULL,
    current_pause_reason TEXT,
    halted INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    finished_at TEXT,
    accumulated_pause_seconds INTEGER NOT NULL DEFAULT 0,
    produced_good_quantity REAL NOT NULL DEFAULT 0,
    produced_waste_quantity REAL NOT NULL DEFAULT 0,
    pending_expansion_json TEXT,
    disposition_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_production_order_state ON production_order(state);

CREATE TABLE IF NOT EXISTS pause_interval (
    order_id TEXT NOT NULL REFERENCES production_order(order_id),
    seq INTEGER NOT NULL,
    reason_code TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    PRIMARY KEY (order_id, seq)
);

CREATE TABLE IF NOT EXISTS report_event (
    event_id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL REFERENCES production_order(order_id),
    reported_at TEXT NOT NULL,
    good_delta REAL NOT NULL,
    waste_delta REAL NOT NULL,
    waste_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_report_event_order ON report_event(order_id, reported_at);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    order_id TEXT,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_action_log_order ON action_log(order_id, action_ts);
"#;
