// ==========================================
// 生产执行引擎 - 报工事件仓储
// ==========================================
// 红线: report_event 只追加，不提供更新/删除
// ==========================================

use crate::domain::report::ReportEvent;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::{fmt_ts, parse_ts};
use rusqlite::{params, Connection, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex};

pub struct ReportEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReportEventRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在调用方事务内追加报工事件（与订单计数器同一事务提交）
    pub(crate) fn insert_in_tx(tx: &Transaction, event: &ReportEvent) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO report_event (
                event_id, order_id, reported_at, good_delta, waste_delta, waste_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.event_id,
                event.order_id,
                fmt_ts(event.reported_at),
                event.good_delta,
                event.waste_delta,
                event.waste_reason,
            ],
        )?;
        Ok(())
    }

    /// 查询订单的报工事件（按时间正序）
    pub fn list_by_order(&self, order_id: &str) -> RepositoryResult<Vec<ReportEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, order_id, reported_at, good_delta, waste_delta, waste_reason
            FROM report_event
            WHERE order_id = ?1
            ORDER BY reported_at, rowid
            "#,
        )?;
        let events = stmt
            .query_map(params![order_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// 按事件汇总 (良品, 废品)
    ///
    /// 用于核对订单计数器与事件流是否一致
    pub fn totals_by_order(&self, order_id: &str) -> RepositoryResult<(f64, f64)> {
        let conn = self.get_conn()?;
        let totals = conn.query_row(
            r#"
            SELECT COALESCE(SUM(good_delta), 0), COALESCE(SUM(waste_delta), 0)
            FROM report_event
            WHERE order_id = ?1
            "#,
            params![order_id],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(totals)
    }
}

fn map_row(row: &Row) -> SqliteResult<ReportEvent> {
    Ok(ReportEvent {
        event_id: row.get(0)?,
        order_id: row.get(1)?,
        reported_at: parse_ts(row, 2)?,
        good_delta: row.get(3)?,
        waste_delta: row.get(4)?,
        waste_reason: row.get(5)?,
    })
}
