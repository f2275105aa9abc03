// ==========================================
// 生产执行引擎 - 生产订单仓储
// ==========================================
// 职责: production_order / pause_interval 的读写，订单聚合整体落库
// 红线: Repository 不做业务逻辑,只做数据映射
// 红线: 一次变更（订单行 + 暂停区间 + 报工事件）在同一事务内提交
// ==========================================

use crate::domain::order::{OrderAggregate, PauseInterval, PendingExpansion, ProductionOrder};
use crate::domain::quality::Disposition;
use crate::domain::report::ReportEvent;
use crate::domain::types::{OrderState, ProductionLine};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::report_repo::ReportEventRepository;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex};

pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ORDER_COLUMNS: &str = r#"
    order_id, product_ref, line, shift, input_ids_json,
    planned_quantity, target_rate, max_producible_quantity, replenished_quantity,
    state, current_pause_reason, halted,
    started_at, finished_at, accumulated_pause_seconds,
    produced_good_quantity, produced_waste_quantity,
    pending_expansion_json, disposition_json,
    created_at, updated_at
"#;

/// 订单行 + 聚合附属字段
struct OrderRow {
    order: ProductionOrder,
    pending_expansion_json: Option<String>,
    disposition_json: Option<String>,
}

// ==========================================
// ProductionOrderRepository - 生产订单仓储
// ==========================================
pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 接入新订单
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: order_id 已存在
    pub fn insert_new(&self, agg: &OrderAggregate) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO production_order ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                ORDER_COLUMNS
            ),
            params![
                agg.order.order_id,
                agg.order.product_ref,
                agg.order.line.to_db_str(),
                agg.order.shift,
                serde_json::to_string(&agg.order.input_ids)?,
                agg.order.planned_quantity,
                agg.order.target_rate,
                agg.order.max_producible_quantity,
                agg.order.replenished_quantity,
                agg.order.state.to_db_str(),
                agg.order.current_pause_reason,
                agg.order.halted,
                fmt_opt_ts(agg.order.started_at),
                fmt_opt_ts(agg.order.finished_at),
                agg.order.accumulated_pause_seconds,
                agg.order.produced_good_quantity,
                agg.order.produced_waste_quantity,
                opt_json(&agg.pending_expansion)?,
                opt_json(&agg.disposition)?,
                fmt_ts(agg.order.created_at),
                fmt_ts(agg.order.updated_at),
            ],
        )?;
        Self::replace_pauses(&tx, agg)?;
        tx.commit()?;
        Ok(())
    }

    /// 聚合整体落库（可附带一条报工事件）
    ///
    /// 要么全部提交，要么全部不生效
    pub fn persist(
        &self,
        agg: &OrderAggregate,
        report: Option<&ReportEvent>,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            r#"
            UPDATE production_order SET
                product_ref = ?2, line = ?3, shift = ?4, input_ids_json = ?5,
                planned_quantity = ?6, target_rate = ?7, max_producible_quantity = ?8,
                replenished_quantity = ?9, state = ?10, current_pause_reason = ?11,
                halted = ?12, started_at = ?13, finished_at = ?14,
                accumulated_pause_seconds = ?15, produced_good_quantity = ?16,
                produced_waste_quantity = ?17, pending_expansion_json = ?18,
                disposition_json = ?19, updated_at = ?20
            WHERE order_id = ?1
            "#,
            params![
                agg.order.order_id,
                agg.order.product_ref,
                agg.order.line.to_db_str(),
                agg.order.shift,
                serde_json::to_string(&agg.order.input_ids)?,
                agg.order.planned_quantity,
                agg.order.target_rate,
                agg.order.max_producible_quantity,
                agg.order.replenished_quantity,
                agg.order.state.to_db_str(),
                agg.order.current_pause_reason,
                agg.order.halted,
                fmt_opt_ts(agg.order.started_at),
                fmt_opt_ts(agg.order.finished_at),
                agg.order.accumulated_pause_seconds,
                agg.order.produced_good_quantity,
                agg.order.produced_waste_quantity,
                opt_json(&agg.pending_expansion)?,
                opt_json(&agg.disposition)?,
                fmt_ts(agg.order.updated_at),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: agg.order.order_id.clone(),
            });
        }

        Self::replace_pauses(&tx, agg)?;
        if let Some(event) = report {
            ReportEventRepository::insert_in_tx(&tx, event)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_pauses(tx: &Transaction, agg: &OrderAggregate) -> RepositoryResult<()> {
        tx.execute(
            "DELETE FROM pause_interval WHERE order_id = ?1",
            params![agg.order.order_id],
        )?;
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO pause_interval (order_id, seq, reason_code, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for pause in &agg.pauses {
            stmt.execute(params![
                pause.order_id,
                pause.seq,
                pause.reason_code,
                fmt_ts(pause.started_at),
                fmt_opt_ts(pause.ended_at),
            ])?;
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 order_id 加载订单聚合
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<OrderAggregate>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM production_order WHERE order_id = ?1",
                    ORDER_COLUMNS
                ),
                params![order_id],
                map_order_row,
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(Self::load_aggregate(&conn, row)?)),
            None => Ok(None),
        }
    }

    /// 加载所有未进入终态的订单聚合（启动恢复用）
    pub fn find_open(&self) -> RepositoryResult<Vec<OrderAggregate>> {
        let conn = self.get_conn()?;
        let rows = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM production_order WHERE state NOT IN (?1, ?2) ORDER BY created_at, order_id",
                ORDER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        OrderState::Completed.to_db_str(),
                        OrderState::Discarded.to_db_str()
                    ],
                    map_order_row,
                )?
                .collect::<SqliteResult<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|row| Self::load_aggregate(&conn, row))
            .collect()
    }

    /// 列出全部订单（可按状态过滤）
    pub fn list_all(&self, state: Option<OrderState>) -> RepositoryResult<Vec<ProductionOrder>> {
        let conn = self.get_conn()?;
        let rows = match state {
            Some(state) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM production_order WHERE state = ?1 ORDER BY created_at, order_id",
                    ORDER_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![state.to_db_str()], map_order_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM production_order ORDER BY created_at, order_id",
                    ORDER_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], map_order_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows.into_iter().map(|r| r.order).collect())
    }

    fn load_aggregate(conn: &Connection, row: OrderRow) -> RepositoryResult<OrderAggregate> {
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, seq, reason_code, started_at, ended_at
            FROM pause_interval
            WHERE order_id = ?1
            ORDER BY seq
            "#,
        )?;
        let pauses = stmt
            .query_map(params![row.order.order_id], map_pause_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        let pending_expansion: Option<PendingExpansion> = row
            .pending_expansion_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let disposition: Option<Disposition> = row
            .disposition_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(OrderAggregate {
            order: row.order,
            pauses,
            pending_expansion,
            disposition,
        })
    }
}

// ==========================================
// 行映射
// ==========================================

fn map_order_row(row: &Row) -> SqliteResult<OrderRow> {
    let line_str: String = row.get(2)?;
    let line = ProductionLine::from_str(&line_str)
        .ok_or_else(|| conversion_error(2, format!("未知产线: {}", line_str)))?;
    let input_ids_json: String = row.get(4)?;
    let input_ids: Vec<String> = serde_json::from_str(&input_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let state_str: String = row.get(9)?;
    let state = OrderState::from_str(&state_str)
        .ok_or_else(|| conversion_error(9, format!("未知订单状态: {}", state_str)))?;

    let order = ProductionOrder {
        order_id: row.get(0)?,
        product_ref: row.get(1)?,
        line,
        shift: row.get(3)?,
        input_ids,
        planned_quantity: row.get(5)?,
        target_rate: row.get(6)?,
        max_producible_quantity: row.get(7)?,
        replenished_quantity: row.get(8)?,
        state,
        current_pause_reason: row.get(10)?,
        halted: row.get(11)?,
        started_at: parse_opt_ts(row, 12)?,
        finished_at: parse_opt_ts(row, 13)?,
        accumulated_pause_seconds: row.get(14)?,
        produced_good_quantity: row.get(15)?,
        produced_waste_quantity: row.get(16)?,
        created_at: parse_ts(row, 19)?,
        updated_at: parse_ts(row, 20)?,
    };

    Ok(OrderRow {
        order,
        pending_expansion_json: row.get(17)?,
        disposition_json: row.get(18)?,
    })
}

fn map_pause_row(row: &Row) -> SqliteResult<PauseInterval> {
    Ok(PauseInterval {
        order_id: row.get(0)?,
        seq: row.get(1)?,
        reason_code: row.get(2)?,
        started_at: parse_ts(row, 3)?,
        ended_at: parse_opt_ts(row, 4)?,
    })
}

pub(crate) fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn fmt_opt_ts(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(fmt_ts)
}

pub(crate) fn parse_ts(row: &Row, idx: usize) -> SqliteResult<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(row: &Row, idx: usize) -> SqliteResult<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, TS_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn opt_json<T: serde::Serialize>(value: &Option<T>) -> RepositoryResult<Option<String>> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}
