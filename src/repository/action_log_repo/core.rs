use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::fmt_ts;
use rusqlite::{named_params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ActionLogRepository - 审计日志仓储
// ==========================================
// 红线: action_log 只追加，执行事件一条对应一行
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条审计日志
    ///
    /// # 返回
    /// 写入的 action_id（重复 ID 返回 UniqueConstraintViolation）
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let payload = log
            .payload_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            INSERT INTO action_log (
                action_id, order_id, action_type, action_ts, actor, payload_json, detail
            ) VALUES (
                :action_id, :order_id, :action_type, :action_ts, :actor, :payload_json, :detail
            )
            "#,
        )?;
        stmt.execute(named_params! {
            ":action_id": log.action_id,
            ":order_id": log.order_id,
            ":action_type": log.action_type,
            ":action_ts": fmt_ts(log.action_ts),
            ":actor": log.actor,
            ":payload_json": payload,
            ":detail": log.detail,
        })?;

        Ok(log.action_id.clone())
    }
}
