// ==========================================
// 生产执行引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ExecutionConfig - 执行引擎运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// 无需人工确认即可自动补料的最大缺口数量
    pub auto_replenish_ceiling: f64,
    /// 库存服务调用超时（毫秒）
    pub inventory_timeout_ms: u64,
    /// 订单忙时 get_status 可返回的缓存快照最大年龄（毫秒）
    pub status_cache_ttl_ms: u64,
    /// 运行中订单 OEE 刷新间隔（毫秒）
    pub oee_refresh_interval_ms: u64,
    /// 视为交接班的暂停原因代码
    pub shift_change_reason_codes: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_replenish_ceiling: 10.0,
            inventory_timeout_ms: 3_000,
            status_cache_ttl_ms: 500,
            oee_refresh_interval_ms: 1_000,
            shift_change_reason_codes: vec!["CAMBIO_TURNO".to_string()],
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 执行引擎配置 =====

    /// 加载执行引擎运行参数
    ///
    /// 缺失的键使用默认值；格式错误的值记录告警后使用默认值
    pub fn load_execution_config(&self) -> Result<ExecutionConfig, Box<dyn Error>> {
        let defaults = ExecutionConfig::default();

        let auto_replenish_ceiling = self
            .parse_or_default(
                config_keys::AUTO_REPLENISH_CEILING,
                defaults.auto_replenish_ceiling,
            )?
            .max(0.0);
        let inventory_timeout_ms =
            self.parse_or_default(config_keys::INVENTORY_TIMEOUT_MS, defaults.inventory_timeout_ms)?;
        let status_cache_ttl_ms =
            self.parse_or_default(config_keys::STATUS_CACHE_TTL_MS, defaults.status_cache_ttl_ms)?;
        let oee_refresh_interval_ms = self.parse_or_default(
            config_keys::OEE_REFRESH_INTERVAL_MS,
            defaults.oee_refresh_interval_ms,
        )?;

        let shift_change_reason_codes =
            match self.get_config_value(config_keys::SHIFT_CHANGE_REASON_CODES)? {
                Some(raw) => {
                    let codes: Vec<String> = raw
                        .split(',')
                        .map(|s| s.trim().to_uppercase())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if codes.is_empty() {
                        tracing::warn!(
                            config_key = config_keys::SHIFT_CHANGE_REASON_CODES,
                            raw_value = %raw,
                            "交接班原因代码配置为空，使用默认值"
                        );
                        defaults.shift_change_reason_codes
                    } else {
                        codes
                    }
                }
                None => defaults.shift_change_reason_codes,
            };

        Ok(ExecutionConfig {
            auto_replenish_ceiling,
            inventory_timeout_ms,
            status_cache_ttl_ms,
            oee_refresh_interval_ms,
            shift_change_reason_codes,
        })
    }

    fn parse_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 重排策略
    pub const AUTO_REPLENISH_CEILING: &str = "auto_replenish_ceiling";

    // 外部调用
    pub const INVENTORY_TIMEOUT_MS: &str = "inventory_timeout_ms";

    // 状态读取
    pub const STATUS_CACHE_TTL_MS: &str = "status_cache_ttl_ms";
    pub const OEE_REFRESH_INTERVAL_MS: &str = "oee_refresh_interval_ms";

    // 暂停分类（逗号分隔）
    pub const SHIFT_CHANGE_REASON_CODES: &str = "shift_change_reason_codes";
}
