// ==========================================
// 生产执行引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ExecutionApi, ExecutionCollaborators};
use crate::config::{ConfigManager, ExecutionConfig};
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::repository::{
    action_log_repo::{ActionLogRepository, ActionLogSink},
    order_repo::ProductionOrderRepository,
    report_repo::ReportEventRepository,
};

/// 应用状态
///
/// 包含执行 API 和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效中的执行配置
    pub config: ExecutionConfig,

    /// 执行 API
    pub execution_api: Arc<ExecutionApi>,

    /// 配置管理器（运维调整参数，重启后生效）
    pub config_manager: Arc<ConfigManager>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - collaborators: 外部协作方（库存、角色、交接班、事件接收方、时钟）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并幂等建表
    /// 2. 读取执行配置
    /// 3. 初始化所有Repository
    /// 4. 创建执行 API（恢复未结束订单）
    pub fn new(db_path: String, collaborators: ExecutionCollaborators) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = config_manager
            .load_execution_config()
            .map_err(|e| format!("无法读取执行配置: {}", e))?;
        tracing::info!(
            auto_replenish_ceiling = config.auto_replenish_ceiling,
            inventory_timeout_ms = config.inventory_timeout_ms,
            shift_change_reason_codes = ?config.shift_change_reason_codes,
            "执行配置已加载"
        );

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let order_repo = Arc::new(ProductionOrderRepository::new(conn.clone()));
        let report_repo = Arc::new(ReportEventRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn));

        // 审计日志始终作为事件接收方之一
        let collaborators = collaborators
            .with_event_sink(Arc::new(ActionLogSink::new(action_log_repo.clone())));

        let execution_api = Arc::new(
            ExecutionApi::new(
                order_repo,
                report_repo,
                action_log_repo.clone(),
                config.clone(),
                collaborators,
            )
            .map_err(|e| format!("无法创建ExecutionApi: {}", e))?,
        );

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            execution_api,
            config_manager,
            action_log_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 MES_EXECUTION_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MES_EXECUTION_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./mes_execution.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("mes-execution");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("mes_execution.db");
        }
    }

    path.to_string_lossy().to_string()
}
