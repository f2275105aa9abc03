// ==========================================
// 生产执行引擎 - 核心库
// ==========================================
// 职责: 生产订单执行状态机 + 实时绩效（计时、产量台账、OEE）
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 车间执行层（看板 UI / 车间终端的后端）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ActorRole, OrderState, ProductionLine, QualityDecisionKind};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Disposition, NewProductionOrder, OrderAggregate, PauseInterval,
    PendingExpansion, ProductionOrder, QualityDecision, ReplanAction, ReplanDecision, ReportEvent,
};

// 引擎
pub use engine::{
    Clock, ExecutionError, InMemoryInventory, InventoryService, ManualClock, OeeCalculator,
    OeeSnapshot, OrderStateMachine, ProductionLedger, ProductionTimer, QualityDecisionProcessor,
    ReplanPolicyEngine, RoleResolver, ShiftTransferHandler, SystemClock,
};

// API
pub use api::{ApiError, ExecutionApi, ExecutionCollaborators, OrderStatus};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产订单执行引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
