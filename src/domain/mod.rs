// ==========================================
// 生产执行引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod order;
pub mod quality;
pub mod report;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use order::{
    NewProductionOrder, OrderAggregate, PauseInterval, PendingExpansion, ProductionOrder,
};
pub use quality::{Disposition, QualityDecision};
pub use report::{ReplanAction, ReplanDecision, ReportEvent};
pub use types::{ActorRole, OrderState, ProductionLine, QualityDecisionKind};
