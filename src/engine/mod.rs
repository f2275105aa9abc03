// ==========================================
// 生产执行引擎 - 引擎层
// ==========================================
// 职责: 计时、台账、OEE、状态机、重排、质检规则
// 红线: Engine 不拼 SQL, 所有拒绝都返回带原因的错误
// ==========================================

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod ledger;
pub mod oee;
pub mod quality;
pub mod replan;
pub mod state_machine;
pub mod timer;

// 重导出核心引擎
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    limiting_stock, CollaboratorError, DefaultRolePolicy, InMemoryInventory, InventoryService,
    NoOpShiftTransfer, RoleResolver, ShiftTransferHandler, TransitionEdge,
};
pub use error::{ExecutionError, ExecutionResult};
pub use events::{EventFanout, ExecutionEvent, ExecutionEventSink, NoOpEventSink};
pub use ledger::ProductionLedger;
pub use oee::{OeeCalculator, OeeInput, OeeSnapshot};
pub use quality::QualityDecisionProcessor;
pub use replan::ReplanPolicyEngine;
pub use state_machine::{OrderStateMachine, PauseKind};
pub use timer::ProductionTimer;
