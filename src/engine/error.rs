// ==========================================
// 生产执行引擎 - 引擎层错误类型
// ==========================================
// 职责: 业务错误分类，所有被拒绝的变更都返回其中之一
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::{ActorRole, OrderState, ProductionLine};
use thiserror::Error;

/// 执行引擎错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// 输入缺失或格式错误（调用方修正输入即可）
    #[error("数据验证失败: {0}")]
    Validation(String),

    /// 当前计时器/订单状态不允许该操作
    #[error("当前状态不允许该操作: {0}")]
    InvalidState(String),

    #[error("角色无权执行该状态转换: role={role}, from={from} to={to}")]
    ForbiddenTransition {
        role: ActorRole,
        from: OrderState,
        to: OrderState,
    },

    #[error("产线不匹配: 订单指派产线={assigned}, 目标列={target}")]
    LineMismatch {
        assigned: ProductionLine,
        target: OrderState,
    },

    #[error("超出有效上限: attempted={attempted}, ceiling={ceiling}")]
    CapacityExceeded { attempted: f64, ceiling: f64 },

    #[error("库存已变化，不足以覆盖扩产: required={required}, available={available}")]
    StaleStock { required: f64, available: f64 },

    #[error("订单已关闭，不再接受报工: state={state}")]
    OrderClosed { state: OrderState },

    #[error("缺少质量判定，无法完成订单: order_id={order_id}")]
    MissingDecision { order_id: String },
}

impl ExecutionError {
    /// 稳定的错误代码（供前端映射）
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Validation(_) => "VALIDATION_ERROR",
            ExecutionError::InvalidState(_) => "INVALID_STATE",
            ExecutionError::ForbiddenTransition { .. } => "FORBIDDEN_TRANSITION",
            ExecutionError::LineMismatch { .. } => "LINE_MISMATCH",
            ExecutionError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            ExecutionError::StaleStock { .. } => "STALE_STOCK",
            ExecutionError::OrderClosed { .. } => "ORDER_CLOSED",
            ExecutionError::MissingDecision { .. } => "MISSING_DECISION",
        }
    }
}

/// Result 类型别名
pub type ExecutionResult<T> = Result<T, ExecutionError>;
