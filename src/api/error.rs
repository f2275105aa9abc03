// ==========================================
// 生产执行引擎 - API层错误类型
// ==========================================
// 职责: 业务拒绝携带订单上下文；仓储错误转换为调用方可理解的错误
// 红线: 所有错误信息必须包含显式原因
// ==========================================

use crate::domain::order::OrderAggregate;
use crate::domain::types::OrderState;
use crate::engine::error::ExecutionError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// 拒绝上下文
// ==========================================

/// 被拒绝时订单的当前状态，供 UI 对账
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionContext {
    pub order_id: String,
    pub state: OrderState,
    pub produced_good_quantity: f64,
    pub produced_waste_quantity: f64,
    pub effective_ceiling: f64,
    pub paused: bool,
    pub halted: bool,
}

impl RejectionContext {
    pub fn from_aggregate(agg: &OrderAggregate) -> Self {
        Self {
            order_id: agg.order.order_id.clone(),
            state: agg.order.state,
            produced_good_quantity: agg.order.produced_good_quantity,
            produced_waste_quantity: agg.order.produced_waste_quantity,
            effective_ceiling: agg.order.effective_ceiling(),
            paused: agg.is_paused(),
            halted: agg.order.halted,
        }
    }
}

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务拒绝（订单状态未改变）
    // ==========================================
    #[error("{error} (order_id={}, state={})", .context.order_id, .context.state)]
    Rejected {
        #[source]
        error: ExecutionError,
        context: Box<RejectionContext>,
    },

    // ==========================================
    // 请求错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 业务拒绝
    pub fn rejected(error: ExecutionError, agg: &OrderAggregate) -> Self {
        ApiError::Rejected {
            error,
            context: Box::new(RejectionContext::from_aggregate(agg)),
        }
    }

    /// 业务拒绝时的底层错误
    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            ApiError::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }

    /// 业务拒绝时的订单上下文
    pub fn context(&self) -> Option<&RejectionContext> {
        match self {
            ApiError::Rejected { context, .. } => Some(context.as_ref()),
            _ => None,
        }
    }

    /// 稳定的错误代码（供 UI 分支处理）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Rejected { error, .. } => error.code(),
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CorruptRecord { column, message } => {
                ApiError::DatabaseError(format!("存储记录损坏(第{}列): {}", column, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
