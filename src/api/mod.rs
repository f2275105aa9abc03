// ==========================================
// 生产执行引擎 - API 层
// ==========================================
// 职责: 对外业务接口，连接车间终端/看板 UI 与引擎
// 红线: API 不拼 SQL，错误一律转换为 ApiError
// ==========================================

pub mod dto;
pub mod error;
pub mod execution_api;

pub use dto::{ExpansionResponse, OrderStatus, PauseOutcome, ReportProgressResponse};
pub use error::{ApiError, ApiResult, RejectionContext};
pub use execution_api::{ExecutionApi, ExecutionCollaborators};
