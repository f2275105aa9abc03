// ==========================================
// 生产执行引擎 - API 请求/响应结构
// ==========================================
// 职责: 对外操作的返回结构（看板 UI / 车间终端共用）
// ==========================================

use crate::domain::order::PendingExpansion;
use crate::domain::report::{ReplanAction, ReportEvent};
use crate::domain::types::OrderState;
use crate::engine::oee::OeeSnapshot;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// report_progress 响应
///
/// 报工后直接返回最新状态，调用方无需再查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProgressResponse {
    pub order_state: OrderState,
    pub oee_snapshot: OeeSnapshot,
    pub replan_action: ReplanAction,
    pub event: ReportEvent,
}

/// confirm_expansion 响应
///
/// 库存服务不可用时订单停线，replan_action 为 halt_and_finish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResponse {
    pub order_id: String,
    pub order_state: OrderState,
    pub replan_action: ReplanAction,
    pub new_planned_quantity: f64,
    pub effective_ceiling: f64,
}

/// pause 结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseOutcome {
    /// 普通暂停，计时器已暂停
    Paused {
        seq: i64,
        reason_code: String,
        started_at: NaiveDateTime,
    },
    /// 交接班，已交由交接班处理器，计时器继续
    ShiftHandoff { reason_code: String },
}

/// 订单实时状态（get_status）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub elapsed_seconds: i64,
    pub pause_seconds: i64,
    pub good: f64,
    pub waste: f64,
    pub planned_quantity: f64,
    pub effective_ceiling: f64,
    pub paused: bool,
    pub current_pause_reason: Option<String>,
    pub halted: bool,
    pub pending_expansion: Option<PendingExpansion>,
    pub oee_snapshot: OeeSnapshot,
    /// 快照计算时刻
    pub as_of: NaiveDateTime,
    /// 订单忙时返回的缓存快照
    pub from_cache: bool,
}
