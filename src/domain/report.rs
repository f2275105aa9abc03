// ==========================================
// 生产执行引擎 - 报工事件与重排决策
// ==========================================
// 红线: ReportEvent 一经记录不可修改/删除（审计轨迹）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ReportEvent - 报工事件
// ==========================================
// 对齐: report_event 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub event_id: String,
    pub order_id: String,
    pub reported_at: NaiveDateTime,
    pub good_delta: f64,
    pub waste_delta: f64,
    pub waste_reason: Option<String>, // waste_delta > 0 时必填
}

// ==========================================
// ReplanAction - 重排动作
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplanAction {
    /// 未触及上限，无需处理
    Continue,
    /// 自动从库存补料，不打扰操作员
    Replenish { quantity: f64 },
    /// 需要操作员确认的扩产
    ExpandPendingConfirmation { quantity: f64 },
    /// 操作员已确认扩产
    ExpandConfirmed { quantity: f64 },
    /// 停线并转质检
    HaltAndFinish { reason: String },
}

impl ReplanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplanAction::Continue => "continue",
            ReplanAction::Replenish { .. } => "replenish",
            ReplanAction::ExpandPendingConfirmation { .. } => "expand_pending_confirmation",
            ReplanAction::ExpandConfirmed { .. } => "expand_confirmed",
            ReplanAction::HaltAndFinish { .. } => "halt_and_finish",
        }
    }
}

// ==========================================
// ReplanDecision - 重排决策记录（仅用于审计）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplanDecision {
    pub order_id: String,
    pub trigger_waste_quantity: f64,
    pub action: ReplanAction,
    pub available_stock: Option<f64>,
    /// 超出有效上限、未计入台账的废品
    #[serde(default)]
    pub unrecorded_waste_quantity: f64,
    pub decided_at: NaiveDateTime,
}
