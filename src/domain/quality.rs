// ==========================================
// 生产执行引擎 - 质量判定领域模型
// ==========================================
// 职责: 质检员判定输入与最终处置结果
// ==========================================

use crate::domain::types::{OrderState, QualityDecisionKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 质检员提交的判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDecision {
    pub decision: QualityDecisionKind,
    pub reject_qty: Option<f64>,
    pub quarantine_qty: Option<f64>,
    pub reason: Option<String>,
}

/// 判定后的处置结果
///
/// released + rejected + quarantined = 判定时的良品数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    pub order_id: String,
    pub decision: QualityDecisionKind,
    pub released_quantity: f64,
    pub rejected_quantity: f64,
    pub quarantined_quantity: f64,
    pub reason: Option<String>,
    pub fully_discarded: bool, // 整单报废，不入库
    pub next_state: OrderState,
    pub decided_at: NaiveDateTime,
}
