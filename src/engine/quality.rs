// ==========================================
// 生产执行引擎 - 质量判定处理器
// ==========================================
// 职责: 校验质检员判定，计算放行/拒收/隔离数量与下一状态
// 红线: 校验失败不产生任何变更
// 决策: MIXTO 要求拒收与隔离数量均严格大于 0
// ==========================================

use crate::domain::order::OrderAggregate;
use crate::domain::quality::{Disposition, QualityDecision};
use crate::domain::types::{OrderState, QualityDecisionKind};
use crate::engine::error::{ExecutionError, ExecutionResult};
use chrono::NaiveDateTime;

/// 质量判定处理器
#[derive(Debug, Clone, Default)]
pub struct QualityDecisionProcessor;

impl QualityDecisionProcessor {
    pub fn new() -> Self {
        Self
    }

    /// 校验判定并生成处置结果（不修改聚合）
    pub fn evaluate(
        &self,
        agg: &OrderAggregate,
        decision: &QualityDecision,
        now: NaiveDateTime,
    ) -> ExecutionResult<Disposition> {
        if agg.order.state != OrderState::QualityControl {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}不在质检状态，不能提交质量判定 (state={})",
                agg.order.order_id, agg.order.state
            )));
        }
        if agg.disposition.is_some() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}已有质量判定",
                agg.order.order_id
            )));
        }

        let good = agg.order.produced_good_quantity;
        let kind = decision.decision;
        let reason = Self::validate_reason(kind, decision.reason.as_deref())?;
        let reject = Self::finite_or_zero("reject_qty", decision.reject_qty)?;
        let quarantine = Self::finite_or_zero("quarantine_qty", decision.quarantine_qty)?;

        match kind {
            QualityDecisionKind::Approved => {
                if reject != 0.0 || quarantine != 0.0 {
                    return Err(ExecutionError::Validation(
                        "APPROVED 判定不能携带拒收或隔离数量".to_string(),
                    ));
                }
            }
            QualityDecisionKind::PartialReject => {
                Self::require_present("reject_qty", decision.reject_qty)?;
                Self::validate_reject(reject, good)?;
                if quarantine != 0.0 {
                    return Err(ExecutionError::Validation(
                        "RECHAZO_PARCIAL 判定不能携带隔离数量".to_string(),
                    ));
                }
            }
            QualityDecisionKind::PartialQuarantine => {
                Self::require_present("quarantine_qty", decision.quarantine_qty)?;
                Self::validate_quarantine(quarantine, good)?;
                if reject != 0.0 {
                    return Err(ExecutionError::Validation(
                        "CUARENTENA_PARCIAL 判定不能携带拒收数量".to_string(),
                    ));
                }
            }
            QualityDecisionKind::Mixed => {
                Self::require_present("reject_qty", decision.reject_qty)?;
                Self::require_present("quarantine_qty", decision.quarantine_qty)?;
                Self::validate_reject(reject, good)?;
                Self::validate_quarantine(quarantine, good)?;
                if reject + quarantine > good {
                    return Err(ExecutionError::Validation(format!(
                        "拒收与隔离合计({})超过良品数量({})",
                        reject + quarantine,
                        good
                    )));
                }
            }
        }

        let fully_discarded = kind.involves_reject() && reject >= good;
        let next_state = if fully_discarded {
            OrderState::Discarded
        } else {
            OrderState::Completed
        };

        Ok(Disposition {
            order_id: agg.order.order_id.clone(),
            decision: kind,
            released_quantity: (good - reject - quarantine).max(0.0),
            rejected_quantity: reject,
            quarantined_quantity: quarantine,
            reason,
            fully_discarded,
            next_state,
            decided_at: now,
        })
    }

    // ==========================================
    // 校验辅助
    // ==========================================

    fn validate_reason(
        kind: QualityDecisionKind,
        reason: Option<&str>,
    ) -> ExecutionResult<Option<String>> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        match (kind, reason) {
            (QualityDecisionKind::Approved, r) => Ok(r.map(str::to_string)),
            (_, Some(r)) => Ok(Some(r.to_string())),
            (_, None) => Err(ExecutionError::Validation(format!(
                "{} 判定必须填写原因",
                kind
            ))),
        }
    }

    fn finite_or_zero(field: &str, value: Option<f64>) -> ExecutionResult<f64> {
        match value {
            None => Ok(0.0),
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            Some(v) => Err(ExecutionError::Validation(format!(
                "{} 必须为非负有效数字: {}",
                field, v
            ))),
        }
    }

    fn require_present(field: &str, value: Option<f64>) -> ExecutionResult<()> {
        if value.is_none() {
            return Err(ExecutionError::Validation(format!("缺少 {}", field)));
        }
        Ok(())
    }

    fn validate_reject(reject: f64, good: f64) -> ExecutionResult<()> {
        if reject.fract() != 0.0 {
            return Err(ExecutionError::Validation(format!(
                "reject_qty 必须为整数: {}",
                reject
            )));
        }
        if reject < 1.0 || reject > good {
            return Err(ExecutionError::Validation(format!(
                "reject_qty 必须在 1 与良品数量({})之间: {}",
                good, reject
            )));
        }
        Ok(())
    }

    fn validate_quarantine(quarantine: f64, good: f64) -> ExecutionResult<()> {
        if quarantine <= 0.0 || quarantine > good {
            return Err(ExecutionError::Validation(format!(
                "quarantine_qty 必须大于0且不超过良品数量({}): {}",
                good, quarantine
            )));
        }
        Ok(())
    }
}
