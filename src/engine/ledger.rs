// ==========================================
// 生产执行引擎 - 产量台账
// ==========================================
// 职责: 报工校验、良品/废品累计
// 红线: 先校验后写入（拒绝而不是回滚）
// 红线: 累计产出不得超过有效上限
// ==========================================

use crate::domain::order::OrderAggregate;
use crate::domain::report::ReportEvent;
use crate::domain::types::OrderState;
use crate::engine::error::{ExecutionError, ExecutionResult};
use chrono::NaiveDateTime;
use uuid::Uuid;

/// 浮点比较容差
const QUANTITY_EPSILON: f64 = 1e-9;

/// 产量台账
#[derive(Debug, Clone, Default)]
pub struct ProductionLedger;

impl ProductionLedger {
    pub fn new() -> Self {
        Self
    }

    /// 记录一次报工
    ///
    /// # 参数
    /// - `good_delta`: 本次良品数量 (≥ 0)
    /// - `waste_delta`: 本次废品数量 (≥ 0)
    /// - `waste_reason`: 废品原因，waste_delta > 0 时必填
    ///
    /// # 返回
    /// - `Ok(ReportEvent)`: 已累加到计数器的报工事件（由调用方持久化）
    /// - `Err(...)`: 校验失败，聚合未被修改
    pub fn report(
        &self,
        agg: &mut OrderAggregate,
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<&str>,
        now: NaiveDateTime,
    ) -> ExecutionResult<ReportEvent> {
        let waste_reason = Self::validate_deltas(good_delta, waste_delta, waste_reason)?;
        Self::ensure_accepting_reports(agg)?;

        let attempted = agg.order.cumulative_output() + good_delta + waste_delta;
        let ceiling = agg.order.effective_ceiling();
        if attempted > ceiling + QUANTITY_EPSILON {
            return Err(ExecutionError::CapacityExceeded { attempted, ceiling });
        }

        Ok(Self::record(agg, good_delta, waste_delta, waste_reason, now))
    }

    /// 本次废品超出有效上限的数量
    ///
    /// 良品本身已超限时返回 CapacityExceeded（良品超产不进入废品重排）
    pub fn waste_overflow(
        &self,
        agg: &OrderAggregate,
        good_delta: f64,
        waste_delta: f64,
    ) -> ExecutionResult<f64> {
        let order = &agg.order;
        let ceiling = order.effective_ceiling();
        let with_good = order.cumulative_output() + good_delta;
        if with_good > ceiling + QUANTITY_EPSILON {
            return Err(ExecutionError::CapacityExceeded {
                attempted: with_good + waste_delta,
                ceiling,
            });
        }
        Ok((with_good + waste_delta - ceiling).max(0.0))
    }

    /// 封顶报工: 良品全部计入，废品只计入到有效上限为止
    ///
    /// # 返回
    /// (实际计入的报工事件, 未计入的废品数量)
    pub fn report_capped(
        &self,
        agg: &mut OrderAggregate,
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<&str>,
        now: NaiveDateTime,
    ) -> ExecutionResult<(ReportEvent, f64)> {
        let waste_reason = Self::validate_deltas(good_delta, waste_delta, waste_reason)?;
        Self::ensure_accepting_reports(agg)?;

        let overflow = self.waste_overflow(agg, good_delta, waste_delta)?;
        let recorded_waste = (waste_delta - overflow).max(0.0);
        let waste_reason = if recorded_waste > 0.0 { waste_reason } else { None };

        let event = Self::record(agg, good_delta, recorded_waste, waste_reason, now);
        Ok((event, overflow))
    }

    /// 累计 (良品, 废品)
    pub fn totals(&self, agg: &OrderAggregate) -> (f64, f64) {
        (
            agg.order.produced_good_quantity,
            agg.order.produced_waste_quantity,
        )
    }

    /// 订单是否已停止接受报工
    pub fn is_closed(agg: &OrderAggregate) -> bool {
        agg.order.halted
            || matches!(
                agg.order.state,
                OrderState::Packaging
                    | OrderState::QualityControl
                    | OrderState::Completed
                    | OrderState::Discarded
            )
    }

    fn record(
        agg: &mut OrderAggregate,
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<String>,
        now: NaiveDateTime,
    ) -> ReportEvent {
        let order = &mut agg.order;
        order.produced_good_quantity += good_delta;
        order.produced_waste_quantity += waste_delta;
        order.updated_at = now;

        ReportEvent {
            event_id: Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            reported_at: now,
            good_delta,
            waste_delta,
            waste_reason,
        }
    }

    // ==========================================
    // 校验
    // ==========================================

    fn validate_deltas(
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<&str>,
    ) -> ExecutionResult<Option<String>> {
        if !good_delta.is_finite() || !waste_delta.is_finite() {
            return Err(ExecutionError::Validation("报工数量必须为有效数字".to_string()));
        }
        if good_delta < 0.0 || waste_delta < 0.0 {
            return Err(ExecutionError::Validation(format!(
                "报工数量不能为负: good={}, waste={}",
                good_delta, waste_delta
            )));
        }
        if good_delta <= 0.0 && waste_delta <= 0.0 {
            return Err(ExecutionError::Validation(
                "良品与废品数量至少一项大于0".to_string(),
            ));
        }

        if waste_delta > 0.0 {
            let reason = waste_reason.map(str::trim).filter(|r| !r.is_empty());
            match reason {
                Some(r) => Ok(Some(r.to_string())),
                None => Err(ExecutionError::Validation(
                    "废品数量大于0时必须填写废品原因".to_string(),
                )),
            }
        } else {
            Ok(None)
        }
    }

    fn ensure_accepting_reports(agg: &OrderAggregate) -> ExecutionResult<()> {
        if Self::is_closed(agg) {
            return Err(ExecutionError::OrderClosed {
                state: agg.order.state,
            });
        }
        if !agg.order.state.is_line() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}尚未进入产线 (state={})",
                agg.order.order_id, agg.order.state
            )));
        }
        if !agg.order.is_started() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}尚未开工，不能报工",
                agg.order.order_id
            )));
        }
        Ok(())
    }
}
