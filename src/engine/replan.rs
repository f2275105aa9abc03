// ==========================================
// 生产执行引擎 - 废品重排策略
// ==========================================
// 职责: 报废后在 自动补料 / 待确认扩产 / 停线转质检 之间决策
// 输入: 订单累计产出 + 有效上限 + 投入物料可用库存 + 自动补料上限
// 红线: 优先保持产线运转，改变订单承诺需人工确认，资源耗尽才硬停
// ==========================================

use crate::domain::order::{OrderAggregate, PendingExpansion, ProductionOrder};
use crate::domain::report::ReplanAction;
use crate::engine::error::{ExecutionError, ExecutionResult};
use chrono::NaiveDateTime;

const QUANTITY_EPSILON: f64 = 1e-9;

/// 停线原因: 库存不足
pub const HALT_REASON_INSUFFICIENT_STOCK: &str = "INSUFFICIENT_STOCK";
/// 停线原因: 库存服务不可用或超时
pub const HALT_REASON_INVENTORY_UNAVAILABLE: &str = "INVENTORY_UNAVAILABLE";

/// 废品重排策略引擎
#[derive(Debug, Clone)]
pub struct ReplanPolicyEngine {
    auto_replenish_ceiling: f64,
}

impl ReplanPolicyEngine {
    /// # 参数
    /// - `auto_replenish_ceiling`: 无需人工确认即可自动补料的最大数量（配置项）
    pub fn new(auto_replenish_ceiling: f64) -> Self {
        Self {
            auto_replenish_ceiling: auto_replenish_ceiling.max(0.0),
        }
    }

    pub fn auto_replenish_ceiling(&self) -> f64 {
        self.auto_replenish_ceiling
    }

    /// 是否需要查询库存
    ///
    /// # 返回
    /// - `Some(shortfall)`: 已触及上限且计划尚未完成，需要补足的数量
    /// - `None`: 未触及上限，或计划已完成（直接 continue）
    pub fn required_shortfall(&self, order: &ProductionOrder) -> Option<f64> {
        let at_cap = order.cumulative_output() + QUANTITY_EPSILON >= order.effective_ceiling();
        let shortfall = order.shortfall();
        if at_cap && shortfall > QUANTITY_EPSILON {
            Some(shortfall)
        } else {
            None
        }
    }

    /// 废品推过有效上限时的缺口
    ///
    /// 报工后良品距目标的差额，加上超出上限的废品（补料后本次报工才能完整计入）
    pub fn overflow_shortfall(
        &self,
        order: &ProductionOrder,
        good_delta: f64,
        overflow: f64,
    ) -> f64 {
        let good_after = order.produced_good_quantity + good_delta;
        (order.base_ceiling() - good_after).max(0.0) + overflow
    }

    /// 决策（按顺序，先命中先返回）
    ///
    /// # 参数
    /// - `shortfall`: 需补足的数量；None 表示未触及上限
    /// - `available_stock`: 可用库存；None 表示查询失败/超时
    ///
    /// # 规则
    /// 1. 库存覆盖缺口且缺口 ≤ 自动补料上限 → replenish
    /// 2. 库存覆盖缺口但缺口 > 自动补料上限 → expand_pending_confirmation
    /// 3. 库存不足或不可用 → halt_and_finish
    /// 4. 未触及上限 → continue
    pub fn decide(&self, shortfall: Option<f64>, available_stock: Option<f64>) -> ReplanAction {
        let Some(shortfall) = shortfall else {
            return ReplanAction::Continue;
        };
        let Some(available) = available_stock else {
            return ReplanAction::HaltAndFinish {
                reason: HALT_REASON_INVENTORY_UNAVAILABLE.to_string(),
            };
        };

        if available + QUANTITY_EPSILON >= shortfall {
            if shortfall <= self.auto_replenish_ceiling + QUANTITY_EPSILON {
                ReplanAction::Replenish { quantity: shortfall }
            } else {
                ReplanAction::ExpandPendingConfirmation { quantity: shortfall }
            }
        } else {
            ReplanAction::HaltAndFinish {
                reason: HALT_REASON_INSUFFICIENT_STOCK.to_string(),
            }
        }
    }

    // ==========================================
    // 决策落地
    // ==========================================

    /// 自动补料：提升有效上限，订单保持开启
    pub fn apply_replenish(&self, agg: &mut OrderAggregate, quantity: f64, now: NaiveDateTime) {
        agg.order.replenished_quantity += quantity;
        agg.order.updated_at = now;
    }

    /// 记录待确认扩产（不修改计划数量）
    pub fn propose_expansion(
        &self,
        agg: &mut OrderAggregate,
        quantity: f64,
        trigger_waste_quantity: f64,
        now: NaiveDateTime,
    ) {
        agg.pending_expansion = Some(PendingExpansion {
            quantity,
            trigger_waste_quantity,
            proposed_at: now,
        });
        agg.order.updated_at = now;
    }

    /// 校验扩产确认请求（库存复核之前）
    pub fn validate_confirmation(
        &self,
        agg: &OrderAggregate,
        waste_to_cover: f64,
    ) -> ExecutionResult<()> {
        if !waste_to_cover.is_finite() || waste_to_cover <= 0.0 {
            return Err(ExecutionError::Validation(format!(
                "扩产数量必须大于0: {}",
                waste_to_cover
            )));
        }
        if agg.order.halted || !agg.order.state.is_line() {
            return Err(ExecutionError::OrderClosed {
                state: agg.order.state,
            });
        }
        if agg.pending_expansion.is_none() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}没有待确认的扩产",
                agg.order.order_id
            )));
        }
        Ok(())
    }

    /// 确认扩产
    ///
    /// # 参数
    /// - `available_stock`: 确认时复核得到的库存
    ///
    /// # 返回
    /// 扩产后的计划数量
    pub fn confirm_expansion(
        &self,
        agg: &mut OrderAggregate,
        waste_to_cover: f64,
        available_stock: f64,
        now: NaiveDateTime,
    ) -> ExecutionResult<f64> {
        self.validate_confirmation(agg, waste_to_cover)?;
        if available_stock + QUANTITY_EPSILON < waste_to_cover {
            return Err(ExecutionError::StaleStock {
                required: waste_to_cover,
                available: available_stock,
            });
        }

        let order = &mut agg.order;
        order.planned_quantity += waste_to_cover;
        if let Some(max) = order.max_producible_quantity.as_mut() {
            *max += waste_to_cover;
        }
        order.updated_at = now;
        agg.pending_expansion = None;
        Ok(agg.order.planned_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::NewProductionOrder;
    use crate::domain::types::{OrderState, ProductionLine};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap()
    }

    fn order_with(planned: f64, good: f64, waste: f64) -> OrderAggregate {
        let mut order = NewProductionOrder {
            order_id: "OP-R1".to_string(),
            product_ref: "SKU-1".to_string(),
            line: ProductionLine::Line1,
            shift: "A".to_string(),
            input_ids: vec!["RM-1".to_string()],
            planned_quantity: planned,
            target_rate: 60.0,
            max_producible_quantity: None,
        }
        .into_order(now());
        order.state = OrderState::Line1;
        order.started_at = Some(now());
        order.produced_good_quantity = good;
        order.produced_waste_quantity = waste;
        OrderAggregate::new(order)
    }

    #[test]
    fn test_below_cap_continues() {
        let engine = ReplanPolicyEngine::new(10.0);
        let agg = order_with(100.0, 40.0, 5.0);
        assert_eq!(engine.required_shortfall(&agg.order), None);
        assert_eq!(engine.decide(None, Some(0.0)), ReplanAction::Continue);
    }

    #[test]
    fn test_small_shortfall_replenishes() {
        let engine = ReplanPolicyEngine::new(10.0);
        let agg = order_with(100.0, 92.0, 8.0);
        let shortfall = engine.required_shortfall(&agg.order);
        assert_eq!(shortfall, Some(8.0));
        assert_eq!(
            engine.decide(shortfall, Some(50.0)),
            ReplanAction::Replenish { quantity: 8.0 }
        );
    }

    #[test]
    fn test_large_shortfall_needs_confirmation() {
        let engine = ReplanPolicyEngine::new(10.0);
        let agg = order_with(100.0, 70.0, 30.0);
        let shortfall = engine.required_shortfall(&agg.order);
        assert_eq!(
            engine.decide(shortfall, Some(500.0)),
            ReplanAction::ExpandPendingConfirmation { quantity: 30.0 }
        );
    }

    #[test]
    fn test_insufficient_stock_halts() {
        let engine = ReplanPolicyEngine::new(10.0);
        let agg = order_with(100.0, 95.0, 5.0);
        let shortfall = engine.required_shortfall(&agg.order);
        assert!(matches!(
            engine.decide(shortfall, Some(2.0)),
            ReplanAction::HaltAndFinish { .. }
        ));
    }

    #[test]
    fn test_unavailable_inventory_halts_conservatively() {
        let engine = ReplanPolicyEngine::new(10.0);
        assert_eq!(
            engine.decide(Some(3.0), None),
            ReplanAction::HaltAndFinish {
                reason: HALT_REASON_INVENTORY_UNAVAILABLE.to_string()
            }
        );
    }

    #[test]
    fn test_plan_met_at_cap_continues() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 100.0, 0.0);
        agg.order.replenished_quantity = 5.0;
        agg.order.produced_waste_quantity = 5.0;
        assert_eq!(engine.required_shortfall(&agg.order), None);
    }

    #[test]
    fn test_overflow_counts_in_shortfall() {
        let engine = ReplanPolicyEngine::new(10.0);
        let agg = order_with(100.0, 95.0, 0.0);
        let shortfall = engine.overflow_shortfall(&agg.order, 0.0, 5.0);
        assert_eq!(shortfall, 10.0);
        assert_eq!(
            engine.decide(Some(shortfall), Some(10.0)),
            ReplanAction::Replenish { quantity: 10.0 }
        );
        assert_eq!(
            engine.decide(Some(shortfall), Some(0.0)),
            ReplanAction::HaltAndFinish {
                reason: HALT_REASON_INSUFFICIENT_STOCK.to_string()
            }
        );
    }

    #[test]
    fn test_stock_cap_bounds_shortfall() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 45.0, 5.0);
        agg.order.max_producible_quantity = Some(50.0);
        assert_eq!(engine.required_shortfall(&agg.order), Some(5.0));
    }

    #[test]
    fn test_replenish_raises_ceiling() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 92.0, 8.0);
        engine.apply_replenish(&mut agg, 8.0, now());
        assert_eq!(agg.order.effective_ceiling(), 108.0);
        assert_eq!(agg.order.planned_quantity, 100.0);
    }

    #[test]
    fn test_confirm_expansion_requires_pending() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 70.0, 30.0);
        let err = engine
            .confirm_expansion(&mut agg, 30.0, 100.0, now())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidState(_)));
    }

    #[test]
    fn test_confirm_expansion_rechecks_stock() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 70.0, 30.0);
        engine.propose_expansion(&mut agg, 30.0, 30.0, now());

        let err = engine
            .confirm_expansion(&mut agg, 30.0, 12.0, now())
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::StaleStock {
                required: 30.0,
                available: 12.0
            }
        );
        assert_eq!(agg.order.planned_quantity, 100.0);
        assert!(agg.pending_expansion.is_some());

        let new_planned = engine
            .confirm_expansion(&mut agg, 30.0, 40.0, now())
            .unwrap();
        assert_eq!(new_planned, 130.0);
        assert_eq!(agg.order.effective_ceiling(), 130.0);
        assert!(agg.pending_expansion.is_none());
    }

    #[test]
    fn test_confirm_expansion_moves_stock_cap() {
        let engine = ReplanPolicyEngine::new(10.0);
        let mut agg = order_with(100.0, 60.0, 20.0);
        agg.order.max_producible_quantity = Some(80.0);
        engine.propose_expansion(&mut agg, 40.0, 20.0, now());

        engine.confirm_expansion(&mut agg, 40.0, 40.0, now()).unwrap();
        assert_eq!(agg.order.max_producible_quantity, Some(120.0));
        assert_eq!(agg.order.effective_ceiling(), 120.0);
    }
}
