// ==========================================
// 生产执行引擎 - 订单状态机
// ==========================================
// 职责: 看板移动（按角色授权）、停线转质检、质检完成
// 红线: 状态变更的唯一入口；被拒绝的转换不修改任何状态
// ==========================================

use crate::domain::order::OrderAggregate;
use crate::domain::quality::Disposition;
use crate::domain::types::{ActorRole, OrderState, ProductionLine};
use crate::engine::collaborators::RoleResolver;
use crate::engine::error::{ExecutionError, ExecutionResult};
use crate::engine::timer::ProductionTimer;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// 暂停类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// 普通暂停（计时器进入暂停）
    Regular,
    /// 交接班（交给外部交接班处理器，计时器不暂停）
    ShiftHandoff,
}

/// 订单状态机
pub struct OrderStateMachine {
    role_resolver: Arc<dyn RoleResolver>,
    timer: ProductionTimer,
}

impl OrderStateMachine {
    pub fn new(role_resolver: Arc<dyn RoleResolver>) -> Self {
        Self {
            role_resolver,
            timer: ProductionTimer::new(),
        }
    }

    // ==========================================
    // 看板移动
    // ==========================================

    /// 校验看板移动（不修改状态）
    ///
    /// # 规则
    /// 1. 终态无出边
    /// 2. (from → to) 必须在调用角色的允许列表内
    /// 3. 进入产线列时，目标列必须等于订单指派产线
    /// 4. QUALITY_CONTROL → COMPLETED 必须已有质量判定
    pub fn validate_move(
        &self,
        agg: &OrderAggregate,
        to: OrderState,
        role: ActorRole,
    ) -> ExecutionResult<()> {
        let from = agg.order.state;
        let forbidden = ExecutionError::ForbiddenTransition { role, from, to };

        if from.is_terminal() || from == to {
            return Err(forbidden);
        }
        if !self.role_resolver.allowed_transitions(role).contains(&(from, to)) {
            return Err(forbidden);
        }

        if let Some(target_line) = ProductionLine::from_column(to) {
            if target_line != agg.order.line {
                return Err(ExecutionError::LineMismatch {
                    assigned: agg.order.line,
                    target: to,
                });
            }
        }

        if from == OrderState::QualityControl
            && to == OrderState::Completed
            && agg.disposition.is_none()
        {
            return Err(ExecutionError::MissingDecision {
                order_id: agg.order.order_id.clone(),
            });
        }

        Ok(())
    }

    /// 执行看板移动
    ///
    /// # 返回
    /// 移动前的状态
    pub fn move_order(
        &self,
        agg: &mut OrderAggregate,
        to: OrderState,
        role: ActorRole,
        now: NaiveDateTime,
    ) -> ExecutionResult<OrderState> {
        self.validate_move(agg, to, role)?;
        Ok(self.enter(agg, to, now))
    }

    // ==========================================
    // 系统转换（不经角色授权）
    // ==========================================

    /// 停线转质检
    ///
    /// 订单封顶在当前产出，不再接受报工
    pub fn halt(&self, agg: &mut OrderAggregate, now: NaiveDateTime) -> ExecutionResult<OrderState> {
        if !agg.order.state.is_line() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}不在产线状态，无法停线 (state={})",
                agg.order.order_id, agg.order.state
            )));
        }
        agg.order.halted = true;
        Ok(self.enter(agg, OrderState::QualityControl, now))
    }

    /// 记录质量判定并进入终态
    pub fn complete_with_decision(
        &self,
        agg: &mut OrderAggregate,
        disposition: Disposition,
        now: NaiveDateTime,
    ) -> ExecutionResult<OrderState> {
        if agg.order.state != OrderState::QualityControl {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}不在质检状态 (state={})",
                agg.order.order_id, agg.order.state
            )));
        }
        let next_state = disposition.next_state;
        agg.disposition = Some(disposition);
        Ok(self.enter(agg, next_state, now))
    }

    // ==========================================
    // 暂停分类
    // ==========================================

    /// 根据原因代码区分普通暂停与交接班
    pub fn classify_pause(reason_code: &str, shift_change_codes: &[String]) -> PauseKind {
        let code = reason_code.trim();
        if shift_change_codes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
        {
            PauseKind::ShiftHandoff
        } else {
            PauseKind::Regular
        }
    }

    fn enter(&self, agg: &mut OrderAggregate, to: OrderState, now: NaiveDateTime) -> OrderState {
        let from = agg.order.state;
        if from.is_line() && !to.is_line() {
            self.timer.finish(agg, now);
            agg.pending_expansion = None;
        }
        agg.order.state = to;
        agg.order.updated_at = now;

        tracing::debug!(order_id = %agg.order.order_id, %from, %to, "订单状态转换");
        from
    }
}
