// ==========================================
// 生产执行引擎 - 生产计时器
// ==========================================
// 职责: 开工/暂停/恢复/收工，运行秒数与暂停秒数推算
// 输入: 订单聚合 + 当前时间
// 红线: 运行时间只由时间戳推算，不做计数器累加
// ==========================================

use crate::domain::order::{OrderAggregate, PauseInterval};
use crate::engine::error::{ExecutionError, ExecutionResult};
use chrono::NaiveDateTime;

/// 生产计时器（无状态，所有状态在订单聚合上）
#[derive(Debug, Clone, Default)]
pub struct ProductionTimer;

impl ProductionTimer {
    pub fn new() -> Self {
        Self
    }

    /// 开工
    ///
    /// # 返回
    /// - `Ok(true)`: 本次调用启动了计时
    /// - `Ok(false)`: 已启动过（幂等，无操作）
    pub fn start(&self, agg: &mut OrderAggregate, now: NaiveDateTime) -> ExecutionResult<bool> {
        let order = &mut agg.order;
        if !order.state.is_line() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}不在产线状态，无法开工 (state={})",
                order.order_id, order.state
            )));
        }
        if order.started_at.is_some() {
            return Ok(false);
        }

        order.started_at = Some(now);
        order.updated_at = now;
        Ok(true)
    }

    /// 暂停
    pub fn pause(
        &self,
        agg: &mut OrderAggregate,
        reason_code: &str,
        now: NaiveDateTime,
    ) -> ExecutionResult<()> {
        let reason_code = self.validate_pause(agg, reason_code)?;

        let seq = agg.next_pause_seq();
        agg.pauses.push(PauseInterval {
            order_id: agg.order.order_id.clone(),
            seq,
            reason_code: reason_code.clone(),
            started_at: now,
            ended_at: None,
        });
        agg.order.current_pause_reason = Some(reason_code);
        agg.order.updated_at = now;
        Ok(())
    }

    /// 校验暂停请求（不修改聚合）
    ///
    /// # 返回
    /// 去除首尾空白后的原因代码
    pub fn validate_pause(&self, agg: &OrderAggregate, reason_code: &str) -> ExecutionResult<String> {
        let reason_code = reason_code.trim();
        if reason_code.is_empty() {
            return Err(ExecutionError::Validation("暂停原因不能为空".to_string()));
        }
        self.ensure_running_line(agg)?;
        if agg.is_paused() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}已处于暂停状态",
                agg.order_id()
            )));
        }
        Ok(reason_code.to_string())
    }

    /// 恢复
    ///
    /// # 返回
    /// 被关闭的暂停区间
    pub fn resume(
        &self,
        agg: &mut OrderAggregate,
        now: NaiveDateTime,
    ) -> ExecutionResult<PauseInterval> {
        let order_id = agg.order.order_id.clone();
        self.close_open_pause(agg, now).ok_or_else(|| {
            ExecutionError::InvalidState(format!("订单{}当前未暂停", order_id))
        })
    }

    /// 收工：关闭进行中的暂停并记录 finished_at
    ///
    /// 离开产线状态（转包装/停线转质检）时调用，之后运行时间不再增长
    pub fn finish(&self, agg: &mut OrderAggregate, now: NaiveDateTime) {
        self.close_open_pause(agg, now);
        if agg.order.started_at.is_some() && agg.order.finished_at.is_none() {
            agg.order.finished_at = Some(now);
        }
        agg.order.updated_at = now;
    }

    /// 运行秒数 = 墙钟秒数 - 累计暂停 - 进行中暂停
    pub fn elapsed_seconds(&self, agg: &OrderAggregate, now: NaiveDateTime) -> i64 {
        let Some(started_at) = agg.order.started_at else {
            return 0;
        };
        let end = self.reference_time(agg, now);
        let wall = (end - started_at).num_seconds().max(0);
        (wall - agg.order.accumulated_pause_seconds - self.open_pause_seconds(agg, end)).max(0)
    }

    /// 暂停秒数 = 累计暂停 + 进行中暂停
    pub fn pause_seconds(&self, agg: &OrderAggregate, now: NaiveDateTime) -> i64 {
        let end = self.reference_time(agg, now);
        agg.order.accumulated_pause_seconds + self.open_pause_seconds(agg, end)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn ensure_running_line(&self, agg: &OrderAggregate) -> ExecutionResult<()> {
        let order = &agg.order;
        if !order.state.is_line() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}不在产线状态 (state={})",
                order.order_id, order.state
            )));
        }
        if !order.is_started() {
            return Err(ExecutionError::InvalidState(format!(
                "订单{}尚未开工",
                order.order_id
            )));
        }
        Ok(())
    }

    fn close_open_pause(&self, agg: &mut OrderAggregate, now: NaiveDateTime) -> Option<PauseInterval> {
        let interval = agg.open_pause_mut()?;
        interval.ended_at = Some(now.max(interval.started_at));
        let closed = interval.clone();

        let duration = closed.duration_seconds().unwrap_or(0);
        agg.order.accumulated_pause_seconds += duration;
        agg.order.current_pause_reason = None;
        agg.order.updated_at = now;
        Some(closed)
    }

    fn reference_time(&self, agg: &OrderAggregate, now: NaiveDateTime) -> NaiveDateTime {
        agg.order.finished_at.unwrap_or(now)
    }

    fn open_pause_seconds(&self, agg: &OrderAggregate, end: NaiveDateTime) -> i64 {
        agg.open_pause()
            .map(|p| (end - p.started_at).num_seconds().max(0))
            .unwrap_or(0)
    }
}
