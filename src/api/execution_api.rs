// ==========================================
// 生产执行引擎 - 执行 API
// ==========================================
// 职责: 车间终端与看板 UI 的统一入口
// 并发: 每个订单一把 tokio Mutex（单写者），订单之间完全并行，无全局锁
// 红线: 所有变更先在草稿上完成，落库成功后才替换内存状态
// 红线: 外部协作方失败在此映射为业务错误，不外泄
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::dto::{ExpansionResponse, OrderStatus, PauseOutcome, ReportProgressResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::config::ExecutionConfig;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::order::{NewProductionOrder, OrderAggregate, PauseInterval, ProductionOrder};
use crate::domain::quality::{Disposition, QualityDecision};
use crate::domain::report::{ReplanAction, ReplanDecision, ReportEvent};
use crate::domain::types::{ActorRole, OrderState};
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::collaborators::{
    limiting_stock, DefaultRolePolicy, InventoryService, NoOpShiftTransfer, RoleResolver,
    ShiftTransferHandler,
};
use crate::engine::error::{ExecutionError, ExecutionResult};
use crate::engine::events::{EventFanout, ExecutionEvent, ExecutionEventSink};
use crate::engine::ledger::ProductionLedger;
use crate::engine::oee::{OeeCalculator, OeeInput, OeeSnapshot};
use crate::engine::quality::QualityDecisionProcessor;
use crate::engine::replan::{ReplanPolicyEngine, HALT_REASON_INVENTORY_UNAVAILABLE};
use crate::engine::state_machine::{OrderStateMachine, PauseKind};
use crate::engine::timer::ProductionTimer;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::order_repo::ProductionOrderRepository;
use crate::repository::report_repo::ReportEventRepository;
use chrono::NaiveDateTime;

/// 车间终端动作的操作人
const SHOP_FLOOR_ACTOR: &str = "OPERATOR";
/// 引擎自动动作的操作人
const SYSTEM_ACTOR: &str = "SYSTEM";

// ==========================================
// ExecutionCollaborators - 外部协作方
// ==========================================

/// 执行引擎依赖的外部协作方
pub struct ExecutionCollaborators {
    pub role_resolver: Arc<dyn RoleResolver>,
    pub inventory: Arc<dyn InventoryService>,
    pub shift_transfer: Arc<dyn ShiftTransferHandler>,
    pub event_sinks: Vec<Arc<dyn ExecutionEventSink>>,
    pub clock: Arc<dyn Clock>,
}

impl ExecutionCollaborators {
    /// 默认角色策略 + 空交接班处理 + 系统时钟
    pub fn new(inventory: Arc<dyn InventoryService>) -> Self {
        Self {
            role_resolver: Arc::new(DefaultRolePolicy),
            inventory,
            shift_transfer: Arc::new(NoOpShiftTransfer),
            event_sinks: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_role_resolver(mut self, role_resolver: Arc<dyn RoleResolver>) -> Self {
        self.role_resolver = role_resolver;
        self
    }

    pub fn with_shift_transfer(mut self, shift_transfer: Arc<dyn ShiftTransferHandler>) -> Self {
        self.shift_transfer = shift_transfer;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ExecutionEventSink>) -> Self {
        self.event_sinks.push(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

// ==========================================
// OrderSlot - 单个订单的单写者单元
// ==========================================

struct CachedStatus {
    captured_at: Instant,
    status: OrderStatus,
}

struct OrderSlot {
    aggregate: tokio::sync::Mutex<OrderAggregate>,
    snapshot: Mutex<Option<CachedStatus>>,
}

impl OrderSlot {
    fn new(agg: OrderAggregate) -> Self {
        Self {
            aggregate: tokio::sync::Mutex::new(agg),
            snapshot: Mutex::new(None),
        }
    }

    fn store_snapshot(&self, status: OrderStatus) {
        let mut guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CachedStatus {
            captured_at: Instant::now(),
            status,
        });
    }

    fn fresh_snapshot(&self, ttl: Duration) -> Option<OrderStatus> {
        let guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|cached| cached.captured_at.elapsed() <= ttl)
            .map(|cached| cached.status.clone())
    }
}

// ==========================================
// ExecutionApi - 执行 API
// ==========================================

/// 执行 API
///
/// 职责：
/// 1. 计时（开工/暂停/恢复）
/// 2. 报工 + 废品重排
/// 3. 看板移动、质量判定
/// 4. 实时状态与 OEE
pub struct ExecutionApi {
    orders: RwLock<HashMap<String, Arc<OrderSlot>>>,

    order_repo: Arc<ProductionOrderRepository>,
    report_repo: Arc<ReportEventRepository>,
    action_log_repo: Arc<ActionLogRepository>,

    config: ExecutionConfig,
    clock: Arc<dyn Clock>,
    inventory: Arc<dyn InventoryService>,
    shift_transfer: Arc<dyn ShiftTransferHandler>,
    events: EventFanout,

    timer: ProductionTimer,
    ledger: ProductionLedger,
    state_machine: OrderStateMachine,
    replan: ReplanPolicyEngine,
    quality: QualityDecisionProcessor,
}

impl ExecutionApi {
    /// 创建 ExecutionApi，并从数据库恢复所有未结束的订单
    pub fn new(
        order_repo: Arc<ProductionOrderRepository>,
        report_repo: Arc<ReportEventRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: ExecutionConfig,
        collaborators: ExecutionCollaborators,
    ) -> ApiResult<Self> {
        let open_orders = order_repo.find_open()?;
        let restored = open_orders.len();
        let orders = open_orders
            .into_iter()
            .map(|agg| (agg.order.order_id.clone(), Arc::new(OrderSlot::new(agg))))
            .collect();

        tracing::info!(restored, "执行引擎已恢复未结束订单");

        Ok(Self {
            orders: RwLock::new(orders),
            order_repo,
            report_repo,
            action_log_repo,
            replan: ReplanPolicyEngine::new(config.auto_replenish_ceiling),
            config,
            clock: collaborators.clock,
            inventory: collaborators.inventory,
            shift_transfer: collaborators.shift_transfer,
            events: EventFanout::new(collaborators.event_sinks),
            timer: ProductionTimer::new(),
            ledger: ProductionLedger::new(),
            state_machine: OrderStateMachine::new(collaborators.role_resolver),
            quality: QualityDecisionProcessor::new(),
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    // ==========================================
    // 订单接入与查询
    // ==========================================

    /// 接入订单（进入 PENDING）
    pub fn register_order(&self, new_order: NewProductionOrder) -> ApiResult<ProductionOrder> {
        Self::validate_new_order(&new_order)?;
        if self.lookup_slot(&new_order.order_id).is_some() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "订单{}已存在",
                new_order.order_id
            )));
        }

        let now = self.clock.now();
        let agg = OrderAggregate::new(new_order.into_order(now));
        self.order_repo.insert_new(&agg)?;

        let order = agg.order.clone();
        {
            let mut orders = self
                .orders
                .write()
                .map_err(|e| ApiError::InternalError(format!("订单注册表锁获取失败: {}", e)))?;
            orders.insert(order.order_id.clone(), Arc::new(OrderSlot::new(agg)));
        }

        tracing::info!(order_id = %order.order_id, line = %order.line, "订单已接入");
        self.emit(
            ExecutionEvent::new(
                &order.order_id,
                ActionType::RegisterOrder,
                SYSTEM_ACTOR,
                now,
                format!("订单{}接入，计划数量{}", order.order_id, order.planned_quantity),
            )
            .with_payload(&order),
        );
        Ok(order)
    }

    /// 列出订单（可按状态过滤）
    pub fn list_orders(&self, state: Option<OrderState>) -> ApiResult<Vec<ProductionOrder>> {
        Ok(self.order_repo.list_all(state)?)
    }

    /// 订单的报工事件流
    pub fn list_report_events(&self, order_id: &str) -> ApiResult<Vec<ReportEvent>> {
        Self::require_order_id(order_id)?;
        Ok(self.report_repo.list_by_order(order_id)?)
    }

    /// 订单的审计轨迹
    pub fn list_audit_log(&self, order_id: &str) -> ApiResult<Vec<ActionLog>> {
        Self::require_order_id(order_id)?;
        Ok(self.action_log_repo.find_by_order_id(order_id)?)
    }

    // ==========================================
    // 计时
    // ==========================================

    /// 开工计时（幂等）
    ///
    /// # 返回
    /// - `Ok(true)`: 本次调用启动了计时
    /// - `Ok(false)`: 已启动过
    pub async fn start_timer(&self, order_id: &str) -> ApiResult<bool> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let mut draft = current.clone();
        let started = self
            .timer
            .start(&mut draft, now)
            .map_err(|e| self.reject(e, &current))?;
        if !started {
            return Ok(false);
        }

        self.commit(&slot, &mut current, draft, None, now)?;
        self.emit(ExecutionEvent::new(
            order_id,
            ActionType::StartTimer,
            SHOP_FLOOR_ACTOR,
            now,
            format!("订单{}开工计时", order_id),
        ));
        Ok(true)
    }

    /// 暂停
    ///
    /// 交接班原因交给交接班处理器，计时器不暂停
    pub async fn pause(&self, order_id: &str, reason_code: &str) -> ApiResult<PauseOutcome> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let reason_code = self
            .timer
            .validate_pause(&current, reason_code)
            .map_err(|e| self.reject(e, &current))?;

        match OrderStateMachine::classify_pause(&reason_code, &self.config.shift_change_reason_codes)
        {
            PauseKind::ShiftHandoff => {
                self.shift_transfer
                    .hand_off(&current.order, &reason_code)
                    .map_err(|e| {
                        tracing::warn!(order_id, error = %e, "交接班处理失败");
                        self.reject(
                            ExecutionError::InvalidState(format!("交接班处理失败: {}", e)),
                            &current,
                        )
                    })?;

                self.emit(ExecutionEvent::new(
                    order_id,
                    ActionType::ShiftHandoff,
                    SHOP_FLOOR_ACTOR,
                    now,
                    format!("订单{}交接班 ({})", order_id, reason_code),
                ));
                Ok(PauseOutcome::ShiftHandoff { reason_code })
            }
            PauseKind::Regular => {
                let mut draft = current.clone();
                self.timer
                    .pause(&mut draft, &reason_code, now)
                    .map_err(|e| self.reject(e, &current))?;
                let seq = draft.open_pause().map(|p| p.seq).unwrap_or_default();

                self.commit(&slot, &mut current, draft, None, now)?;
                self.emit(ExecutionEvent::new(
                    order_id,
                    ActionType::Pause,
                    SHOP_FLOOR_ACTOR,
                    now,
                    format!("订单{}暂停 ({})", order_id, reason_code),
                ));
                Ok(PauseOutcome::Paused {
                    seq,
                    reason_code,
                    started_at: now,
                })
            }
        }
    }

    /// 恢复
    ///
    /// # 返回
    /// 被关闭的暂停区间
    pub async fn resume(&self, order_id: &str) -> ApiResult<PauseInterval> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let mut draft = current.clone();
        let closed = self
            .timer
            .resume(&mut draft, now)
            .map_err(|e| self.reject(e, &current))?;

        self.commit(&slot, &mut current, draft, None, now)?;
        self.emit(
            ExecutionEvent::new(
                order_id,
                ActionType::Resume,
                SHOP_FLOOR_ACTOR,
                now,
                format!(
                    "订单{}恢复生产，暂停{}秒",
                    order_id,
                    closed.duration_seconds().unwrap_or(0)
                ),
            )
            .with_payload(&closed),
        );
        Ok(closed)
    }

    // ==========================================
    // 报工与重排
    // ==========================================

    /// 报工
    ///
    /// 含废品时在同一次请求内完成重排决策，结果随响应返回。
    /// 废品把累计产出推过有效上限时不直接拒绝，按溢出后的缺口重排
    pub async fn report_progress(
        &self,
        order_id: &str,
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<&str>,
    ) -> ApiResult<ReportProgressResponse> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let mut draft = current.clone();
        let reported = self
            .ledger
            .report(&mut draft, good_delta, waste_delta, waste_reason, now);
        let (event, decision) = match reported {
            Ok(event) => {
                let decision = if waste_delta > 0.0 {
                    Some(self.apply_replan(&mut draft, waste_delta, now).await)
                } else {
                    None
                };
                (event, decision)
            }
            Err(ExecutionError::CapacityExceeded { .. }) if waste_delta > 0.0 => {
                let (event, decision) = self
                    .absorb_waste_overflow(&mut draft, good_delta, waste_delta, waste_reason, now)
                    .await
                    .map_err(|e| self.reject(e, &current))?;
                (event, Some(decision))
            }
            Err(e) => return Err(self.reject(e, &current)),
        };

        self.commit(&slot, &mut current, draft, Some(&event), now)?;

        tracing::info!(
            order_id,
            good_delta = event.good_delta,
            waste_delta = event.waste_delta,
            good = current.order.produced_good_quantity,
            waste = current.order.produced_waste_quantity,
            "报工已记录"
        );
        self.emit(
            ExecutionEvent::new(
                order_id,
                ActionType::Report,
                SHOP_FLOOR_ACTOR,
                now,
                format!(
                    "订单{}报工: 良品+{}，废品+{}",
                    order_id, event.good_delta, event.waste_delta
                ),
            )
            .with_payload(&event),
        );

        let replan_action = match decision {
            Some(decision) => {
                self.emit_replan(&decision, &current);
                decision.action
            }
            None => ReplanAction::Continue,
        };

        Ok(ReportProgressResponse {
            order_state: current.order.state,
            oee_snapshot: self.compute_oee(&current, now),
            replan_action,
            event,
        })
    }

    /// 确认扩产（两阶段协议的第二阶段）
    ///
    /// 确认时复核库存: 库存不足返回 StaleStock 并保留待确认扩产；
    /// 库存服务失败或超时则停线转质检
    pub async fn confirm_expansion(
        &self,
        order_id: &str,
        waste_to_cover: f64,
    ) -> ApiResult<ExpansionResponse> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        self.replan
            .validate_confirmation(&current, waste_to_cover)
            .map_err(|e| self.reject(e, &current))?;

        let Some(available) = self.read_available_stock(&current.order).await else {
            let mut draft = current.clone();
            self.halt(&mut draft, now);
            self.commit(&slot, &mut current, draft, None, now)?;

            tracing::warn!(order_id, "扩产确认时库存服务不可用，停线转质检");
            let decision = ReplanDecision {
                order_id: order_id.to_string(),
                trigger_waste_quantity: waste_to_cover,
                action: ReplanAction::HaltAndFinish {
                    reason: HALT_REASON_INVENTORY_UNAVAILABLE.to_string(),
                },
                available_stock: None,
                unrecorded_waste_quantity: 0.0,
                decided_at: now,
            };
            self.emit_replan(&decision, &current);
            return Ok(ExpansionResponse {
                order_id: order_id.to_string(),
                order_state: current.order.state,
                replan_action: decision.action,
                new_planned_quantity: current.order.planned_quantity,
                effective_ceiling: current.order.effective_ceiling(),
            });
        };

        let mut draft = current.clone();
        let new_planned_quantity = self
            .replan
            .confirm_expansion(&mut draft, waste_to_cover, available, now)
            .map_err(|e| self.reject(e, &current))?;

        if let Err(reason) = self.consume_stock(&draft.order, waste_to_cover).await {
            tracing::warn!(order_id, reason = %reason, "扩产库存扣减失败，保留待确认扩产");
            return Err(self.reject(
                ExecutionError::StaleStock {
                    required: waste_to_cover,
                    available,
                },
                &current,
            ));
        }

        self.commit(&slot, &mut current, draft, None, now)?;

        let action = ReplanAction::ExpandConfirmed {
            quantity: waste_to_cover,
        };
        let decision = ReplanDecision {
            order_id: order_id.to_string(),
            trigger_waste_quantity: waste_to_cover,
            action: action.clone(),
            available_stock: Some(available),
            unrecorded_waste_quantity: 0.0,
            decided_at: now,
        };
        self.emit(
            ExecutionEvent::new(
                order_id,
                ActionType::ConfirmExpansion,
                SHOP_FLOOR_ACTOR,
                now,
                format!(
                    "订单{}确认扩产{}，计划数量调整为{}",
                    order_id, waste_to_cover, new_planned_quantity
                ),
            )
            .with_payload(&decision),
        );
        Ok(ExpansionResponse {
            order_id: order_id.to_string(),
            order_state: current.order.state,
            replan_action: action,
            new_planned_quantity,
            effective_ceiling: current.order.effective_ceiling(),
        })
    }

    // ==========================================
    // 看板与质检
    // ==========================================

    /// 看板移动
    ///
    /// # 返回
    /// 移动后的状态
    pub async fn move_order(
        &self,
        order_id: &str,
        to_state: OrderState,
        caller_role: ActorRole,
    ) -> ApiResult<OrderState> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let mut draft = current.clone();
        let from = self
            .state_machine
            .move_order(&mut draft, to_state, caller_role, now)
            .map_err(|e| self.reject(e, &current))?;

        self.commit(&slot, &mut current, draft, None, now)?;
        self.emit(ExecutionEvent::new(
            order_id,
            ActionType::MoveOrder,
            caller_role.to_string(),
            now,
            format!("订单{}由{}移动到{}", order_id, from, to_state),
        ));
        Ok(current.order.state)
    }

    /// 提交质量判定
    ///
    /// 库存处置写入成功后才提交状态；整单报废不写库存
    pub async fn submit_quality_decision(
        &self,
        order_id: &str,
        decision: QualityDecision,
    ) -> ApiResult<Disposition> {
        let slot = self.slot(order_id)?;
        let mut current = slot.aggregate.lock().await;
        let now = self.clock.now();

        let disposition = self
            .quality
            .evaluate(&current, &decision, now)
            .map_err(|e| self.reject(e, &current))?;

        let mut draft = current.clone();
        self.state_machine
            .complete_with_decision(&mut draft, disposition.clone(), now)
            .map_err(|e| self.reject(e, &current))?;

        if !disposition.fully_discarded {
            if let Err(reason) = self.apply_disposition(&disposition).await {
                tracing::warn!(order_id, reason = %reason, "质量处置写入库存失败，订单保留在质检");
                return Err(self.reject(
                    ExecutionError::InvalidState(format!("库存处置写入失败: {}", reason)),
                    &current,
                ));
            }
        }

        self.commit(&slot, &mut current, draft, None, now)?;
        self.emit(
            ExecutionEvent::new(
                order_id,
                ActionType::QualityDecision,
                ActorRole::QualitySupervisor.to_string(),
                now,
                format!(
                    "订单{}质量判定{}: 放行{}，拒收{}，隔离{}",
                    order_id,
                    disposition.decision,
                    disposition.released_quantity,
                    disposition.rejected_quantity,
                    disposition.quarantined_quantity
                ),
            )
            .with_payload(&disposition),
        );
        Ok(disposition)
    }

    // ==========================================
    // 实时状态
    // ==========================================

    /// 订单实时状态
    ///
    /// 订单正忙（另一请求持有锁）时，返回不超过 status_cache_ttl_ms 的缓存快照
    pub async fn get_status(&self, order_id: &str) -> ApiResult<OrderStatus> {
        let slot = self.slot(order_id)?;

        if let Ok(agg) = slot.aggregate.try_lock() {
            let status = self.build_status(&agg, self.clock.now());
            slot.store_snapshot(status.clone());
            return Ok(status);
        }

        let ttl = Duration::from_millis(self.config.status_cache_ttl_ms);
        if let Some(mut cached) = slot.fresh_snapshot(ttl) {
            cached.from_cache = true;
            return Ok(cached);
        }

        let agg = slot.aggregate.lock().await;
        let status = self.build_status(&agg, self.clock.now());
        slot.store_snapshot(status.clone());
        Ok(status)
    }

    /// 刷新所有运行中订单的状态快照（只读）
    ///
    /// # 返回
    /// 本轮刷新的订单数量（忙碌订单跳过）
    pub fn refresh_running_snapshots(&self) -> usize {
        let slots: Vec<Arc<OrderSlot>> = match self.orders.read() {
            Ok(orders) => orders.values().cloned().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "订单注册表锁获取失败，跳过本轮刷新");
                return 0;
            }
        };

        let now = self.clock.now();
        let mut refreshed = 0;
        for slot in slots {
            let Ok(agg) = slot.aggregate.try_lock() else {
                continue;
            };
            if agg.order.state.is_line() && agg.order.is_started() {
                let status = self.build_status(&agg, now);
                drop(agg);
                slot.store_snapshot(status);
                refreshed += 1;
            }
        }
        refreshed
    }

    /// 启动周期性 OEE 刷新任务
    ///
    /// ExecutionApi 被释放后任务自动退出
    pub fn spawn_oee_refresher(self: &Arc<Self>) -> JoinHandle<()> {
        let api = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.oee_refresh_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(api) = api.upgrade() else {
                    tracing::debug!("ExecutionApi 已释放，OEE 刷新任务退出");
                    break;
                };
                let refreshed = api.refresh_running_snapshots();
                tracing::trace!(refreshed, "OEE 快照已刷新");
            }
        })
    }

    // ==========================================
    // 重排（持有订单锁时调用）
    // ==========================================

    /// 计算并落地重排决策（修改草稿）
    async fn apply_replan(
        &self,
        draft: &mut OrderAggregate,
        waste_delta: f64,
        now: NaiveDateTime,
    ) -> ReplanDecision {
        let shortfall = self.replan.required_shortfall(&draft.order);
        let available_stock = match shortfall {
            Some(_) => self.read_available_stock(&draft.order).await,
            None => None,
        };

        let action = match self.replan.decide(shortfall, available_stock) {
            ReplanAction::Replenish { quantity } => {
                match self.consume_stock(&draft.order, quantity).await {
                    Ok(()) => {
                        self.replan.apply_replenish(draft, quantity, now);
                        ReplanAction::Replenish { quantity }
                    }
                    Err(reason) => {
                        tracing::warn!(
                            order_id = %draft.order.order_id,
                            reason = %reason,
                            "自动补料扣减库存失败，停线转质检"
                        );
                        self.halt(draft, now);
                        ReplanAction::HaltAndFinish {
                            reason: HALT_REASON_INVENTORY_UNAVAILABLE.to_string(),
                        }
                    }
                }
            }
            ReplanAction::ExpandPendingConfirmation { quantity } => {
                self.replan
                    .propose_expansion(draft, quantity, waste_delta, now);
                ReplanAction::ExpandPendingConfirmation { quantity }
            }
            ReplanAction::HaltAndFinish { reason } => {
                self.halt(draft, now);
                ReplanAction::HaltAndFinish { reason }
            }
            other => other,
        };

        tracing::info!(
            order_id = %draft.order.order_id,
            action = action.as_str(),
            shortfall = ?shortfall,
            available_stock = ?available_stock,
            "重排决策"
        );

        ReplanDecision {
            order_id: draft.order.order_id.clone(),
            trigger_waste_quantity: waste_delta,
            action,
            available_stock,
            unrecorded_waste_quantity: 0.0,
            decided_at: now,
        }
    }

    /// 废品溢出有效上限时的重排
    ///
    /// 补料成功时先抬升上限再完整计入本次报工；
    /// 待确认扩产与停线时废品封顶计入，溢出部分记入决策
    async fn absorb_waste_overflow(
        &self,
        draft: &mut OrderAggregate,
        good_delta: f64,
        waste_delta: f64,
        waste_reason: Option<&str>,
        now: NaiveDateTime,
    ) -> ExecutionResult<(ReportEvent, ReplanDecision)> {
        let overflow = self.ledger.waste_overflow(draft, good_delta, waste_delta)?;
        let shortfall = self
            .replan
            .overflow_shortfall(&draft.order, good_delta, overflow);
        let available_stock = self.read_available_stock(&draft.order).await;

        let decided = self.replan.decide(Some(shortfall), available_stock);
        let (event, unrecorded, action) = match decided {
            ReplanAction::Replenish { quantity } => {
                match self.consume_stock(&draft.order, quantity).await {
                    Ok(()) => {
                        self.replan.apply_replenish(draft, quantity, now);
                        let event =
                            self.ledger
                                .report(draft, good_delta, waste_delta, waste_reason, now)?;
                        (event, 0.0, ReplanAction::Replenish { quantity })
                    }
                    Err(reason) => {
                        tracing::warn!(
                            order_id = %draft.order.order_id,
                            reason = %reason,
                            "自动补料扣减库存失败，停线转质检"
                        );
                        let (event, unrecorded) = self.ledger.report_capped(
                            draft,
                            good_delta,
                            waste_delta,
                            waste_reason,
                            now,
                        )?;
                        self.halt(draft, now);
                        let action = ReplanAction::HaltAndFinish {
                            reason: HALT_REASON_INVENTORY_UNAVAILABLE.to_string(),
                        };
                        (event, unrecorded, action)
                    }
                }
            }
            ReplanAction::ExpandPendingConfirmation { quantity } => {
                let (event, unrecorded) =
                    self.ledger
                        .report_capped(draft, good_delta, waste_delta, waste_reason, now)?;
                self.replan
                    .propose_expansion(draft, quantity, waste_delta, now);
                (event, unrecorded, ReplanAction::ExpandPendingConfirmation { quantity })
            }
            other => {
                let (event, unrecorded) =
                    self.ledger
                        .report_capped(draft, good_delta, waste_delta, waste_reason, now)?;
                if matches!(other, ReplanAction::HaltAndFinish { .. }) {
                    self.halt(draft, now);
                }
                (event, unrecorded, other)
            }
        };

        tracing::info!(
            order_id = %draft.order.order_id,
            action = action.as_str(),
            shortfall,
            overflow,
            unrecorded_waste = unrecorded,
            available_stock = ?available_stock,
            "废品溢出上限，重排决策"
        );

        let decision = ReplanDecision {
            order_id: draft.order.order_id.clone(),
            trigger_waste_quantity: waste_delta,
            action,
            available_stock,
            unrecorded_waste_quantity: unrecorded,
            decided_at: now,
        };
        Ok((event, decision))
    }

    fn halt(&self, draft: &mut OrderAggregate, now: NaiveDateTime) {
        // 调用方已校验草稿处于产线状态
        if let Err(e) = self.state_machine.halt(draft, now) {
            tracing::error!(order_id = %draft.order.order_id, error = %e, "停线失败");
        }
    }

    async fn read_available_stock(&self, order: &ProductionOrder) -> Option<f64> {
        let timeout = Duration::from_millis(self.config.inventory_timeout_ms);
        match tokio::time::timeout(timeout, self.inventory.available_stock(&order.input_ids)).await
        {
            Ok(Ok(stock)) => Some(limiting_stock(&order.input_ids, &stock)),
            Ok(Err(e)) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "库存查询失败");
                None
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %order.order_id,
                    timeout_ms = self.config.inventory_timeout_ms,
                    "库存查询超时"
                );
                None
            }
        }
    }

    async fn consume_stock(&self, order: &ProductionOrder, quantity: f64) -> Result<(), String> {
        let timeout = Duration::from_millis(self.config.inventory_timeout_ms);
        match tokio::time::timeout(
            timeout,
            self.inventory
                .consume_stock(&order.order_id, &order.input_ids, quantity),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("库存扣减超时({}ms)", self.config.inventory_timeout_ms)),
        }
    }

    async fn apply_disposition(&self, disposition: &Disposition) -> Result<(), String> {
        let timeout = Duration::from_millis(self.config.inventory_timeout_ms);
        match tokio::time::timeout(timeout, self.inventory.apply_disposition(disposition)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("库存处置写入超时({}ms)", self.config.inventory_timeout_ms)),
        }
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn lookup_slot(&self, order_id: &str) -> Option<Arc<OrderSlot>> {
        self.orders
            .read()
            .ok()
            .and_then(|orders| orders.get(order_id).cloned())
    }

    /// 获取订单单元（内存中没有则从数据库加载）
    fn slot(&self, order_id: &str) -> ApiResult<Arc<OrderSlot>> {
        Self::require_order_id(order_id)?;
        if let Some(slot) = self.lookup_slot(order_id) {
            return Ok(slot);
        }

        let agg = self
            .order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("订单{}不存在", order_id)))?;

        let mut orders = self
            .orders
            .write()
            .map_err(|e| ApiError::InternalError(format!("订单注册表锁获取失败: {}", e)))?;
        Ok(orders
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(OrderSlot::new(agg)))
            .clone())
    }

    /// 草稿落库后替换内存状态
    fn commit(
        &self,
        slot: &OrderSlot,
        current: &mut OrderAggregate,
        draft: OrderAggregate,
        report: Option<&ReportEvent>,
        now: NaiveDateTime,
    ) -> ApiResult<()> {
        self.order_repo.persist(&draft, report).map_err(|e| {
            tracing::error!(order_id = %draft.order.order_id, error = %e, "订单落库失败，变更未生效");
            ApiError::from(e)
        })?;
        *current = draft;
        slot.store_snapshot(self.build_status(current, now));
        Ok(())
    }

    fn reject(&self, error: ExecutionError, agg: &OrderAggregate) -> ApiError {
        tracing::info!(
            order_id = %agg.order.order_id,
            state = %agg.order.state,
            code = error.code(),
            error = %error,
            "请求被拒绝"
        );
        ApiError::rejected(error, agg)
    }

    fn emit(&self, event: ExecutionEvent) {
        self.events.publish(&event);
    }

    fn emit_replan(&self, decision: &ReplanDecision, agg: &OrderAggregate) {
        let order_id = &decision.order_id;
        self.emit(
            ExecutionEvent::new(
                order_id,
                ActionType::Replan,
                SYSTEM_ACTOR,
                decision.decided_at,
                format!("订单{}重排决策: {}", order_id, decision.action.as_str()),
            )
            .with_payload(decision),
        );

        if let ReplanAction::HaltAndFinish { reason } = &decision.action {
            self.emit(ExecutionEvent::new(
                order_id,
                ActionType::Halt,
                SYSTEM_ACTOR,
                decision.decided_at,
                format!(
                    "订单{}停线转质检 ({})，封顶良品{}，废品{}",
                    order_id,
                    reason,
                    agg.order.produced_good_quantity,
                    agg.order.produced_waste_quantity
                ),
            ));
        }
    }

    fn compute_oee(&self, agg: &OrderAggregate, now: NaiveDateTime) -> OeeSnapshot {
        OeeCalculator::compute(&OeeInput {
            running_seconds: self.timer.elapsed_seconds(agg, now),
            pause_seconds: self.timer.pause_seconds(agg, now),
            good_quantity: agg.order.produced_good_quantity,
            waste_quantity: agg.order.produced_waste_quantity,
            target_rate: agg.order.target_rate,
        })
    }

    fn build_status(&self, agg: &OrderAggregate, now: NaiveDateTime) -> OrderStatus {
        let order = &agg.order;
        OrderStatus {
            order_id: order.order_id.clone(),
            state: order.state,
            elapsed_seconds: self.timer.elapsed_seconds(agg, now),
            pause_seconds: self.timer.pause_seconds(agg, now),
            good: order.produced_good_quantity,
            waste: order.produced_waste_quantity,
            planned_quantity: order.planned_quantity,
            effective_ceiling: order.effective_ceiling(),
            paused: agg.is_paused(),
            current_pause_reason: order.current_pause_reason.clone(),
            halted: order.halted,
            pending_expansion: agg.pending_expansion.clone(),
            oee_snapshot: self.compute_oee(agg, now),
            as_of: now,
            from_cache: false,
        }
    }

    fn require_order_id(order_id: &str) -> ApiResult<()> {
        if order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("订单ID不能为空".to_string()));
        }
        Ok(())
    }

    fn validate_new_order(new_order: &NewProductionOrder) -> ApiResult<()> {
        Self::require_order_id(&new_order.order_id)?;
        if new_order.product_ref.trim().is_empty() {
            return Err(ApiError::InvalidInput("产品编码不能为空".to_string()));
        }
        if !new_order.planned_quantity.is_finite() || new_order.planned_quantity <= 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "计划数量必须大于0: {}",
                new_order.planned_quantity
            )));
        }
        if !new_order.target_rate.is_finite() || new_order.target_rate <= 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "目标速率必须大于0: {}",
                new_order.target_rate
            )));
        }
        if let Some(max) = new_order.max_producible_quantity {
            if !max.is_finite() || max < 0.0 {
                return Err(ApiError::InvalidInput(format!(
                    "可生产上限不能为负: {}",
                    max
                )));
            }
        }
        if new_order.input_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ApiError::InvalidInput("投入物料ID不能为空".to_string()));
        }
        Ok(())
    }
}
