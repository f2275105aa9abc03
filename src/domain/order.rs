// ==========================================
// 生产执行引擎 - 生产订单 (OP) 领域模型
// ==========================================
// 职责: 订单主数据、暂停区间、待确认扩产、订单聚合
// 红线: 状态只能经由状态机变更，不存在其他写入路径
// ==========================================

use crate::domain::quality::Disposition;
use crate::domain::types::{OrderState, ProductionLine};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionOrder - 生产订单
// ==========================================
// 对齐: production_order 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrder {
    // ===== 主键与归属 =====
    pub order_id: String,    // 订单ID
    pub product_ref: String, // 产品编码
    pub line: ProductionLine, // 指派产线
    pub shift: String,       // 指派班次
    pub input_ids: Vec<String>, // 投入物料ID列表（用于库存查询）

    // ===== 计划参数 =====
    pub planned_quantity: f64, // 计划数量（可扩产）
    pub target_rate: f64,      // 目标速率 (件/小时)
    pub max_producible_quantity: Option<f64>, // 由投入库存推导的可生产上限
    pub replenished_quantity: f64, // 自动补料累计提升的上限

    // ===== 状态 =====
    pub state: OrderState,
    pub current_pause_reason: Option<String>,
    pub halted: bool, // 停线转质检后不再接受报工

    // ===== 计时 =====
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub accumulated_pause_seconds: i64,

    // ===== 产量 =====
    pub produced_good_quantity: f64,
    pub produced_waste_quantity: f64,

    // ===== 审计 =====
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ProductionOrder {
    /// 基础上限: min(计划数量, 可生产上限)
    pub fn base_ceiling(&self) -> f64 {
        match self.max_producible_quantity {
            Some(max) => self.planned_quantity.min(max),
            None => self.planned_quantity,
        }
    }

    /// 有效上限（含自动补料）
    ///
    /// 扩产确认会直接提升 planned_quantity / max_producible_quantity，
    /// 因此已确认扩产自然体现在 base_ceiling 中
    pub fn effective_ceiling(&self) -> f64 {
        self.base_ceiling() + self.replenished_quantity
    }

    /// 累计产出 (良品 + 废品)
    pub fn cumulative_output(&self) -> f64 {
        self.produced_good_quantity + self.produced_waste_quantity
    }

    /// 距离良品目标还差多少
    ///
    /// 良品目标取基础上限：可生产上限低于计划数量时，以可生产上限为准
    pub fn shortfall(&self) -> f64 {
        self.base_ceiling() - self.produced_good_quantity
    }

    /// 计时器是否已启动
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }
}

// ==========================================
// NewProductionOrder - 订单接入参数
// ==========================================
// 订单 CRUD 属于外部系统，这里只是交接点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductionOrder {
    pub order_id: String,
    pub product_ref: String,
    pub line: ProductionLine,
    pub shift: String,
    pub input_ids: Vec<String>,
    pub planned_quantity: f64,
    pub target_rate: f64,
    pub max_producible_quantity: Option<f64>,
}

impl NewProductionOrder {
    /// 生成 PENDING 状态的订单
    pub fn into_order(self, now: NaiveDateTime) -> ProductionOrder {
        ProductionOrder {
            order_id: self.order_id,
            product_ref: self.product_ref,
            line: self.line,
            shift: self.shift,
            input_ids: self.input_ids,
            planned_quantity: self.planned_quantity,
            target_rate: self.target_rate,
            max_producible_quantity: self.max_producible_quantity,
            replenished_quantity: 0.0,
            state: OrderState::Pending,
            current_pause_reason: None,
            halted: false,
            started_at: None,
            finished_at: None,
            accumulated_pause_seconds: 0,
            produced_good_quantity: 0.0,
            produced_waste_quantity: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// PauseInterval - 暂停区间
// ==========================================
// 对齐: pause_interval 表
// 由状态机在暂停时创建，恢复时关闭
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub order_id: String,
    pub seq: i64, // 订单内序号
    pub reason_code: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>, // null 表示进行中
}

impl PauseInterval {
    /// 已关闭区间的时长（秒）；进行中返回 None
    pub fn duration_seconds(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }
}

// ==========================================
// PendingExpansion - 待操作员确认的扩产
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingExpansion {
    pub quantity: f64,              // 建议扩产数量
    pub trigger_waste_quantity: f64, // 触发本次扩产的废品数量
    pub proposed_at: NaiveDateTime,
}

// ==========================================
// OrderAggregate - 订单聚合
// ==========================================
// 单写者单元: 计时、台账、重排策略都在同一个聚合上操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: ProductionOrder,
    pub pauses: Vec<PauseInterval>,
    pub pending_expansion: Option<PendingExpansion>,
    pub disposition: Option<Disposition>,
}

impl OrderAggregate {
    pub fn new(order: ProductionOrder) -> Self {
        Self {
            order,
            pauses: Vec::new(),
            pending_expansion: None,
            disposition: None,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }

    /// 当前进行中的暂停区间
    pub fn open_pause(&self) -> Option<&PauseInterval> {
        self.pauses.iter().rev().find(|p| p.ended_at.is_none())
    }

    pub fn open_pause_mut(&mut self) -> Option<&mut PauseInterval> {
        self.pauses.iter_mut().rev().find(|p| p.ended_at.is_none())
    }

    pub fn is_paused(&self) -> bool {
        self.open_pause().is_some()
    }

    /// 下一个暂停区间序号
    pub fn next_pause_seq(&self) -> i64 {
        self.pauses.iter().map(|p| p.seq).max().unwrap_or(0) + 1
    }
}
