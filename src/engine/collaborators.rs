// ==========================================
// 生产执行引擎 - 外部协作方接口
// ==========================================
// 职责: 角色解析、库存服务、交接班处理的 trait 定义
// 说明: Engine 层定义 trait，外部系统实现（依赖倒置）
// ==========================================

use crate::domain::order::ProductionOrder;
use crate::domain::quality::Disposition;
use crate::domain::types::{ActorRole, OrderState};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Mutex;
use std::time::Duration;

/// 协作方错误（在边界处映射为引擎错误，不外泄）
pub type CollaboratorError = Box<dyn Error + Send + Sync>;

/// 状态转换边 (from → to)
pub type TransitionEdge = (OrderState, OrderState);

// ==========================================
// 角色解析
// ==========================================

/// 角色解析器
///
/// 给定角色，返回该角色允许的看板转换边
pub trait RoleResolver: Send + Sync {
    fn allowed_transitions(&self, role: ActorRole) -> HashSet<TransitionEdge>;
}

/// 默认角色策略
///
/// 所有边均为前进方向，没有任何角色可以后退
#[derive(Debug, Clone, Default)]
pub struct DefaultRolePolicy;

impl DefaultRolePolicy {
    /// 看板图上全部前进边
    pub fn forward_edges() -> Vec<TransitionEdge> {
        use OrderState::*;
        vec![
            (Pending, Planned),
            (Planned, Line1),
            (Planned, Line2),
            (Line1, Packaging),
            (Line2, Packaging),
            (Packaging, QualityControl),
            (QualityControl, Completed),
        ]
    }
}

impl RoleResolver for DefaultRolePolicy {
    fn allowed_transitions(&self, role: ActorRole) -> HashSet<TransitionEdge> {
        use OrderState::*;
        match role {
            ActorRole::Operator => [
                (Planned, Line1),
                (Planned, Line2),
                (Line1, Packaging),
                (Line2, Packaging),
            ]
            .into_iter()
            .collect(),
            ActorRole::QualitySupervisor => [(Packaging, QualityControl), (QualityControl, Completed)]
                .into_iter()
                .collect(),
            ActorRole::GeneralSupervisor => Self::forward_edges().into_iter().collect(),
        }
    }
}

// ==========================================
// 库存服务
// ==========================================

/// 库存服务
///
/// 读: 投入物料可用量；写: 补料扣减、质量处置入库
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// 查询投入物料可用数量
    async fn available_stock(
        &self,
        input_ids: &[String],
    ) -> Result<HashMap<String, f64>, CollaboratorError>;

    /// 扣减补料/扩产所需库存
    async fn consume_stock(
        &self,
        order_id: &str,
        input_ids: &[String],
        quantity: f64,
    ) -> Result<(), CollaboratorError>;

    /// 写入质量处置结果（放行/拒收/隔离）
    async fn apply_disposition(&self, disposition: &Disposition) -> Result<(), CollaboratorError>;
}

/// 订单可用库存 = 各投入物料可用量的最小值（缺失物料按 0 计）
pub fn limiting_stock(input_ids: &[String], stock: &HashMap<String, f64>) -> f64 {
    if input_ids.is_empty() {
        return 0.0;
    }
    input_ids
        .iter()
        .map(|id| stock.get(id).copied().unwrap_or(0.0).max(0.0))
        .fold(f64::INFINITY, f64::min)
}

/// 内存库存（单机运行与测试用）
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    stock: Mutex<HashMap<String, f64>>,
    dispositions: Mutex<Vec<Disposition>>,
    latency: Mutex<Option<Duration>>,
    failing: Mutex<bool>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(entries: &[(&str, f64)]) -> Self {
        let inventory = Self::new();
        for (id, qty) in entries {
            inventory.set_stock(id, *qty);
        }
        inventory
    }

    pub fn set_stock(&self, input_id: &str, quantity: f64) {
        let mut stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());
        stock.insert(input_id.to_string(), quantity);
    }

    pub fn stock_of(&self, input_id: &str) -> f64 {
        let stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());
        stock.get(input_id).copied().unwrap_or(0.0)
    }

    /// 模拟慢调用
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// 模拟服务不可用
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// 已写入的质量处置
    pub fn applied_dispositions(&self) -> Vec<Disposition> {
        self.dispositions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn simulate_call(&self) -> Result<(), CollaboratorError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err("库存服务不可用".into());
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryService for InMemoryInventory {
    async fn available_stock(
        &self,
        input_ids: &[String],
    ) -> Result<HashMap<String, f64>, CollaboratorError> {
        self.simulate_call().await?;
        let stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(input_ids
            .iter()
            .filter_map(|id| stock.get(id).map(|qty| (id.clone(), *qty)))
            .collect())
    }

    async fn consume_stock(
        &self,
        order_id: &str,
        input_ids: &[String],
        quantity: f64,
    ) -> Result<(), CollaboratorError> {
        self.simulate_call().await?;
        let mut stock = self.stock.lock().unwrap_or_else(|e| e.into_inner());

        let available = limiting_stock(input_ids, &stock);
        if available < quantity {
            return Err(format!(
                "库存不足: order_id={}, required={}, available={}",
                order_id, quantity, available
            )
            .into());
        }
        for id in input_ids {
            if let Some(qty) = stock.get_mut(id) {
                *qty -= quantity;
            }
        }
        Ok(())
    }

    async fn apply_disposition(&self, disposition: &Disposition) -> Result<(), CollaboratorError> {
        self.simulate_call().await?;
        self.dispositions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(disposition.clone());
        Ok(())
    }
}

// ==========================================
// 交接班处理
// ==========================================

/// 交接班处理器
///
/// 暂停原因为交接班时，由它接管，而不是普通暂停
pub trait ShiftTransferHandler: Send + Sync {
    fn hand_off(&self, order: &ProductionOrder, reason_code: &str) -> Result<(), CollaboratorError>;
}

/// 空操作交接班处理器
#[derive(Debug, Clone, Default)]
pub struct NoOpShiftTransfer;

impl ShiftTransferHandler for NoOpShiftTransfer {
    fn hand_off(&self, order: &ProductionOrder, reason_code: &str) -> Result<(), CollaboratorError> {
        tracing::debug!(
            order_id = %order.order_id,
            shift = %order.shift,
            reason_code,
            "NoOpShiftTransfer: 跳过交接班处理"
        );
        Ok(())
    }
}
