// ==========================================
// 生产执行引擎 - 领域类型定义
// ==========================================
// 职责: 订单状态、产线、角色、质量判定、暂停原因等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order State)
// ==========================================
// 主状态链: PENDING → PLANNED → {LINE_1, LINE_2} → PACKAGING → QUALITY_CONTROL → COMPLETED
// 暂停不是主状态，由计时器 + current_pause_reason 表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Pending,        // 待计划
    Planned,        // 已计划
    #[serde(rename = "LINE_1")]
    Line1,          // 产线1生产中
    #[serde(rename = "LINE_2")]
    Line2,          // 产线2生产中
    Packaging,      // 包装
    QualityControl, // 质检
    Completed,      // 完成
    Discarded,      // 整单报废
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderState {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(OrderState::Pending),
            "PLANNED" => Some(OrderState::Planned),
            "LINE_1" => Some(OrderState::Line1),
            "LINE_2" => Some(OrderState::Line2),
            "PACKAGING" => Some(OrderState::Packaging),
            "QUALITY_CONTROL" => Some(OrderState::QualityControl),
            "COMPLETED" => Some(OrderState::Completed),
            "DISCARDED" => Some(OrderState::Discarded),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "PENDING",
            OrderState::Planned => "PLANNED",
            OrderState::Line1 => "LINE_1",
            OrderState::Line2 => "LINE_2",
            OrderState::Packaging => "PACKAGING",
            OrderState::QualityControl => "QUALITY_CONTROL",
            OrderState::Completed => "COMPLETED",
            OrderState::Discarded => "DISCARDED",
        }
    }

    /// 是否为产线状态（允许计时/报工/暂停）
    pub fn is_line(&self) -> bool {
        matches!(self, OrderState::Line1 | OrderState::Line2)
    }

    /// 是否为终态（无出边）
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Discarded)
    }

    /// 看板列序号，用于判断前进/后退
    pub fn rank(&self) -> u8 {
        match self {
            OrderState::Pending => 0,
            OrderState::Planned => 1,
            OrderState::Line1 | OrderState::Line2 => 2,
            OrderState::Packaging => 3,
            OrderState::QualityControl => 4,
            OrderState::Completed | OrderState::Discarded => 5,
        }
    }
}

// ==========================================
// 产线 (Production Line)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionLine {
    #[serde(rename = "LINE_1")]
    Line1,
    #[serde(rename = "LINE_2")]
    Line2,
}

impl fmt::Display for ProductionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ProductionLine {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LINE_1" => Some(ProductionLine::Line1),
            "LINE_2" => Some(ProductionLine::Line2),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductionLine::Line1 => "LINE_1",
            ProductionLine::Line2 => "LINE_2",
        }
    }

    /// 产线对应的看板列
    pub fn column(&self) -> OrderState {
        match self {
            ProductionLine::Line1 => OrderState::Line1,
            ProductionLine::Line2 => OrderState::Line2,
        }
    }

    /// 看板列对应的产线
    pub fn from_column(state: OrderState) -> Option<Self> {
        match state {
            OrderState::Line1 => Some(ProductionLine::Line1),
            OrderState::Line2 => Some(ProductionLine::Line2),
            _ => None,
        }
    }
}

// ==========================================
// 操作角色 (Actor Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Operator,          // 操作员
    QualitySupervisor, // 质量主管
    GeneralSupervisor, // 生产主管
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Operator => write!(f, "OPERATOR"),
            ActorRole::QualitySupervisor => write!(f, "QUALITY_SUPERVISOR"),
            ActorRole::GeneralSupervisor => write!(f, "GENERAL_SUPERVISOR"),
        }
    }
}

// ==========================================
// 质量判定类型 (Quality Decision Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityDecisionKind {
    #[serde(rename = "APPROVED")]
    Approved, // 全部放行
    #[serde(rename = "RECHAZO_PARCIAL")]
    PartialReject, // 部分拒收
    #[serde(rename = "CUARENTENA_PARCIAL")]
    PartialQuarantine, // 部分隔离
    #[serde(rename = "MIXTO")]
    Mixed, // 拒收 + 隔离
}

impl fmt::Display for QualityDecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityDecisionKind::Approved => write!(f, "APPROVED"),
            QualityDecisionKind::PartialReject => write!(f, "RECHAZO_PARCIAL"),
            QualityDecisionKind::PartialQuarantine => write!(f, "CUARENTENA_PARCIAL"),
            QualityDecisionKind::Mixed => write!(f, "MIXTO"),
        }
    }
}

impl QualityDecisionKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "APPROVED" => Some(QualityDecisionKind::Approved),
            "RECHAZO_PARCIAL" => Some(QualityDecisionKind::PartialReject),
            "CUARENTENA_PARCIAL" => Some(QualityDecisionKind::PartialQuarantine),
            "MIXTO" => Some(QualityDecisionKind::Mixed),
            _ => None,
        }
    }

    /// 是否涉及拒收数量
    pub fn involves_reject(&self) -> bool {
        matches!(self, QualityDecisionKind::PartialReject | QualityDecisionKind::Mixed)
    }

    /// 是否涉及隔离数量
    pub fn involves_quarantine(&self) -> bool {
        matches!(
            self,
            QualityDecisionKind::PartialQuarantine | QualityDecisionKind::Mixed
        )
    }
}
