// ==========================================
// 生产执行引擎 - 操作日志领域模型
// ==========================================
// 红线: 每次状态变更、报工、重排决策都必须留痕
// 用途: 审计追踪，通知下游
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,          // 日志ID
    pub order_id: Option<String>,   // 关联订单（系统级操作可为None）
    pub action_type: String,        // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,   // 操作时间戳
    pub actor: String,              // 操作人/角色
    pub payload_json: Option<JsonValue>, // 操作负载 (JSON)
    pub detail: Option<String>,     // 可读描述
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    RegisterOrder,    // 接入订单
    StartTimer,       // 开工计时
    Pause,            // 暂停
    ShiftHandoff,     // 交接班
    Resume,           // 恢复
    Report,           // 报工
    Replan,           // 重排决策
    ConfirmExpansion, // 扩产确认
    MoveOrder,        // 看板移动
    Halt,             // 停线转质检
    QualityDecision,  // 质量判定
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::RegisterOrder => "RegisterOrder",
            ActionType::StartTimer => "StartTimer",
            ActionType::Pause => "Pause",
            ActionType::ShiftHandoff => "ShiftHandoff",
            ActionType::Resume => "Resume",
            ActionType::Report => "Report",
            ActionType::Replan => "Replan",
            ActionType::ConfirmExpansion => "ConfirmExpansion",
            ActionType::MoveOrder => "MoveOrder",
            ActionType::Halt => "Halt",
            ActionType::QualityDecision => "QualityDecision",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RegisterOrder" => Some(ActionType::RegisterOrder),
            "StartTimer" => Some(ActionType::StartTimer),
            "Pause" => Some(ActionType::Pause),
            "ShiftHandoff" => Some(ActionType::ShiftHandoff),
            "Resume" => Some(ActionType::Resume),
            "Report" => Some(ActionType::Report),
            "Replan" => Some(ActionType::Replan),
            "ConfirmExpansion" => Some(ActionType::ConfirmExpansion),
            "MoveOrder" => Some(ActionType::MoveOrder),
            "Halt" => Some(ActionType::Halt),
            "QualityDecision" => Some(ActionType::QualityDecision),
            _ => None,
        }
    }
}

impl ActionLog {
    /// 创建新的操作日志
    pub fn new(
        action_id: String,
        order_id: Option<String>,
        action_type: ActionType,
        actor: String,
        action_ts: NaiveDateTime,
    ) -> Self {
        Self {
            action_id,
            order_id,
            action_type: action_type.as_str().to_string(),
            action_ts,
            actor,
            payload_json: None,
            detail: None,
        }
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
