// ==========================================
// 生产执行引擎 - 执行事件发布
// ==========================================
// 职责: 定义执行事件与通知/审计接收方 trait，实现依赖倒置
// 红线: 发布失败只记录日志，绝不回滚已完成的状态变更
// ==========================================

use crate::domain::action_log::ActionType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// 执行事件
// ==========================================

/// 执行事件
///
/// 每次状态转换、报工、重排决策都会产生一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_id: String,
    pub order_id: String,
    pub event_type: ActionType,
    /// 操作人/角色（系统动作为 "SYSTEM"）
    pub actor: String,
    pub occurred_at: NaiveDateTime,
    /// 可读描述
    pub message: String,
    pub payload: JsonValue,
}

impl ExecutionEvent {
    pub fn new(
        order_id: &str,
        event_type: ActionType,
        actor: impl Into<String>,
        occurred_at: NaiveDateTime,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            event_type,
            actor: actor.into(),
            occurred_at,
            message: message.into(),
            payload: JsonValue::Null,
        }
    }

    /// 附加负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(JsonValue::Null);
        self
    }
}

// ==========================================
// 事件接收方 Trait
// ==========================================

/// 执行事件接收方（通知/审计）
///
/// # 实现说明
/// - `ActionLogSink` 写入 action_log 表
/// - 外部通知系统可自行实现
pub trait ExecutionEventSink: Send + Sync {
    fn publish(&self, event: &ExecutionEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作接收方
///
/// 用于不需要通知的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl ExecutionEventSink for NoOpEventSink {
    fn publish(&self, event: &ExecutionEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventSink: 跳过事件发布 - order_id={}, event_type={}",
            event.order_id,
            event.event_type.as_str()
        );
        Ok(())
    }
}

/// 事件分发器
///
/// fire-and-forget: 逐个投递，失败只告警
#[derive(Clone, Default)]
pub struct EventFanout {
    sinks: Vec<Arc<dyn ExecutionEventSink>>,
}

impl EventFanout {
    pub fn new(sinks: Vec<Arc<dyn ExecutionEventSink>>) -> Self {
        Self { sinks }
    }

    pub fn add(&mut self, sink: Arc<dyn ExecutionEventSink>) {
        self.sinks.push(sink);
    }

    /// 投递事件，返回投递失败的接收方数量
    pub fn publish(&self, event: &ExecutionEvent) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event) {
                failures += 1;
                tracing::warn!(
                    order_id = %event.order_id,
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "执行事件投递失败（不回滚）"
                );
            }
        }
        failures
    }

    pub fn is_configured(&self) -> bool {
        !self.sinks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct FailingSink;

    impl ExecutionEventSink for FailingSink {
        fn publish(&self, _event: &ExecutionEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("通知通道不可用".into())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl ExecutionEventSink for RecordingSink {
        fn publish(&self, event: &ExecutionEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event.message.clone());
            Ok(())
        }
    }

    fn sample_event() -> ExecutionEvent {
        let ts = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        ExecutionEvent::new("OP-1", ActionType::StartTimer, "OPERATOR", ts, "开工")
    }

    #[test]
    fn test_noop_sink() {
        assert!(NoOpEventSink.publish(&sample_event()).is_ok());
    }

    #[test]
    fn test_fanout_continues_after_failure() {
        let recording = Arc::new(RecordingSink::default());
        let fanout = EventFanout::new(vec![
            Arc::new(FailingSink) as Arc<dyn ExecutionEventSink>,
            recording.clone() as Arc<dyn ExecutionEventSink>,
        ]);

        assert_eq!(fanout.publish(&sample_event()), 1);
        let events = recording.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], "开工");
    }

    #[test]
    fn test_empty_fanout() {
        let fanout = EventFanout::default();
        assert!(!fanout.is_configured());
        assert_eq!(fanout.publish(&sample_event()), 0);
    }
}
