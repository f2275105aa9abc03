use super::core::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::engine::events::{ExecutionEvent, ExecutionEventSink};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// ActionLogSink - 执行事件写入审计表
// ==========================================
pub struct ActionLogSink {
    repo: Arc<ActionLogRepository>,
}

impl ActionLogSink {
    pub fn new(repo: Arc<ActionLogRepository>) -> Self {
        Self { repo }
    }
}

impl ExecutionEventSink for ActionLogSink {
    fn publish(&self, event: &ExecutionEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut log = ActionLog::new(
            event.event_id.clone(),
            Some(event.order_id.clone()),
            event.event_type,
            event.actor.clone(),
            event.occurred_at,
        )
        .with_detail(event.message.clone());
        if !event.payload.is_null() {
            log.payload_json = Some(event.payload.clone());
        }

        self.repo.insert(&log)?;
        Ok(())
    }
}
