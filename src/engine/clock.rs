// ==========================================
// 生产执行引擎 - 时钟
// ==========================================
// 职责: 为计时器提供当前时间（UTC，秒精度）
// 说明: 计时基于时间戳推算，不依赖前端秒表累加
// ==========================================

use chrono::{NaiveDateTime, Timelike, Utc};
use std::sync::Mutex;

/// 时钟 Trait
pub trait Clock: Send + Sync {
    /// 当前时间（UTC，截断到秒）
    fn now(&self) -> NaiveDateTime;
}

/// 系统时钟
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// 手动时钟（测试/回放用）
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// 前进指定秒数
    pub fn advance_seconds(&self, seconds: i64) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard += chrono::Duration::seconds(seconds);
    }

    pub fn set(&self, at: NaiveDateTime) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
