// ==========================================
// 生产执行引擎 - 操作日志数据仓储
// ==========================================
// 依据: action_log 表
// 红线: 所有状态变更、报工、重排决策必须记录
// ==========================================

mod core;
mod queries;
mod sink;


pub use self::core::ActionLogRepository;
pub use self::sink::ActionLogSink;
