// ==========================================
// 生产执行引擎 - OEE 计算器
// ==========================================
// 职责: 可用率 × 性能 × 质量
// 输入: 运行秒数、暂停秒数、良品、废品、目标速率
// 红线: 纯函数，只从已存储计数器推导，不维护独立累计值
// ==========================================

use serde::{Deserialize, Serialize};

/// OEE 快照（派生值，不持久化）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OeeSnapshot {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

impl OeeSnapshot {
    /// 尚无数据时的快照
    pub fn perfect() -> Self {
        Self {
            availability: 1.0,
            performance: 1.0,
            quality: 1.0,
            oee: 1.0,
        }
    }
}

/// OEE 输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OeeInput {
    pub running_seconds: i64,
    pub pause_seconds: i64,
    pub good_quantity: f64,
    pub waste_quantity: f64,
    pub target_rate: f64, // 件/小时
}

/// OEE 计算器
pub struct OeeCalculator;

impl OeeCalculator {
    /// 计算 OEE 快照
    ///
    /// # 规则
    /// - 分母为 0 时对应因子定义为 1.0
    /// - 各因子先钳位到 [0,1] 再相乘
    /// - 性能上限 1.0，短时超速不会把 OEE 推过 100%
    pub fn compute(input: &OeeInput) -> OeeSnapshot {
        let running = input.running_seconds.max(0) as f64;
        let paused = input.pause_seconds.max(0) as f64;

        let availability = ratio_or_one(running, running + paused);

        let theoretical_quantity = input.target_rate * (running / 3600.0);
        let performance = ratio_or_one(input.good_quantity, theoretical_quantity);

        let total = input.good_quantity + input.waste_quantity;
        let quality = ratio_or_one(input.good_quantity, total);

        let availability = clamp_unit(availability);
        let performance = clamp_unit(performance);
        let quality = clamp_unit(quality);

        OeeSnapshot {
            availability,
            performance,
            quality,
            oee: availability * performance * quality,
        }
    }
}

fn ratio_or_one(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() {
        1.0
    } else {
        numerator / denominator
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
