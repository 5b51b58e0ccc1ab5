//! 信道参数
//!
//! 描述一条不可靠信道：固定时延 + 随机抖动（造成乱序）、丢包、比特翻转、复制。

use crate::sim::SimTime;

/// 不可靠信道配置。概率取值范围为 [0, 1]。
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// 单向传播时延
    pub latency: SimTime,
    /// 每个报文段额外的均匀随机时延上限；非零时会产生乱序
    pub jitter: SimTime,
    /// 丢包概率
    pub loss: f64,
    /// 翻转一个随机比特的概率
    pub corrupt: f64,
    /// 复制一份的概率
    pub duplicate: f64,
    /// 随机数种子（同一种子的仿真可复现）
    pub seed: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            latency: SimTime::from_millis(10),
            jitter: SimTime::ZERO,
            loss: 0.0,
            corrupt: 0.0,
            duplicate: 0.0,
            seed: 1,
        }
    }
}

impl ChannelConfig {
    /// 无损信道（只有传播时延）
    pub fn perfect(latency: SimTime) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// 概率是否都在 [0, 1] 内
    pub fn is_valid(&self) -> bool {
        [self.loss, self.corrupt, self.duplicate]
            .iter()
            .all(|p| (0.0..=1.0).contains(p))
    }
}
