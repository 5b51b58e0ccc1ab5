//! 连接参数

use crate::sim::SimTime;

#[derive(Debug, Clone, PartialEq)]
pub struct TcpConfig {
    /// MSS（数据段载荷上限，字节）
    pub mss: usize,
    /// 初始发送窗口（单位：MSS 个数，至少 1）
    pub init_window_segments: u32,
    /// 尚无 RTT 采样时使用的 RTO
    pub init_rto: SimTime,
    /// RTO 下限
    pub min_rto: SimTime,
    /// RTO 上限
    pub max_rto: SimTime,
    /// 报文头中通告的窗口字段（不参与流控计算）
    pub recv_window: u16,
    /// 初始序列号生成器的种子
    pub isn_seed: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: 1460,
            init_window_segments: 1,
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_millis(1),
            max_rto: SimTime::from_secs(60),
            recv_window: u16::MAX,
            isn_seed: 0x5eed,
        }
    }
}

impl TcpConfig {
    pub fn mss_bytes(&self) -> u64 {
        self.mss.max(1) as u64
    }

    /// 初始发送窗口（字节），不小于一个 MSS
    pub fn init_window_bytes(&self) -> u64 {
        self.mss_bytes()
            .saturating_mul(self.init_window_segments.max(1) as u64)
    }
}
