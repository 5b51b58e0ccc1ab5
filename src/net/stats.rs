//! 统计信息
//!
//! 定义网络仿真统计数据结构。

/// 网络统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetStats {
    pub sent_segments: u64,
    pub sent_bytes: u64,
    pub dropped_segments: u64,
    pub corrupted_segments: u64,
    pub duplicated_segments: u64,
    pub delivered_segments: u64,
    pub delivered_bytes: u64,
    /// 目的地址没有任何端点
    pub unroutable_segments: u64,
}
