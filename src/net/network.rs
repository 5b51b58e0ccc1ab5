//! 模拟网络层
//!
//! 把传输层交来的字节序列经过一条不可靠信道，按到达时间调度 `DeliverSegment` 事件。

use std::net::Ipv4Addr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::api::NetApi;
use super::channel::ChannelConfig;
use super::deliver_segment::DeliverSegment;
use super::stats::NetStats;
use crate::sim::{SimTime, Simulator};
use crate::trace::{TraceEventKind, TraceLogger, TraceSegment};

/// 网络：信道参数 + 随机源 + 统计
pub struct Network {
    cfg: ChannelConfig,
    rng: SmallRng,
    pub stats: NetStats,
    pub trace: Option<TraceLogger>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl Network {
    /// 创建网络；越界的概率被截断到 [0, 1]
    pub fn new(mut cfg: ChannelConfig) -> Self {
        for p in [&mut cfg.loss, &mut cfg.corrupt, &mut cfg.duplicate] {
            *p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        }
        let rng = SmallRng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            rng,
            stats: NetStats::default(),
            trace: None,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.cfg
    }

    fn trace_segment(&mut self, at: SimTime, src: Ipv4Addr, dst: Ipv4Addr, bytes: usize, make: fn(TraceSegment) -> TraceEventKind) {
        if let Some(t) = self.trace.as_mut() {
            let seg = TraceSegment {
                src: src.to_string(),
                dst: dst.to_string(),
                bytes,
            };
            t.push(at.0, make(seg));
        }
    }

    fn arrival_delay(&mut self) -> SimTime {
        let jitter = if self.cfg.jitter.0 > 0 {
            self.rng.gen_range(0..=self.cfg.jitter.0)
        } else {
            0
        };
        SimTime(self.cfg.latency.0.saturating_add(jitter))
    }

    /// 报文段送达目的地址时的统计
    pub(crate) fn on_delivered(&mut self, at: SimTime, src: Ipv4Addr, dst: Ipv4Addr, bytes: usize) {
        self.stats.delivered_segments += 1;
        self.stats.delivered_bytes += bytes as u64;
        self.trace_segment(at, src, dst, bytes, TraceEventKind::Deliver);
    }
}

impl NetApi for Network {
    #[tracing::instrument(skip(self, segment, sim), fields(len = segment.len()))]
    fn send(&mut self, mut segment: Vec<u8>, src: Ipv4Addr, dst: Ipv4Addr, sim: &mut Simulator) {
        let now = sim.now();
        let len = segment.len();
        self.stats.sent_segments += 1;
        self.stats.sent_bytes += len as u64;
        self.trace_segment(now, src, dst, len, TraceEventKind::Transmit);

        if self.rng.gen_bool(self.cfg.loss) {
            debug!("🗑️  信道丢包");
            self.stats.dropped_segments += 1;
            self.trace_segment(now, src, dst, len, TraceEventKind::Drop);
            return;
        }

        if len > 0 && self.rng.gen_bool(self.cfg.corrupt) {
            let idx = self.rng.gen_range(0..len);
            let bit = self.rng.gen_range(0..8u8);
            segment[idx] ^= 1 << bit;
            debug!(idx, bit, "⚡ 信道翻转比特");
            self.stats.corrupted_segments += 1;
            self.trace_segment(now, src, dst, len, TraceEventKind::Corrupt);
        }

        if self.rng.gen_bool(self.cfg.duplicate) {
            debug!("信道复制报文段");
            self.stats.duplicated_segments += 1;
            self.trace_segment(now, src, dst, len, TraceEventKind::Duplicate);
            let delay = self.arrival_delay();
            sim.schedule_in(
                delay,
                DeliverSegment {
                    src,
                    dst,
                    segment: segment.clone(),
                },
            );
        }

        let delay = self.arrival_delay();
        trace!(?delay, "调度报文段到达事件");
        sim.schedule_in(delay, DeliverSegment { src, dst, segment });
    }

    fn tracing_enabled(&self) -> bool {
        self.trace.is_some()
    }

    fn trace(&mut self, at: SimTime, kind: TraceEventKind) {
        if let Some(t) = self.trace.as_mut() {
            t.push(at.0, kind);
        }
    }
}
