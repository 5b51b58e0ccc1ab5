//! 连接状态机
//!
//! 一个 `Connection` 对应一个四元组，负责：
//! - 序列号记账（send_seq / send_base / recv_next / last_ack_sent）
//! - 只按序交付（不缓存乱序数据，依赖对端重传）
//! - 在途队列 + 待发队列，累计 ACK 一次可确认多个报文段
//! - Karn 算法下的 RTT 采样与 RTO
//! - 发送窗口：每确认一个窗口的字节增长一个 MSS，超时减半（不低于一个 MSS）
//! - 每个连接最多一个存活的重传定时器

use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, info, trace, warn};

use super::config::TcpConfig;
use super::error::TcpError;
use super::events::TcpRto;
use super::rtt::RttEstimator;
use super::seq::{seq_gt, seq_leq};
use crate::net::NetApi;
use crate::net::segment::{Flags, TcpHeader, build_segment};
use crate::sim::{EventId, SimTime, Simulator};
use crate::trace::{TraceEventKind, TraceTcp};

/// 应用层数据回调：收到按序、去重后的新数据时调用；空切片表示对端结束发送。
pub type DataCallback = Box<dyn FnMut(&ConnectionId, &[u8], &mut Simulator)>;
/// 新连接被接受时调用，应用层借此注册数据回调。
pub type AcceptCallback = Box<dyn FnMut(&mut Connection)>;

/// 连接标识：从接收端看的四元组（src = 对端，dst = 本端）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub src_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_addr: Ipv4Addr,
    pub dst_port: u16,
}

impl ConnectionId {
    pub fn new(src_addr: Ipv4Addr, src_port: u16, dst_addr: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            src_addr,
            src_port,
            dst_addr,
            dst_port,
        }
    }

    pub fn local_addr(&self) -> Ipv4Addr {
        self.dst_addr
    }

    pub fn local_port(&self) -> u16 {
        self.dst_port
    }

    pub fn remote_addr(&self) -> Ipv4Addr {
        self.src_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.src_port
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port
        )
    }
}

/// 解码后的入站报文段（头部字段 + 载荷）
#[derive(Debug, Clone, Copy)]
pub struct InboundSegment<'a> {
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub payload: &'a [u8],
}

/// 连接统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnStats {
    /// 首次发送的数据段个数
    pub data_segments_sent: u64,
    /// 首次发送的数据字节数
    pub data_bytes_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_sent: u64,
    pub bytes_delivered: u64,
    /// 被丢弃的乱序/重复载荷
    pub out_of_order_dropped: u64,
    pub rtt_samples: u64,
}

#[derive(Debug, Clone)]
struct OutSegment {
    seq: u32,
    payload: Vec<u8>,
    sent_at: SimTime,
    retransmitted: bool,
}

impl OutSegment {
    fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    fn end(&self) -> u32 {
        self.seq.wrapping_add(self.len())
    }
}

pub struct Connection {
    id: ConnectionId,
    cfg: TcpConfig,
    isn: u32,
    peer_isn: u32,

    // sender
    send_seq: u32,
    send_base: u32,
    send_window: u64,
    window_credit: u64,
    in_flight: VecDeque<OutSegment>,
    in_flight_bytes: u64,
    pending: VecDeque<OutSegment>,
    rtt: RttEstimator,
    rto_timer: Option<EventId>,
    retransmitting: bool,

    // receiver
    recv_next: u32,
    last_ack_sent: u32,
    peer_fin: bool,

    closed: bool,
    on_data: Option<DataCallback>,
    stats: ConnStats,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("send_seq", &self.send_seq)
            .field("send_base", &self.send_base)
            .field("recv_next", &self.recv_next)
            .field("send_window", &self.send_window)
            .field("in_flight_bytes", &self.in_flight_bytes)
            .field("pending", &self.pending.len())
            .field("retransmitting", &self.retransmitting)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// 握手完成时创建连接。
    ///
    /// `isn` 是本端 SYN 占用的序列号，第一个数据字节为 `isn + 1`；
    /// `peer_isn` 是对端 SYN 的序列号。
    pub fn new(id: ConnectionId, isn: u32, peer_isn: u32, cfg: TcpConfig) -> Self {
        let first = isn.wrapping_add(1);
        let recv_next = peer_isn.wrapping_add(1);
        Self {
            id,
            isn,
            peer_isn,
            send_seq: first,
            send_base: first,
            send_window: cfg.init_window_bytes(),
            window_credit: 0,
            in_flight: VecDeque::new(),
            in_flight_bytes: 0,
            pending: VecDeque::new(),
            rtt: RttEstimator::from_config(&cfg),
            rto_timer: None,
            retransmitting: false,
            recv_next,
            last_ack_sent: recv_next,
            peer_fin: false,
            closed: false,
            on_data: None,
            stats: ConnStats::default(),
            cfg,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn isn(&self) -> u32 {
        self.isn
    }

    pub fn peer_isn(&self) -> u32 {
        self.peer_isn
    }

    pub fn send_seq(&self) -> u32 {
        self.send_seq
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn recv_next(&self) -> u32 {
        self.recv_next
    }

    pub fn last_ack_sent(&self) -> u32 {
        self.last_ack_sent
    }

    pub fn send_window(&self) -> u64 {
        self.send_window
    }

    pub fn in_flight_bytes(&self) -> u64 {
        self.in_flight_bytes
    }

    pub fn in_flight_segments(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn is_retransmitting(&self) -> bool {
        self.retransmitting
    }

    /// 当前重传定时器（若已调度）
    pub fn retransmit_timer(&self) -> Option<EventId> {
        self.rto_timer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 对端是否已经结束发送（收到过 FIN）
    pub fn peer_finished(&self) -> bool {
        self.peer_fin
    }

    /// 所有已产生的数据都已被确认
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }

    pub fn stats(&self) -> &ConnStats {
        &self.stats
    }

    /// 注册数据回调（覆盖旧的）
    pub fn on_data_received(&mut self, cb: impl FnMut(&ConnectionId, &[u8], &mut Simulator) + 'static) {
        self.on_data = Some(Box::new(cb));
    }

    // ---------------------------------------------------------------------
    // 应用层接口
    // ---------------------------------------------------------------------

    /// 按 MSS 切分并发送；窗口放不下的段进入待发队列。
    ///
    /// 序列号在切分时分配，与是否立即上线无关。
    #[tracing::instrument(skip(self, data, sim, net), fields(conn = %self.id, len = data.len()))]
    pub fn send(&mut self, data: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        if self.closed {
            return Err(TcpError::Closed(self.id));
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut transmitted = false;
        for chunk in data.chunks(self.cfg.mss.max(1)) {
            let seg = OutSegment {
                seq: self.send_seq,
                payload: chunk.to_vec(),
                sent_at: sim.now(),
                retransmitted: false,
            };
            self.send_seq = seg.end();

            let fits = self.in_flight_bytes + seg.len() as u64 <= self.send_window;
            if self.pending.is_empty() && fits {
                self.transmit(seg, sim, net);
                transmitted = true;
            } else {
                trace!(seq = seg.seq, len = seg.len(), "窗口已满，进入待发队列");
                self.pending.push_back(seg);
            }
        }

        debug!(
            send_seq = self.send_seq,
            in_flight_bytes = self.in_flight_bytes,
            send_window = self.send_window,
            pending = self.pending.len(),
            "应用数据已切分"
        );

        if transmitted && !self.timer_live(sim) {
            self.arm_timer(sim);
        }
        Ok(())
    }

    /// 发送一个 FIN 并停止一切自动发送。
    ///
    /// 单向关闭：不等待对端的 FIN/ACK，不重传 FIN。重复调用无效果。
    #[tracing::instrument(skip(self, sim, net), fields(conn = %self.id))]
    pub fn close(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        if self.closed {
            return;
        }
        self.cancel_timer(sim);
        self.emit(self.send_seq, Flags::FIN | Flags::ACK, &[], sim, net);
        self.send_seq = self.send_seq.wrapping_add(1);
        self.closed = true;
        if !self.is_idle() {
            warn!(
                in_flight = self.in_flight.len(),
                pending = self.pending.len(),
                "关闭时仍有未确认数据，不再重传"
            );
        }
        info!("🔚 连接已关闭（已发送 FIN）");
    }

    /// 不发任何报文段地丢弃连接（取消定时器）。
    pub fn abort(&mut self, sim: &mut Simulator) {
        self.cancel_timer(sim);
        self.in_flight.clear();
        self.in_flight_bytes = 0;
        self.pending.clear();
        self.closed = true;
        debug!(conn = %self.id, "连接被丢弃");
    }

    // ---------------------------------------------------------------------
    // 入站处理
    // ---------------------------------------------------------------------

    #[tracing::instrument(skip(self, seg, sim, net), fields(conn = %self.id, seq = seg.seq, ack = seg.ack, flags = ?seg.flags, len = seg.payload.len()))]
    pub fn on_segment(&mut self, seg: &InboundSegment<'_>, sim: &mut Simulator, net: &mut dyn NetApi) {
        if self.closed {
            trace!("连接已关闭，忽略报文段");
            return;
        }

        if seg.flags.ack() {
            self.process_ack(seg.ack, sim, net);
        }

        if seg.flags.fin() {
            self.on_fin(seg, sim, net);
            return;
        }

        if seg.seq == self.recv_next {
            let len = seg.payload.len() as u32;
            self.recv_next = self.recv_next.wrapping_add(len);
            self.last_ack_sent = self.recv_next;
            if len > 0 {
                debug!(recv_next = self.recv_next, "📥 按序数据，交付应用层");
                self.deliver(seg.payload, sim);
                self.send_ack(sim, net);
            }
        } else if !seg.payload.is_empty() {
            // 乱序或重复：不交付，重发当前累计 ACK（对端的 ACK 可能丢了）
            debug!(recv_next = self.recv_next, "乱序/重复载荷，丢弃");
            self.stats.out_of_order_dropped += 1;
            self.send_ack(sim, net);
        }
    }

    fn on_fin(&mut self, seg: &InboundSegment<'_>, sim: &mut Simulator, net: &mut dyn NetApi) {
        let len = seg.payload.len() as u32;
        let fin_next = seg.seq.wrapping_add(len).wrapping_add(1);

        if !self.peer_fin && seg.seq == self.recv_next {
            if len > 0 {
                self.deliver(seg.payload, sim);
            }
            self.recv_next = fin_next;
            self.last_ack_sent = fin_next;
            self.peer_fin = true;
            info!("📪 对端结束发送");
            self.deliver(&[], sim);
        } else if self.peer_fin && fin_next == self.recv_next {
            debug!("重复的 FIN，重新确认");
        } else {
            debug!(recv_next = self.recv_next, "FIN 之前还有缺失数据，丢弃");
            self.stats.out_of_order_dropped += 1;
        }
        self.send_ack(sim, net);
    }

    fn deliver(&mut self, payload: &[u8], sim: &mut Simulator) {
        self.stats.bytes_delivered += payload.len() as u64;
        match self.on_data.as_mut() {
            Some(cb) => cb(&self.id, payload, sim),
            None => trace!(len = payload.len(), "没有注册数据回调，数据被丢弃"),
        }
    }

    /// 累计 ACK 处理
    fn process_ack(&mut self, ack: u32, sim: &mut Simulator, net: &mut dyn NetApi) {
        if !seq_gt(ack, self.send_base) {
            return;
        }
        if seq_gt(ack, self.send_seq) {
            warn!(ack, send_seq = self.send_seq, "ACK 超出已发送范围，忽略");
            return;
        }

        let now = sim.now();
        self.send_base = ack;
        self.cancel_timer(sim);
        self.trace_tcp(net, now, TraceEventKind::TcpRecvAck, None, None, Some(ack));

        let mut retired: u64 = 0;
        let mut newest: Option<OutSegment> = None;
        while let Some(seg) = self.in_flight.pop_front() {
            if !seq_leq(seg.end(), ack) {
                self.in_flight.push_front(seg);
                break;
            }
            self.in_flight_bytes -= seg.len() as u64;
            retired += seg.len() as u64;
            newest = Some(seg);
        }
        // 超时缩窗时退回待发队列的段，可能已被对端收到
        while let Some(seg) = self.pending.pop_front() {
            if !seq_leq(seg.end(), ack) {
                self.pending.push_front(seg);
                break;
            }
            retired += seg.len() as u64;
        }

        // Karn：重传过的段不参与 RTT 采样
        if !self.retransmitting {
            if let Some(seg) = newest.as_ref().filter(|s| !s.retransmitted) {
                let sample = now.saturating_sub(seg.sent_at);
                let rto = self.rtt.sample(sample);
                self.stats.rtt_samples += 1;
                trace!(?sample, ?rto, "RTT 采样");
                if net.tracing_enabled() {
                    let srtt = self.rtt.srtt().unwrap_or(sample);
                    net.trace(
                        now,
                        TraceEventKind::TcpRttSample {
                            conn: self.id.to_string(),
                            sample_ns: sample.0,
                            srtt_ns: srtt.0,
                            rto_ns: rto.0,
                        },
                    );
                }
            }
        }

        self.window_credit += retired;
        if self.window_credit >= self.send_window {
            self.send_window += self.cfg.mss_bytes();
            self.window_credit = 0;
            debug!(send_window = self.send_window, "发送窗口增长");
            self.trace_window(net, now);
        }

        self.retransmitting = false;
        self.fill_window(sim, net);

        if !self.in_flight.is_empty() {
            self.arm_timer(sim);
        }

        debug!(
            ack,
            retired,
            in_flight_bytes = self.in_flight_bytes,
            pending = self.pending.len(),
            "ACK 已处理"
        );
    }

    /// 在窗口允许的范围内把待发段移入在途队列
    fn fill_window(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        while let Some(seg) = self.pending.pop_front() {
            if self.in_flight_bytes + seg.len() as u64 > self.send_window {
                self.pending.push_front(seg);
                break;
            }
            self.transmit(seg, sim, net);
        }
    }

    // ---------------------------------------------------------------------
    // 超时
    // ---------------------------------------------------------------------

    /// 重传定时器到期：窗口减半（不低于一个 MSS），只重传最早的未确认段，并重新计时。
    #[tracing::instrument(skip(self, sim, net), fields(conn = %self.id))]
    pub fn on_timeout(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        self.cancel_timer(sim);
        if self.closed || self.in_flight.is_empty() {
            return;
        }

        let now = sim.now();
        self.stats.timeouts += 1;

        let mss = self.cfg.mss_bytes();
        self.send_window = (self.send_window / 2).max(mss);
        self.window_credit = 0;
        // 缩窗后放不下的尾部段退回待发队列，保持在途字节不超过窗口
        while self.in_flight_bytes > self.send_window && self.in_flight.len() > 1 {
            let Some(mut seg) = self.in_flight.pop_back() else {
                break;
            };
            self.in_flight_bytes -= seg.len() as u64;
            seg.retransmitted = true;
            self.pending.push_front(seg);
        }
        self.trace_window(net, now);
        self.retransmitting = true;

        let head = match self.in_flight.front_mut() {
            Some(head) => {
                head.retransmitted = true;
                head.sent_at = now;
                head.clone()
            }
            None => return,
        };
        warn!(
            seq = head.seq,
            len = head.len(),
            send_window = self.send_window,
            rto = ?self.rtt.rto(),
            "⏰ RTO 超时，重传最早未确认段"
        );
        self.trace_tcp(net, now, TraceEventKind::TcpRto, Some(head.seq), Some(head.len()), None);
        self.emit(head.seq, Flags::ACK, &head.payload, sim, net);
        self.stats.retransmissions += 1;
        self.trace_tcp(
            net,
            now,
            TraceEventKind::TcpRetransmit,
            Some(head.seq),
            Some(head.len()),
            Some(self.last_ack_sent),
        );

        // 对端一直不响应时也要持续重试
        self.arm_timer(sim);
    }

    // ---------------------------------------------------------------------
    // 发送辅助
    // ---------------------------------------------------------------------

    /// 把一个段放上线并加入在途队列
    fn transmit(&mut self, mut seg: OutSegment, sim: &mut Simulator, net: &mut dyn NetApi) {
        let now = sim.now();
        seg.sent_at = now;
        self.emit(seg.seq, Flags::ACK, &seg.payload, sim, net);

        let kind = if seg.retransmitted {
            self.stats.retransmissions += 1;
            TraceEventKind::TcpRetransmit
        } else {
            self.stats.data_segments_sent += 1;
            self.stats.data_bytes_sent += seg.len() as u64;
            TraceEventKind::TcpSendData
        };
        self.trace_tcp(net, now, kind, Some(seg.seq), Some(seg.len()), Some(self.last_ack_sent));

        self.in_flight_bytes += seg.len() as u64;
        self.in_flight.push_back(seg);
    }

    /// 纯 ACK：seq = send_seq，ack = last_ack_sent
    pub(crate) fn send_ack(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        self.emit(self.send_seq, Flags::ACK, &[], sim, net);
        self.stats.acks_sent += 1;
        let now = sim.now();
        self.trace_tcp(net, now, TraceEventKind::TcpSendAck, None, None, Some(self.last_ack_sent));
    }

    /// 握手应答：seq = ISN，ack = 对端 ISN + 1
    pub(crate) fn send_syn_ack(&self, sim: &mut Simulator, net: &mut dyn NetApi) {
        self.emit(self.isn, Flags::SYN | Flags::ACK, &[], sim, net);
    }

    fn emit(&self, seq: u32, flags: Flags, payload: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) {
        let header = TcpHeader::new(self.id.local_port(), self.id.remote_port(), seq, self.last_ack_sent, flags)
            .with_window(self.cfg.recv_window);
        let raw = build_segment(&header, payload, self.id.local_addr(), self.id.remote_addr());
        trace!(seq, ack = self.last_ack_sent, ?flags, len = payload.len(), "发送报文段");
        net.send(raw, self.id.local_addr(), self.id.remote_addr(), sim);
    }

    fn timer_live(&self, sim: &Simulator) -> bool {
        self.rto_timer.is_some_and(|t| sim.is_pending(t))
    }

    /// 以当前 RTO 重新计时（先取消旧定时器，保证最多一个）
    fn arm_timer(&mut self, sim: &mut Simulator) {
        self.cancel_timer(sim);
        let rto = self.rtt.rto();
        self.rto_timer = Some(sim.schedule_in(rto, TcpRto { id: self.id }));
        trace!(?rto, "重传定时器已启动");
    }

    fn cancel_timer(&mut self, sim: &mut Simulator) {
        if let Some(t) = self.rto_timer.take() {
            sim.cancel(t);
        }
    }

    fn trace_tcp(
        &self,
        net: &mut dyn NetApi,
        at: SimTime,
        make: fn(TraceTcp) -> TraceEventKind,
        seq: Option<u32>,
        len: Option<u32>,
        ack: Option<u32>,
    ) {
        if !net.tracing_enabled() {
            return;
        }
        let tcp = TraceTcp {
            conn: self.id.to_string(),
            seq,
            len,
            ack,
        };
        net.trace(at, make(tcp));
    }

    fn trace_window(&self, net: &mut dyn NetApi, at: SimTime) {
        if net.tracing_enabled() {
            net.trace(
                at,
                TraceEventKind::TcpWindow {
                    conn: self.id.to_string(),
                    send_window: self.send_window,
                    in_flight_bytes: self.in_flight_bytes,
                },
            );
        }
    }
}
