//! 多路分解器（被动打开端）
//!
//! 入站报文段的唯一入口：校验端口与校验和，处理 SYN（握手），
//! 把已建立连接的报文段交给对应的 `Connection`。

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, trace, warn};

use super::config::TcpConfig;
use super::conn::{AcceptCallback, Connection, ConnectionId, InboundSegment};
use super::error::TcpError;
use crate::net::NetApi;
use crate::net::segment::{TcpHeader, verify_checksum};
use crate::sim::Simulator;

/// 多路分解统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    /// 重传的 SYN（SYN+ACK 丢失时对端会重发）
    pub duplicate_syn: u64,
    pub malformed: u64,
    pub wrong_port: u64,
    pub bad_checksum: u64,
    pub unknown_connection: u64,
    pub closed: u64,
    /// 已关闭连接迟到的重复 SYN
    pub stale_syn: u64,
}

/// 记住的最近关闭连接数
const RECENTLY_CLOSED: usize = 16;

pub struct Server {
    addr: Ipv4Addr,
    port: u16,
    cfg: TcpConfig,
    connections: HashMap<ConnectionId, Connection>,
    on_accept: Option<AcceptCallback>,
    isn_rng: SmallRng,
    /// (四元组, 对端 ISN)，用于识别迟到的重复 SYN
    recently_closed: VecDeque<(ConnectionId, u32)>,
    pub stats: ServerStats,
}

impl Server {
    pub fn new(addr: Ipv4Addr, port: u16, cfg: TcpConfig) -> Self {
        let isn_rng = SmallRng::seed_from_u64(cfg.isn_seed);
        Self {
            addr,
            port,
            cfg,
            connections: HashMap::new(),
            on_accept: None,
            isn_rng,
            recently_closed: VecDeque::with_capacity(RECENTLY_CLOSED),
            stats: ServerStats::default(),
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 注册新连接回调（每个新接受的连接调用一次）
    pub fn on_connection_accepted(&mut self, cb: impl FnMut(&mut Connection) + 'static) {
        self.on_accept = Some(Box::new(cb));
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// 网络层交来的原始报文段
    #[tracing::instrument(skip(self, raw, sim, net), fields(len = raw.len()))]
    pub fn on_segment(&mut self, src: Ipv4Addr, dst: Ipv4Addr, raw: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) {
        let header = match TcpHeader::decode(raw) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "报文头无法解析，丢弃");
                self.stats.malformed += 1;
                return;
            }
        };

        if header.dst_port != self.port {
            trace!(dst_port = header.dst_port, "不是本端口的流量，忽略");
            self.stats.wrong_port += 1;
            return;
        }

        if !verify_checksum(raw, src, dst) {
            warn!(%src, src_port = header.src_port, "校验和错误，丢弃报文段");
            self.stats.bad_checksum += 1;
            return;
        }

        let payload = &raw[header.header_len()..];
        let id = ConnectionId::new(src, header.src_port, dst, header.dst_port);

        if header.flags.syn() {
            self.on_syn(id, &header, sim, net);
            return;
        }

        let Some(conn) = self.connections.get_mut(&id) else {
            warn!(conn = %id, "未知连接的报文段，丢弃");
            self.stats.unknown_connection += 1;
            return;
        };
        let seg = InboundSegment {
            seq: header.seq,
            ack: header.ack,
            flags: header.flags,
            payload,
        };
        conn.on_segment(&seg, sim, net);
    }

    fn on_syn(&mut self, id: ConnectionId, header: &TcpHeader, sim: &mut Simulator, net: &mut dyn NetApi) {
        if let Some(existing) = self.connections.get_mut(&id) {
            if existing.peer_isn() == header.seq {
                // 对端没收到 SYN+ACK：原样重发，不建新连接
                debug!(conn = %id, "重复的 SYN，重发 SYN+ACK");
                self.stats.duplicate_syn += 1;
                existing.send_syn_ack(sim, net);
                return;
            }
            info!(conn = %id, "同一四元组的新 SYN，丢弃旧连接");
            existing.abort(sim);
            self.connections.remove(&id);
        } else if self.recently_closed.contains(&(id, header.seq)) {
            debug!(conn = %id, peer_isn = header.seq, "已关闭连接的迟到 SYN，丢弃");
            self.stats.stale_syn += 1;
            return;
        }

        let isn = self.isn_rng.next_u32();
        let mut conn = Connection::new(id, isn, header.seq, self.cfg.clone());
        conn.send_syn_ack(sim, net);
        self.stats.accepted += 1;
        info!(conn = %id, isn, peer_isn = header.seq, "🤝 接受新连接");

        if let Some(cb) = self.on_accept.as_mut() {
            cb(&mut conn);
        }
        self.connections.insert(id, conn);
    }

    /// 连接 `id` 的重传定时器到期；连接已被移除时忽略
    pub fn on_timeout(&mut self, id: &ConnectionId, sim: &mut Simulator, net: &mut dyn NetApi) {
        match self.connections.get_mut(id) {
            Some(conn) => conn.on_timeout(sim, net),
            None => trace!(conn = %id, "过期的定时器，忽略"),
        }
    }

    pub fn send(&mut self, id: &ConnectionId, data: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        self.connections
            .get_mut(id)
            .ok_or(TcpError::UnknownConnection(*id))?
            .send(data, sim, net)
    }

    /// 发送 FIN 并把连接从表中移除
    pub fn close(&mut self, id: &ConnectionId, sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        let mut conn = self
            .connections
            .remove(id)
            .ok_or(TcpError::UnknownConnection(*id))?;
        conn.close(sim, net);
        if self.recently_closed.len() == RECENTLY_CLOSED {
            self.recently_closed.pop_front();
        }
        self.recently_closed.push_back((*id, conn.peer_isn()));
        self.stats.closed += 1;
        Ok(())
    }
}
