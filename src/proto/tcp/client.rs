//! Active-open peer.
//!
//! Sends a SYN (retried on timeout until answered), completes the handshake on
//! the matching SYN+ACK and then hands every segment to its own `Connection`.
//! Data handed to `send` before the handshake finishes is queued and flushed
//! once the connection exists.

use std::net::Ipv4Addr;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, trace, warn};

use super::config::TcpConfig;
use super::conn::{Connection, ConnectionId, DataCallback, InboundSegment};
use super::error::TcpError;
use super::events::TcpRto;
use super::rtt::RttEstimator;
use crate::net::NetApi;
use crate::net::segment::{Flags, TcpHeader, build_segment, verify_checksum};
use crate::sim::{EventId, Simulator};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub syn_sent: u64,
    pub malformed: u64,
    pub bad_checksum: u64,
    /// Segments that did not belong to this client's connection.
    pub ignored: u64,
}

pub struct Client {
    id: ConnectionId,
    cfg: TcpConfig,
    isn: u32,
    syn_timer: Option<EventId>,
    conn: Option<Connection>,
    on_data: Option<DataCallback>,
    backlog: Vec<u8>,
    close_when_drained: bool,
    pub stats: ClientStats,
}

impl Client {
    pub fn new(local_addr: Ipv4Addr, local_port: u16, remote_addr: Ipv4Addr, remote_port: u16, cfg: TcpConfig) -> Self {
        // Seeded apart from the server so the two ends pick different ISNs.
        let isn = SmallRng::seed_from_u64(cfg.isn_seed ^ 0xc11e_47).next_u32();
        Self {
            id: ConnectionId::new(remote_addr, remote_port, local_addr, local_port),
            cfg,
            isn,
            syn_timer: None,
            conn: None,
            on_data: None,
            backlog: Vec::new(),
            close_when_drained: false,
            stats: ClientStats::default(),
        }
    }

    /// Identity as seen by this end (source = server, destination = client).
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn isn(&self) -> u32 {
        self.isn
    }

    pub fn is_established(&self) -> bool {
        self.conn.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Registers the delivery callback. Takes effect on the live connection
    /// or, before the handshake, on the connection once it is created.
    pub fn on_data_received(&mut self, cb: impl FnMut(&ConnectionId, &[u8], &mut Simulator) + 'static) {
        match self.conn.as_mut() {
            Some(conn) => conn.on_data_received(cb),
            None => self.on_data = Some(Box::new(cb)),
        }
    }

    #[tracing::instrument(skip(self, sim, net), fields(conn = %self.id))]
    pub fn connect(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        if self.conn.is_some() {
            return;
        }
        self.send_syn(sim, net);
    }

    fn send_syn(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        let header = TcpHeader::new(self.id.local_port(), self.id.remote_port(), self.isn, 0, Flags::SYN)
            .with_window(self.cfg.recv_window);
        let raw = build_segment(&header, &[], self.id.local_addr(), self.id.remote_addr());
        net.send(raw, self.id.local_addr(), self.id.remote_addr(), sim);
        self.stats.syn_sent += 1;

        if let Some(t) = self.syn_timer.take() {
            sim.cancel(t);
        }
        let rto = RttEstimator::from_config(&self.cfg).rto();
        self.syn_timer = Some(sim.schedule_in(rto, TcpRto { id: self.id }));
        debug!(isn = self.isn, attempt = self.stats.syn_sent, "SYN sent");
    }

    pub fn send(&mut self, data: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        match self.conn.as_mut() {
            Some(conn) => conn.send(data, sim, net),
            None => {
                self.backlog.extend_from_slice(data);
                Ok(())
            }
        }
    }

    pub fn close(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        let conn = self.conn.as_mut().ok_or(TcpError::NotEstablished(self.id))?;
        conn.close(sim, net);
        Ok(())
    }

    /// Closes automatically once every byte handed to `send` is acknowledged.
    pub fn close_when_drained(&mut self) {
        self.close_when_drained = true;
    }

    /// Housekeeping run after every simulator event.
    pub fn poll(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) -> Result<(), TcpError> {
        if !self.close_when_drained || !self.backlog.is_empty() {
            return Ok(());
        }
        let drained = self
            .conn
            .as_ref()
            .is_some_and(|c| c.is_idle() && !c.is_closed());
        if !drained {
            return Ok(());
        }
        info!(conn = %self.id, "all data acknowledged, closing");
        self.close(sim, net)
    }

    #[tracing::instrument(skip(self, raw, sim, net), fields(len = raw.len()))]
    pub fn on_segment(&mut self, src: Ipv4Addr, dst: Ipv4Addr, raw: &[u8], sim: &mut Simulator, net: &mut dyn NetApi) {
        let header = match TcpHeader::decode(raw) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "malformed segment dropped");
                self.stats.malformed += 1;
                return;
            }
        };
        if src != self.id.remote_addr()
            || header.src_port != self.id.remote_port()
            || header.dst_port != self.id.local_port()
        {
            trace!("segment for another connection ignored");
            self.stats.ignored += 1;
            return;
        }
        if !verify_checksum(raw, src, dst) {
            warn!("bad checksum, segment dropped");
            self.stats.bad_checksum += 1;
            return;
        }

        let payload = &raw[header.header_len()..];
        let is_syn_ack = header.flags.contains(Flags::SYN | Flags::ACK);

        match self.conn.as_mut() {
            None if is_syn_ack && header.ack == self.isn.wrapping_add(1) => {
                self.establish(header.seq, sim, net);
            }
            None => {
                trace!(flags = ?header.flags, "not established yet, segment ignored");
                self.stats.ignored += 1;
            }
            Some(conn) if is_syn_ack => {
                // Our handshake ACK was lost.
                if conn.peer_isn() == header.seq {
                    conn.send_ack(sim, net);
                }
            }
            Some(conn) => {
                let seg = InboundSegment {
                    seq: header.seq,
                    ack: header.ack,
                    flags: header.flags,
                    payload,
                };
                conn.on_segment(&seg, sim, net);
            }
        }
    }

    fn establish(&mut self, peer_isn: u32, sim: &mut Simulator, net: &mut dyn NetApi) {
        if let Some(t) = self.syn_timer.take() {
            sim.cancel(t);
        }
        let mut conn = Connection::new(self.id, self.isn, peer_isn, self.cfg.clone());
        if let Some(cb) = self.on_data.take() {
            conn.on_data_received(cb);
        }
        conn.send_ack(sim, net);
        info!(conn = %self.id, peer_isn, "connection established");

        let backlog = std::mem::take(&mut self.backlog);
        if let Err(e) = conn.send(&backlog, sim, net) {
            warn!(error = %e, "flushing queued data failed");
        }
        self.conn = Some(conn);
    }

    pub fn on_timeout(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        match self.conn.as_mut() {
            Some(conn) => conn.on_timeout(sim, net),
            None => {
                self.syn_timer = None;
                debug!("no SYN+ACK yet, retrying");
                self.send_syn(sim, net);
            }
        }
    }
}
