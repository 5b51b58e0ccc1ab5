mod config;
mod connection;
mod sim_time;

use std::net::Ipv4Addr;

use crate::net::NetApi;
use crate::net::segment::TcpHeader;
use crate::sim::Simulator;

/// 记录所有发出的报文段，不做任何投递
#[derive(Debug, Default)]
pub(crate) struct CaptureNet {
    pub sent: Vec<(Vec<u8>, Ipv4Addr, Ipv4Addr)>,
}

impl CaptureNet {
    /// 已发出报文段的头部与载荷
    pub fn segments(&self) -> Vec<(TcpHeader, Vec<u8>)> {
        self.sent
            .iter()
            .map(|(raw, _, _)| {
                let h = TcpHeader::decode(raw).expect("captured segment decodes");
                (h, raw[h.header_len()..].to_vec())
            })
            .collect()
    }

    pub fn take(&mut self) -> Vec<(TcpHeader, Vec<u8>)> {
        let out = self.segments();
        self.sent.clear();
        out
    }
}

impl NetApi for CaptureNet {
    fn send(&mut self, segment: Vec<u8>, src: Ipv4Addr, dst: Ipv4Addr, _sim: &mut Simulator) {
        self.sent.push((segment, src, dst));
    }
}
