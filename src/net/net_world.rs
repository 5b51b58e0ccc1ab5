//! 网络世界实现
//!
//! 定义网络仿真的世界（World）实现：持有网络和两端的传输层端点，
//! 按地址把报文段、定时器和应用调用路由到对应端点。

use std::any::Any;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

use super::network::Network;
use crate::proto::tcp::{Client, ConnectionId, Server, TcpError};
use crate::sim::{Simulator, World};

/// 一个默认的网络世界实现：被动端（Server）+ 主动端（Client）。
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
    pub server: Option<Server>,
    pub client: Option<Client>,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self {
            net,
            server: None,
            client: None,
        }
    }

    /// 报文段到达 `dst`
    pub(crate) fn deliver(&mut self, src: Ipv4Addr, dst: Ipv4Addr, segment: Vec<u8>, sim: &mut Simulator) {
        self.net.on_delivered(sim.now(), src, dst, segment.len());

        if let Some(server) = self.server.as_mut().filter(|s| s.addr() == dst) {
            server.on_segment(src, dst, &segment, sim, &mut self.net);
        } else if let Some(client) = self.client.as_mut().filter(|c| c.id().local_addr() == dst) {
            client.on_segment(src, dst, &segment, sim, &mut self.net);
        } else {
            debug!(%src, %dst, "目的地址没有端点，丢弃");
            self.net.stats.unroutable_segments += 1;
        }
    }

    /// 连接 `id` 的重传定时器到期
    pub(crate) fn on_tcp_timeout(&mut self, id: ConnectionId, sim: &mut Simulator) {
        if let Some(server) = self.server.as_mut().filter(|s| s.addr() == id.local_addr()) {
            server.on_timeout(&id, sim, &mut self.net);
        } else if let Some(client) = self.client.as_mut().filter(|c| *c.id() == id) {
            client.on_timeout(sim, &mut self.net);
        }
    }

    /// 应用层发送（由 `AppSend` 事件驱动）
    pub(crate) fn app_send(&mut self, id: ConnectionId, data: &[u8], sim: &mut Simulator) -> Result<(), TcpError> {
        if let Some(server) = self.server.as_mut().filter(|s| s.addr() == id.local_addr()) {
            server.send(&id, data, sim, &mut self.net)
        } else if let Some(client) = self.client.as_mut().filter(|c| *c.id() == id) {
            client.send(data, sim, &mut self.net)
        } else {
            Err(TcpError::UnknownConnection(id))
        }
    }

    /// 应用层关闭（由 `AppClose` 事件驱动）
    pub(crate) fn app_close(&mut self, id: ConnectionId, sim: &mut Simulator) -> Result<(), TcpError> {
        if let Some(server) = self.server.as_mut().filter(|s| s.addr() == id.local_addr()) {
            server.close(&id, sim, &mut self.net)
        } else if let Some(client) = self.client.as_mut().filter(|c| *c.id() == id) {
            client.close(sim, &mut self.net)
        } else {
            Err(TcpError::UnknownConnection(id))
        }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, sim: &mut Simulator) {
        if let Some(client) = self.client.as_mut() {
            if let Err(e) = client.poll(sim, &mut self.net) {
                warn!(error = %e, "客户端轮询失败");
            }
        }
    }
}
