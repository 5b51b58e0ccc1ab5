//! 单连接传输场景
//!
//! 构建一个 client -> server 的传输：服务端应用可选择吸收（sink）或回显（echo），
//! 两端收到的数据都记录在共享缓冲里，便于校验重建的字节流。

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use tracing::{debug, info};

use crate::net::{NetWorld, Network};
use crate::proto::tcp::{AppClose, AppSend, Client, ConnectionId, Server, TcpConfig};
use crate::sim::Simulator;

pub const SERVER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER_PORT: u16 = 8080;
pub const CLIENT_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const CLIENT_PORT: u16 = 40_000;

/// 一端应用收到的数据
#[derive(Debug, Default)]
pub struct Received {
    pub data: Vec<u8>,
    /// 回调次数（不含结束标记）
    pub chunks: usize,
    /// 是否收到了结束标记（空载荷）
    pub eof: bool,
}

pub type ReceivedLog = Rc<RefCell<Received>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerApp {
    /// 只接收
    Sink,
    /// 原样回显
    Echo,
}

#[derive(Debug, Clone)]
pub struct TransferOpts {
    pub tcp: TcpConfig,
    pub app: ServerApp,
    pub payload: Vec<u8>,
}

/// 场景句柄
pub struct Transfer {
    pub server_rx: ReceivedLog,
    pub client_rx: ReceivedLog,
    /// 客户端视角的连接标识
    pub client_id: ConnectionId,
    /// 服务端视角的连接标识
    pub server_id: ConnectionId,
}

/// 生成确定性的测试数据
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// 在 `world` 中安装 server + client，并在 t = now 发起连接。
pub fn build_transfer(sim: &mut Simulator, world: &mut NetWorld, opts: &TransferOpts) -> Transfer {
    let server_rx: ReceivedLog = Rc::default();
    let client_rx: ReceivedLog = Rc::default();

    let mut server = Server::new(SERVER_ADDR, SERVER_PORT, opts.tcp.clone());
    let app = opts.app;
    let rx = Rc::clone(&server_rx);
    server.on_connection_accepted(move |conn| {
        info!(conn = %conn.id(), "应用层收到新连接");
        let rx = Rc::clone(&rx);
        conn.on_data_received(move |id, data, sim| {
            let mut r = rx.borrow_mut();
            if data.is_empty() {
                // 客户端只在收齐回显后才发 FIN，此时服务端无需再等待
                r.eof = true;
                sim.schedule(sim.now(), AppClose { id: *id });
                return;
            }
            r.data.extend_from_slice(data);
            r.chunks += 1;
            if app == ServerApp::Echo {
                sim.schedule(
                    sim.now(),
                    AppSend {
                        id: *id,
                        data: data.to_vec(),
                    },
                );
            }
        });
    });

    let mut client = Client::new(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT, opts.tcp.clone());
    let client_id = *client.id();
    let rx = Rc::clone(&client_rx);
    let expect_echo = match app {
        ServerApp::Echo => opts.payload.len(),
        ServerApp::Sink => 0,
    };
    client.on_data_received(move |id, data, sim| {
        let mut r = rx.borrow_mut();
        if data.is_empty() {
            r.eof = true;
            return;
        }
        r.data.extend_from_slice(data);
        r.chunks += 1;
        if r.data.len() == expect_echo {
            debug!("回显数据已全部收到，关闭客户端");
            sim.schedule(sim.now(), AppClose { id: *id });
        }
    });
    if app == ServerApp::Sink {
        client.close_when_drained();
    }

    if let Err(e) = client.send(&opts.payload, sim, &mut world.net) {
        debug!(error = %e, "客户端排队数据失败");
    }
    client.connect(sim, &mut world.net);

    world.server = Some(server);
    world.client = Some(client);

    Transfer {
        server_rx,
        client_rx,
        client_id,
        server_id: ConnectionId::new(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT),
    }
}

/// 便捷入口：新建 world 并安装场景
pub fn new_transfer(network: Network, opts: &TransferOpts) -> (Simulator, NetWorld, Transfer) {
    let mut sim = Simulator::default();
    let mut world = NetWorld::new(network);
    let t = build_transfer(&mut sim, &mut world, opts);
    (sim, world, t)
}
