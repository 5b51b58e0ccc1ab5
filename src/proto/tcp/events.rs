//! Simulator events owned by the TCP layer.
//!
//! Timer expiries and application calls made from inside callbacks are
//! queued as discrete events, so each one runs against a connection that is
//! never half-way through another event.

use tracing::warn;

use super::conn::ConnectionId;
use crate::net::NetWorld;
use crate::sim::{Event, Simulator, World};

/// Retransmission timer for connection `id` (also the client's SYN retry timer).
#[derive(Debug)]
pub struct TcpRto {
    pub id: ConnectionId,
}

impl Event for TcpRto {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpRto { id } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.on_tcp_timeout(id, sim);
    }
}

/// Application send on connection `id`.
#[derive(Debug)]
pub struct AppSend {
    pub id: ConnectionId,
    pub data: Vec<u8>,
}

impl Event for AppSend {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppSend { id, data } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        if let Err(e) = w.app_send(id, &data, sim) {
            warn!(error = %e, "application send failed");
        }
    }
}

/// Application close on connection `id`.
#[derive(Debug)]
pub struct AppClose {
    pub id: ConnectionId,
}

impl Event for AppClose {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppClose { id } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        if let Err(e) = w.app_close(id, sim) {
            warn!(error = %e, "application close failed");
        }
    }
}
