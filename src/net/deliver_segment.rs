//! 报文段交付事件
//!
//! 定义网络模拟中的报文段到达事件。

use std::net::Ipv4Addr;

use super::net_world::NetWorld;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：把一个报文段交给目的地址上的端点处理。
#[derive(Debug)]
pub struct DeliverSegment {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub segment: Vec<u8>,
}

impl Event for DeliverSegment {
    #[tracing::instrument(skip(self, sim, world), fields(src = %self.src, dst = %self.dst, len = self.segment.len()))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverSegment { src, dst, segment } = *self;

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.deliver(src, dst, segment, sim);

        trace!("DeliverSegment::execute 完成");
    }
}
