//! 网络模拟模块
//!
//! 此模块包含传输层之下的一切：报文段编解码、不可靠信道、网络世界。

// 子模块声明
mod api;
mod channel;
mod deliver_segment;
mod net_world;
mod network;
pub mod segment;
mod stats;

// 重新导出公共接口
pub use api::NetApi;
pub use channel::ChannelConfig;
pub use deliver_segment::DeliverSegment;
pub use net_world::NetWorld;
pub use network::Network;
pub use segment::{Flags, SegmentError, TcpHeader};
pub use stats::NetStats;
