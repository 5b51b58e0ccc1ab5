//! 事件 trait
//!
//! 报文到达、重传定时器和应用调用都是事件；`Simulator::schedule`
//! 返回的 `EventId` 可在事件执行前取消。

use super::simulator::Simulator;
use super::world::World;

/// 可调度的事件。执行时消费自身（`self: Box<Self>`），
/// 已取消的事件在出队时直接丢弃，不会执行。
///
/// 事件只携带定位目标所需的数据（如 `ConnectionId`），目标被移除后
/// 事件应当安静地什么也不做。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}
