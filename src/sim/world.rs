//! 世界 trait

use super::simulator::Simulator;
use std::any::Any;

/// 事件作用的对象。协议事件通过 `as_any_mut` 向下转型到 `NetWorld`。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// 每个（未取消的）事件执行后调用一次，用于轮询类的收尾动作
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
