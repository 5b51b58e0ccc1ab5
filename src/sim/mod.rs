//! 仿真核心模块
//!
//! 此模块包含事件驱动仿真的核心组件，如仿真时间、事件、世界和仿真器。
//! 所有输入（报文到达、定时器到期、应用调用）都是事件，由同一个循环逐个执行。

// 子模块声明
mod event;
mod scheduled_event;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use event::Event;
pub use scheduled_event::{EventId, ScheduledEvent};
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
