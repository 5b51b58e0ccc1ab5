//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。

use super::event::Event;
use super::scheduled_event::{EventId, ScheduledEvent};
use super::time::SimTime;
use super::world::World;
use std::collections::{BinaryHeap, HashSet};
use tracing::{debug, info, trace};

/// 事件驱动仿真器：维护当前时间与事件队列。
///
/// 取消采用惰性删除：被取消的事件留在堆中，弹出时跳过。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    live: HashSet<u64>,
    cancelled: HashSet<u64>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 调度事件在指定时间执行（早于 now 的时间按 now 处理）
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) -> EventId {
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at: at.max(self.now),
            seq,
            ev: Box::new(ev),
        });
        self.live.insert(seq);

        debug!(queue_size = self.q.len(), "事件已加入队列");
        EventId(seq)
    }

    /// 在 `now + delay` 调度事件
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) -> EventId {
        let at = self.now.saturating_add(delay);
        self.schedule(at, ev)
    }

    /// 取消一个尚未执行的事件。
    ///
    /// 幂等：事件已执行或已取消时返回 false，不视为错误。
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.live.remove(&id.0) {
            self.cancelled.insert(id.0);
            trace!(seq = id.0, "取消事件");
            true
        } else {
            false
        }
    }

    /// 事件是否仍在等待执行
    pub fn is_pending(&self, id: EventId) -> bool {
        self.live.contains(&id.0)
    }

    /// 等待执行（未取消）的事件个数
    pub fn pending_events(&self) -> usize {
        self.live.len()
    }

    /// 弹出下一个未被取消的事件
    fn pop_live(&mut self) -> Option<ScheduledEvent> {
        while let Some(item) = self.q.pop() {
            if self.cancelled.remove(&item.seq) {
                continue;
            }
            self.live.remove(&item.seq);
            return Some(item);
        }
        None
    }

    /// 丢弃堆顶已取消的事件，返回下一个有效事件的时间
    fn peek_live_at(&mut self) -> Option<SimTime> {
        while let Some(top) = self.q.peek() {
            if self.cancelled.contains(&top.seq) {
                let seq = top.seq;
                self.q.pop();
                self.cancelled.remove(&seq);
                continue;
            }
            return Some(top.at);
        }
        None
    }

    /// 执行一个事件；队列为空时返回 false。
    pub fn step(&mut self, world: &mut dyn World) -> bool {
        let Some(item) = self.pop_live() else {
            return false;
        };
        self.now = item.at;
        item.ev.execute(self, world);
        world.on_tick(self);
        true
    }

    /// 下一个有效事件的时间
    pub fn next_event_at(&mut self) -> Option<SimTime> {
        self.peek_live_at()
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while let Some(at) = self.peek_live_at() {
            if at > until {
                break;
            }
            let Some(item) = self.pop_live() else {
                break;
            };
            self.now = item.at;
            item.ev.execute(self, world);
            world.on_tick(self);
        }
        self.now = self.now.max(until);
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut event_count = 0;
        while let Some(item) = self.pop_live() {
            event_count += 1;
            self.now = item.at;

            debug!(
                event_num = event_count,
                now = ?self.now,
                seq = item.seq,
                remaining_queue = self.q.len(),
                "执行事件"
            );

            item.ev.execute(self, world);
            world.on_tick(self);
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
