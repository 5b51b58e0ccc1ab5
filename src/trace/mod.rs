//! 协议事件记录（用于离线分析）
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **轻量**：只在内存中收集，仿真结束由调用方写文件
//! - **可过滤**：每条 TCP 事件都带连接标识

mod types;

pub use types::{TraceEvent, TraceEventKind, TraceLogger, TraceSegment, TraceTcp};
