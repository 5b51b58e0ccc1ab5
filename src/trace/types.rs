use serde::{Deserialize, Serialize};

/// 记录事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    /// 网络层：报文段进入信道
    Transmit(TraceSegment),
    /// 网络层：信道丢包
    Drop(TraceSegment),
    /// 网络层：信道翻转了一个比特
    Corrupt(TraceSegment),
    /// 网络层：信道复制了一份报文段
    Duplicate(TraceSegment),
    /// 网络层：报文段交付给目的地址
    Deliver(TraceSegment),
    /// TCP：发送新数据段
    TcpSendData(TraceTcp),
    /// TCP：重传数据段（超时或窗口缩减后重新放行）
    TcpRetransmit(TraceTcp),
    /// TCP：发送纯 ACK
    TcpSendAck(TraceTcp),
    /// TCP：收到推进 send_base 的 ACK
    TcpRecvAck(TraceTcp),
    /// TCP：RTO 到期
    TcpRto(TraceTcp),
    /// TCP：RTT 采样与新的 RTO
    TcpRttSample {
        conn: String,
        sample_ns: u64,
        srtt_ns: u64,
        rto_ns: u64,
    },
    /// TCP：发送窗口变化
    TcpWindow {
        conn: String,
        send_window: u64,
        in_flight_bytes: u64,
    },
}

/// 网络层事件字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSegment {
    pub src: String,
    pub dst: String,
    pub bytes: usize,
}

/// 与 TCP 有关的字段（seq/ack/len 等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TraceTcp {
    pub conn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<u32>,
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct TraceLogger {
    pub events: Vec<TraceEvent>,
}

impl TraceLogger {
    pub fn push(&mut self, t_ns: u64, kind: TraceEventKind) {
        self.events.push(TraceEvent { t_ns, kind });
    }

    /// 统计满足条件的事件个数
    pub fn count(&self, pred: impl Fn(&TraceEventKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }
}
