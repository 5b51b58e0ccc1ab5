//! TCP（简化版）协议实现
//!
//! 目标：在不可靠、可乱序的网络上提供可靠、有序的字节流：
//! - 被动打开的三次握手（Server）与主动打开（Client）
//! - 累计 ACK、超时重传、Karn 算法下的 RTT 估计
//! - 基于字节的发送窗口（线性增长，超时减半）
//!
//! 注意：不实现选项协商、紧急数据、同时关闭与乱序重组缓冲。

mod client;
mod config;
mod conn;
mod error;
mod events;
mod rtt;
pub mod seq;
mod server;

pub use client::{Client, ClientStats};
pub use config::TcpConfig;
pub use conn::{AcceptCallback, ConnStats, Connection, ConnectionId, DataCallback, InboundSegment};
pub use error::TcpError;
pub use events::{AppClose, AppSend, TcpRto};
pub use rtt::RttEstimator;
pub use server::{Server, ServerStats};
