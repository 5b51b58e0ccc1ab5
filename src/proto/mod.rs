//! 传输层/协议模块
//!
//! 包含简化 TCP 的实现：多路分解（Server）、主动打开端（Client）与连接状态机（Connection）。

pub mod tcp;
