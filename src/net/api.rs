//! Network-facing API used by protocol stacks.

use std::net::Ipv4Addr;

use crate::sim::{SimTime, Simulator};
use crate::trace::TraceEventKind;

/// Minimal network API for protocol stacks.
///
/// `send` is fire-and-forget: no delivery confirmation and no ordering
/// guarantee. Reliability is the transport's job.
pub trait NetApi {
    fn send(&mut self, segment: Vec<u8>, src: Ipv4Addr, dst: Ipv4Addr, sim: &mut Simulator);

    /// Whether trace events are being collected. Callers skip building
    /// trace payloads when this is false.
    fn tracing_enabled(&self) -> bool {
        false
    }

    fn trace(&mut self, _at: SimTime, _kind: TraceEventKind) {}
}
