use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use super::CaptureNet;
use crate::net::NetWorld;
use crate::net::segment::Flags;
use crate::proto::tcp::{Connection, ConnectionId, InboundSegment, TcpConfig, TcpError};
use crate::sim::{SimTime, Simulator};

const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const ISN: u32 = 1000;
const PEER_ISN: u32 = 5000;

type Log = Rc<RefCell<Vec<Vec<u8>>>>;

fn cfg(mss: usize, window_segments: u32) -> TcpConfig {
    TcpConfig {
        mss,
        init_window_segments: window_segments,
        ..TcpConfig::default()
    }
}

fn conn(cfg: TcpConfig) -> (Connection, Log) {
    let id = ConnectionId::new(PEER, 40000, LOCAL, 8080);
    let mut c = Connection::new(id, ISN, PEER_ISN, cfg);
    let log: Log = Rc::default();
    let l = Rc::clone(&log);
    c.on_data_received(move |_, data, _| l.borrow_mut().push(data.to_vec()));
    (c, log)
}

fn ack(n: u32) -> InboundSegment<'static> {
    InboundSegment {
        seq: PEER_ISN + 1,
        ack: n,
        flags: Flags::ACK,
        payload: &[],
    }
}

fn data(seq: u32, payload: &[u8]) -> InboundSegment<'_> {
    InboundSegment {
        seq,
        ack: ISN + 1,
        flags: Flags::ACK,
        payload,
    }
}

/// 推进仿真时间（不会触发 1s 的初始 RTO）
fn advance(sim: &mut Simulator, to: SimTime) {
    let mut world = NetWorld::default();
    sim.run_until(to, &mut world);
}

#[test]
fn send_segments_by_mss_with_consecutive_sequence_numbers() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 10));

    c.send(&[7u8; 250], &mut sim, &mut net).expect("send");

    let segs = net.take();
    let got: Vec<(u32, usize)> = segs.iter().map(|(h, p)| (h.seq, p.len())).collect();
    assert_eq!(got, vec![(1001, 100), (1101, 100), (1201, 50)]);
    for (h, _) in &segs {
        assert_eq!(h.flags, Flags::ACK);
        assert_eq!(h.ack, PEER_ISN + 1);
        assert_eq!((h.src_port, h.dst_port), (8080, 40000));
    }
    assert_eq!(c.send_seq(), 1251);
    assert_eq!(c.send_base(), 1001);
    assert_eq!(c.in_flight_bytes(), 250);
    assert_eq!(c.stats().data_segments_sent, 3);

    let timer = c.retransmit_timer().expect("timer armed");
    assert!(sim.is_pending(timer));
    assert_eq!(sim.pending_events(), 1);
}

#[test]
fn empty_send_is_a_no_op() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 10));

    c.send(&[], &mut sim, &mut net).expect("send");
    assert!(net.sent.is_empty());
    assert_eq!(c.retransmit_timer(), None);
}

#[test]
fn cumulative_ack_retires_three_segments_and_samples_rtt_once() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 10));
    c.send(&[1u8; 300], &mut sim, &mut net).expect("send");
    net.take();

    advance(&mut sim, SimTime::from_millis(100));
    c.on_segment(&ack(1301), &mut sim, &mut net);

    assert_eq!(c.send_base(), 1301);
    assert_eq!(c.in_flight_segments(), 0);
    assert_eq!(c.in_flight_bytes(), 0);
    assert!(c.is_idle());
    assert_eq!(c.stats().rtt_samples, 1);
    assert_eq!(c.rtt().srtt(), Some(SimTime::from_millis(100)));
    assert_eq!(c.rtt().rto(), SimTime::from_millis(300));
    // nothing left to protect
    assert_eq!(c.retransmit_timer(), None);
    assert_eq!(sim.pending_events(), 0);
    // a pure ACK carries no data and needs no reply
    assert!(net.sent.is_empty());
}

#[test]
fn partial_ack_keeps_the_rest_in_flight_and_rearms() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 10));
    c.send(&[1u8; 300], &mut sim, &mut net).expect("send");
    let first = c.retransmit_timer().expect("timer");

    advance(&mut sim, SimTime::from_millis(40));
    c.on_segment(&ack(1101), &mut sim, &mut net);

    assert_eq!(c.in_flight_segments(), 2);
    assert_eq!(c.in_flight_bytes(), 200);
    let rearmed = c.retransmit_timer().expect("timer");
    assert_ne!(first, rearmed);
    assert!(!sim.is_pending(first));
    assert_eq!(sim.pending_events(), 1);
}

#[test]
fn stale_and_impossible_acks_are_ignored() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 10));
    c.send(&[1u8; 200], &mut sim, &mut net).expect("send");

    c.on_segment(&ack(1001), &mut sim, &mut net);
    c.on_segment(&ack(900), &mut sim, &mut net);
    c.on_segment(&ack(5000), &mut sim, &mut net);

    assert_eq!(c.send_base(), 1001);
    assert_eq!(c.in_flight_segments(), 2);
    assert_eq!(c.stats().rtt_samples, 0);
}

#[test]
fn timeout_retransmits_only_the_oldest_segment_and_halves_window() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 4));
    c.send(&[3u8; 400], &mut sim, &mut net).expect("send");
    net.take();
    assert_eq!(c.send_window(), 400);

    advance(&mut sim, SimTime::from_millis(500));
    c.on_timeout(&mut sim, &mut net);

    let segs = net.take();
    assert_eq!(segs.len(), 1, "exactly one retransmission");
    assert_eq!(segs[0].0.seq, 1001);
    assert_eq!(segs[0].1.len(), 100);

    assert_eq!(c.send_window(), 200);
    assert!(c.in_flight_bytes() <= c.send_window());
    assert_eq!(c.in_flight_segments(), 2);
    assert_eq!(c.pending_segments(), 2);
    assert!(c.is_retransmitting());
    assert_eq!(c.stats().timeouts, 1);
    assert_eq!(c.stats().retransmissions, 1);
    assert_eq!(sim.pending_events(), 1, "one live timer");

    // every further expiry halves again
    c.on_timeout(&mut sim, &mut net);
    assert_eq!(c.send_window(), 100);
    assert_eq!(c.in_flight_segments(), 1);
    assert_eq!(c.pending_segments(), 3);
    let segs = net.take();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].0.seq, 1001);
    assert_eq!(sim.pending_events(), 1);
}

#[test]
fn consecutive_timeouts_keep_halving_down_to_one_mss() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 8));
    c.send(&[5u8; 800], &mut sim, &mut net).expect("send");
    net.take();

    let mut windows = vec![c.send_window()];
    for _ in 0..4 {
        c.on_timeout(&mut sim, &mut net);
        windows.push(c.send_window());
        assert!(c.in_flight_bytes() <= c.send_window());
    }
    assert_eq!(windows, [800, 400, 200, 100, 100]);
    assert_eq!(c.stats().timeouts, 4);
    assert_eq!(net.take().len(), 4, "one head retransmission per expiry");
}

#[test]
fn window_never_drops_below_one_mss() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 1));
    c.send(&[3u8; 100], &mut sim, &mut net).expect("send");

    c.on_timeout(&mut sim, &mut net);
    assert_eq!(c.send_window(), 100);
    assert_eq!(c.in_flight_segments(), 1);
}

#[test]
fn ack_after_timeout_gives_no_rtt_sample() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 4));
    c.send(&[3u8; 400], &mut sim, &mut net).expect("send");
    c.on_timeout(&mut sim, &mut net);
    net.take();

    advance(&mut sim, SimTime::from_millis(80));
    c.on_segment(&ack(1101), &mut sim, &mut net);

    assert_eq!(c.stats().rtt_samples, 0);
    assert!(!c.rtt().is_sampled());
    assert!(!c.is_retransmitting());
    // window 200, 100 in flight: the first requeued segment goes out again
    let segs = net.take();
    assert_eq!(segs.iter().map(|(h, _)| h.seq).collect::<Vec<_>>(), vec![1201]);
    assert!(c.in_flight_bytes() <= c.send_window());
}

#[test]
fn pending_segments_flush_as_window_grows() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 1));

    c.send(&[9u8; 300], &mut sim, &mut net).expect("send");
    assert_eq!(net.take().len(), 1);
    assert_eq!(c.pending_segments(), 2);
    assert_eq!(c.send_seq(), 1301, "sequence numbers are assigned at segmentation");

    advance(&mut sim, SimTime::from_millis(10));
    c.on_segment(&ack(1101), &mut sim, &mut net);

    // one full window retired: +1 MSS
    assert_eq!(c.send_window(), 200);
    let segs = net.take();
    assert_eq!(segs.iter().map(|(h, _)| h.seq).collect::<Vec<_>>(), vec![1101, 1201]);
    assert_eq!(c.pending_segments(), 0);
    assert_eq!(c.in_flight_bytes(), 200);
}

#[test]
fn window_grows_once_per_window_of_acked_bytes() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, _) = conn(cfg(100, 4));
    c.send(&[9u8; 400], &mut sim, &mut net).expect("send");

    c.on_segment(&ack(1201), &mut sim, &mut net);
    assert_eq!(c.send_window(), 400);
    c.on_segment(&ack(1401), &mut sim, &mut net);
    assert_eq!(c.send_window(), 500);
}

#[test]
fn in_order_data_is_delivered_and_acked() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, log) = conn(cfg(100, 1));

    c.on_segment(&data(5001, b"hello"), &mut sim, &mut net);
    c.on_segment(&data(5006, b" world"), &mut sim, &mut net);

    assert_eq!(*log.borrow(), vec![b"hello".to_vec(), b" world".to_vec()]);
    assert_eq!(c.recv_next(), 5012);
    assert_eq!(c.last_ack_sent(), 5012);
    let acks: Vec<u32> = net.take().iter().map(|(h, _)| h.ack).collect();
    assert_eq!(acks, vec![5006, 5012]);
    assert_eq!(c.stats().bytes_delivered, 11);
}

#[test]
fn out_of_order_and_duplicate_data_are_dropped_and_reacked() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, log) = conn(cfg(100, 1));

    // gap: 5001..5006 missing
    c.on_segment(&data(5006, b"later"), &mut sim, &mut net);
    assert!(log.borrow().is_empty());
    assert_eq!(c.recv_next(), 5001);

    c.on_segment(&data(5001, b"first"), &mut sim, &mut net);
    // retransmitted copy of what was already delivered
    c.on_segment(&data(5001, b"first"), &mut sim, &mut net);

    assert_eq!(*log.borrow(), vec![b"first".to_vec()]);
    let acks: Vec<u32> = net.take().iter().map(|(h, _)| h.ack).collect();
    assert_eq!(acks, vec![5001, 5006, 5006]);
    assert_eq!(c.stats().out_of_order_dropped, 2);
}

#[test]
fn fin_delivers_payload_then_eof_exactly_once() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, log) = conn(cfg(100, 1));

    let fin = InboundSegment {
        seq: 5001,
        ack: ISN + 1,
        flags: Flags::FIN | Flags::ACK,
        payload: b"bye",
    };
    c.on_segment(&fin, &mut sim, &mut net);
    assert!(c.peer_finished());
    assert_eq!(c.recv_next(), 5005);
    assert_eq!(*log.borrow(), vec![b"bye".to_vec(), Vec::new()]);

    // retransmitted FIN: re-ACK, no second EOF
    c.on_segment(&fin, &mut sim, &mut net);
    assert_eq!(log.borrow().len(), 2);

    let acks: Vec<u32> = net.take().iter().map(|(h, _)| h.ack).collect();
    assert_eq!(acks, vec![5005, 5005]);
}

#[test]
fn fin_ahead_of_missing_data_is_dropped() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, log) = conn(cfg(100, 1));

    let fin = InboundSegment {
        seq: 5010,
        ack: ISN + 1,
        flags: Flags::FIN | Flags::ACK,
        payload: &[],
    };
    c.on_segment(&fin, &mut sim, &mut net);

    assert!(!c.peer_finished());
    assert!(log.borrow().is_empty());
    assert_eq!(c.recv_next(), 5001);
    let segs = net.take();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].0.ack, 5001);
}

#[test]
fn close_sends_one_fin_and_nothing_afterwards() {
    let mut sim = Simulator::default();
    let mut net = CaptureNet::default();
    let (mut c, log) = conn(cfg(100, 1));
    c.send(&[5u8; 200], &mut sim, &mut net).expect("send");
    net.take();

    c.close(&mut sim, &mut net);
    let segs = net.take();
    assert_eq!(segs.len(), 1);
    let (h, payload) = &segs[0];
    assert!(h.flags.fin());
    assert!(payload.is_empty());
    assert_eq!(h.seq, 1201);
    assert!(c.is_closed());
    assert_eq!(sim.pending_events(), 0, "timer cancelled");

    c.close(&mut sim, &mut net);
    c.on_segment(&data(5001, b"late"), &mut sim, &mut net);
    c.on_segment(&ack(1101), &mut sim, &mut net);
    c.on_timeout(&mut sim, &mut net);
    assert_eq!(c.send(b"more", &mut sim, &mut net), Err(TcpError::Closed(*c.id())));

    assert!(net.sent.is_empty());
    assert!(log.borrow().is_empty());
}
