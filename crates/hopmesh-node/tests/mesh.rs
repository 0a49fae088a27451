//! End-to-end tests over in-memory radios

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hopmesh_core::{Frame, FrameKind, MacAddress, MeshConfig, MeshConfigBuilder};
use hopmesh_link::test_utils::{MockRadio, SimulatedAir};
use hopmesh_link::RadioDriver;
use hopmesh_node::{
    FailureReason, ForeignFramePolicy, MeshNode, MessageStatus, ReceivedMessage, StatusEvent,
};

const A: MacAddress = MacAddress::new([0xAA; 6]);
const B: MacAddress = MacAddress::new([0xBB; 6]);
const R1: MacAddress = MacAddress::new([0x01, 0, 0, 0, 0, 0x01]);
const R2: MacAddress = MacAddress::new([0x01, 0, 0, 0, 0, 0x02]);
const R3: MacAddress = MacAddress::new([0x01, 0, 0, 0, 0, 0x03]);

macro_rules! poll_all {
    ($from:expr, $to:expr, $step:expr; $($node:expr),+) => {{
        let mut now: u64 = $from;
        while now <= $to {
            $( $node.poll(now); )+
            now += $step;
        }
    }};
}

fn config() -> MeshConfig {
    MeshConfigBuilder::new()
        .confirmation_timeout(Duration::from_millis(1000))
        .send_interval(Duration::from_millis(20))
        .build()
}

fn record_status<D: RadioDriver, P: ForeignFramePolicy>(
    node: &mut MeshNode<D, P>,
) -> Arc<Mutex<Vec<StatusEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    node.set_on_status(move |event| sink.lock().unwrap().push(event));
    events
}

fn record_messages<D: RadioDriver, P: ForeignFramePolicy>(
    node: &mut MeshNode<D, P>,
) -> Arc<Mutex<Vec<ReceivedMessage>>> {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    node.set_on_message(move |message| sink.lock().unwrap().push(message.clone()));
    messages
}

#[test]
fn test_confirmed_message_direct() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let air = SimulatedAir::new();
    air.link(A, B);
    let mut a = MeshNode::device(air.radio(A), &config());
    let mut b = MeshNode::device(air.radio(B), &config());
    a.begin().unwrap();
    b.begin().unwrap();

    let status = record_status(&mut a);
    let received = record_messages(&mut b);

    let id = a.send_confirmed(vec![0x01, 0x02], B).unwrap();
    poll_all!(0, 500, 1; a, b);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, FrameKind::Confirmable);
    assert_eq!(received[0].kind.as_u8(), 1);
    assert_eq!(received[0].source, A);
    assert_eq!(&received[0].payload[..], &[0x01, 0x02]);
    assert_eq!(b.stats().acks_sent, 1);

    let status = status.lock().unwrap();
    assert_eq!(
        *status,
        vec![StatusEvent {
            id,
            destination: B,
            status: MessageStatus::Success
        }]
    );
    assert!(a.pending_confirmations().is_empty());
    assert!(a.outgoing().is_empty());
    assert!(b.outgoing().is_empty());
}

#[test]
fn test_confirmed_message_physical_failure() {
    let radio = MockRadio::new(A);
    radio.set_reject_transmit(true);
    let mut a = MeshNode::device(radio.clone(), &config());
    a.begin().unwrap();
    let status = record_status(&mut a);

    let id = a.send_confirmed(vec![0x01, 0x02], B).unwrap();
    poll_all!(0, 3000, 10; a);

    let status = status.lock().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].id, id);
    assert_eq!(
        status[0].status,
        MessageStatus::Failed(FailureReason::DeliveryFailure)
    );
    assert!(a.pending_confirmations().is_empty());
    assert_eq!(a.stats().confirmation_timeouts, 0);
}

#[test]
fn test_unicast_retries_exhausted() {
    let radio = MockRadio::new(R1);
    let mut router = MeshNode::router(radio.clone(), &config());
    router.begin().unwrap();
    router.add_or_update_route(B, B, 1);
    let status = record_status(&mut router);

    router.send_confirmed(vec![7u8], B).unwrap();
    router.poll(0);
    router.poll(1);
    radio.complete(false);
    router.poll(2);
    assert!(status.lock().unwrap().is_empty());

    // Second and last try after the pacing interval
    router.poll(25);
    radio.complete(false);
    router.poll(30);

    assert_eq!(radio.transmissions().len(), 2);
    assert!(radio.transmissions().iter().all(|t| t.dest == B));
    let status = status.lock().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(
        status[0].status,
        MessageStatus::Failed(FailureReason::DeliveryFailure)
    );
    assert!(router.pending_confirmations().is_empty());
}

#[test]
fn test_confirmation_times_out_without_ack() {
    let air = SimulatedAir::new();
    air.link(A, B);
    let mut a = MeshNode::device(air.radio(A), &config());
    a.begin().unwrap();
    // B has a radio on the air but never runs, so nothing acknowledges
    let _b = air.radio(B);
    let status = record_status(&mut a);

    a.send_confirmed(vec![1u8], B).unwrap();
    poll_all!(0, 3000, 10; a);

    let status = status.lock().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(
        status[0].status,
        MessageStatus::Failed(FailureReason::ConfirmationTimeout)
    );
    assert!(a.pending_confirmations().is_empty());
}

#[test]
fn test_every_send_transmits_one_matching_frame() {
    let radio = MockRadio::new(A).with_auto_complete(true);
    let mut a = MeshNode::device(
        radio.clone(),
        &MeshConfigBuilder::new()
            .hop_budget(5)
            .send_interval(Duration::from_millis(1))
            .build(),
    );
    a.begin().unwrap();

    let cases: Vec<(Vec<u8>, MacAddress)> = vec![
        (vec![], B),
        (vec![0x42], MacAddress::BROADCAST),
        (vec![0xEE; 100], R1),
        (vec![0x11; 232], B),
    ];
    let mut ids = Vec::new();
    for (payload, dest) in &cases {
        ids.push(a.send(payload.clone(), *dest).unwrap());
    }
    poll_all!(0, 100, 1; a);

    let sent = radio.take_transmissions();
    assert_eq!(sent.len(), cases.len());
    for ((sent, (payload, dest)), id) in sent.iter().zip(&cases).zip(&ids) {
        assert_eq!(sent.data.len(), 18 + payload.len());
        let frame = Frame::decode(&sent.data).unwrap();
        assert_eq!(frame.kind, FrameKind::Data);
        assert_eq!(frame.id, *id);
        assert_eq!(frame.hop_count, 5);
        assert_eq!(frame.src, A);
        assert_eq!(frame.dest, *dest);
        assert_eq!(&frame.payload[..], &payload[..]);
    }
    assert!(a.outgoing().is_empty());
}

#[test]
fn test_multi_hop_confirmed_message() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // A - R1 - R2 - B
    let air = SimulatedAir::new();
    air.link(A, R1);
    air.link(R1, R2);
    air.link(R2, B);

    let mut a = MeshNode::device(air.radio(A), &config());
    let mut r1 = MeshNode::router(air.radio(R1), &config());
    let mut r2 = MeshNode::router(air.radio(R2), &config());
    let mut b = MeshNode::device(air.radio(B), &config());
    a.begin().unwrap();
    r1.begin().unwrap();
    r2.begin().unwrap();
    b.begin().unwrap();

    let status = record_status(&mut a);
    let received = record_messages(&mut b);

    a.send_confirmed(&b"over the hills"[..], B).unwrap();
    poll_all!(0, 800, 1; a, r1, r2, b);

    {
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].source, A);
        assert_eq!(&received[0].payload[..], b"over the hills");
    }
    {
        let status = status.lock().unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].status.is_success());
    }

    // Each router relayed the message one way and the ack the other
    assert_eq!(r1.stats().forwarded, 2);
    assert_eq!(r2.stats().forwarded, 2);

    // Routes learned from the exchange point along the line
    assert_eq!(r1.resolve_next_hop(A), A);
    assert_eq!(r1.resolve_next_hop(B), R2);
    assert_eq!(r2.resolve_next_hop(A), R1);
    assert_eq!(r2.resolve_next_hop(B), B);
    assert_eq!(r2.routing_table().route(A).map(|r| r.hops), Some(2));

    // Once learned, routes expire without traffic
    poll_all!(801, 12_000, 50; a, r1, r2, b);
    assert_eq!(r1.resolve_next_hop(B), MacAddress::BROADCAST);
    assert!(r2.routing_table().is_empty());
}

#[test]
fn test_hop_budget_bounds_reach() {
    // A - R1 - R2 - R3 - B: three relays exceed a budget of three
    let air = SimulatedAir::new();
    air.link(A, R1);
    air.link(R1, R2);
    air.link(R2, R3);
    air.link(R3, B);

    let mut a = MeshNode::device(air.radio(A), &config());
    let mut r1 = MeshNode::router(air.radio(R1), &config());
    let mut r2 = MeshNode::router(air.radio(R2), &config());
    let mut r3 = MeshNode::router(air.radio(R3), &config());
    let mut b = MeshNode::device(air.radio(B), &config());
    a.begin().unwrap();
    r1.begin().unwrap();
    r2.begin().unwrap();
    r3.begin().unwrap();
    b.begin().unwrap();

    let received = record_messages(&mut b);
    a.send(vec![9u8], B).unwrap();
    poll_all!(0, 500, 1; a, r1, r2, r3, b);

    assert!(received.lock().unwrap().is_empty());
    assert_eq!(r1.stats().forwarded, 1);
    assert_eq!(r2.stats().forwarded, 1);
    assert_eq!(r3.stats().forwarded, 0);
    assert_eq!(r3.stats().hop_exhausted, 1);
}

#[test]
fn test_flooded_duplicates_delivered_once() {
    // Two parallel routers between A and B: B hears the message twice
    let air = SimulatedAir::new();
    air.link(A, R1);
    air.link(A, R2);
    air.link(R1, B);
    air.link(R2, B);
    air.link(R1, R2);

    let mut a = MeshNode::device(air.radio(A), &config());
    let mut r1 = MeshNode::router(air.radio(R1), &config());
    let mut r2 = MeshNode::router(air.radio(R2), &config());
    let mut b = MeshNode::device(air.radio(B), &config());
    a.begin().unwrap();
    r1.begin().unwrap();
    r2.begin().unwrap();
    b.begin().unwrap();

    let received = record_messages(&mut b);
    a.send(vec![1u8, 2, 3], B).unwrap();
    poll_all!(0, 500, 1; a, r1, r2, b);

    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(b.stats().duplicates_dropped, 1);
    // Each router relays once and drops the other's copy
    assert_eq!(r1.stats().forwarded, 1);
    assert_eq!(r2.stats().forwarded, 1);
    assert_eq!(r1.stats().duplicates_dropped, 1);
    assert_eq!(r2.stats().duplicates_dropped, 1);
}
