//! Live-source drain behavior: loss policies, retry ceiling, parse path.

use std::collections::{HashMap, VecDeque};

use nflog_ingest::netlink::{NFULNL_MSG_PACKET, NFGENMSG_LEN, NLMSG_HDRLEN};
use nflog_ingest::{
    DeviceNameCache, EnobufsPolicy, Error, IngestSession, NameResolver, RecvOutcome, RecvSource,
    Result, RECV_RETRY_LIMIT,
};

struct FixedResolver(HashMap<u32, String>);

impl NameResolver for FixedResolver {
    fn index_to_name(&self, index: u32) -> Option<String> {
        self.0.get(&index).cloned()
    }
}

/// What a scripted source does on each receive call.
enum Step {
    Bytes(Vec<u8>),
    WouldBlock,
    Dropped,
}

/// Plays back a fixed script; idle (WouldBlock) once the script runs out.
struct Scripted {
    steps: VecDeque<Step>,
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Self {
        Scripted {
            steps: steps.into(),
        }
    }
}

impl RecvSource for Scripted {
    fn recv(&mut self, buf: &mut [u8], _blocking: bool) -> Result<RecvOutcome> {
        match self.steps.pop_front() {
            Some(Step::Bytes(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(RecvOutcome::Data(bytes.len()))
            }
            Some(Step::WouldBlock) | None => Ok(RecvOutcome::WouldBlock),
            Some(Step::Dropped) => Ok(RecvOutcome::Dropped),
        }
    }
}

fn session(steps: Vec<Step>, policy: EnobufsPolicy) -> IngestSession {
    let mut known = HashMap::new();
    known.insert(2, "eth0".to_string());
    IngestSession::from_source_with_cache(
        Scripted::new(steps),
        policy,
        DeviceNameCache::with_resolver(FixedResolver(known)),
    )
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// A wire-format packet message carrying mark, timestamp, indev and payload.
fn packet_message(mark: u32, payload: &[u8]) -> Vec<u8> {
    let mut ts = [0u8; 16];
    ts[0..8].copy_from_slice(&1_700_000_000u64.to_be_bytes());

    let attrs: Vec<(u16, Vec<u8>)> = vec![
        (2, mark.to_be_bytes().to_vec()),
        (3, ts.to_vec()),
        (4, 2u32.to_be_bytes().to_vec()),
        (9, payload.to_vec()),
    ];

    let mut body = Vec::new();
    for (ty, value) in &attrs {
        body.extend_from_slice(&((4 + value.len()) as u16).to_ne_bytes());
        body.extend_from_slice(&ty.to_ne_bytes());
        body.extend_from_slice(value);
        body.resize(align4(body.len()), 0);
    }

    let nl_len = NLMSG_HDRLEN + NFGENMSG_LEN + body.len();
    let mut msg = Vec::with_capacity(align4(nl_len));
    msg.extend_from_slice(&(nl_len as u32).to_ne_bytes());
    msg.extend_from_slice(&NFULNL_MSG_PACKET.to_ne_bytes());
    msg.extend_from_slice(&0u16.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]);
    msg.extend_from_slice(&body);
    msg.resize(align4(msg.len()), 0);
    msg
}

#[test]
fn wire_bytes_decode_into_records() {
    let payload = [0x45u8, 0x00, 0x00, 0x28, 0x01, 0x02];
    let steps = vec![Step::Bytes(packet_message(77, &payload))];
    let mut s = session(steps, EnobufsPolicy::Raise);

    assert_eq!(s.queue(true).unwrap(), 1);
    let record = s.next(false).unwrap().unwrap();
    assert_eq!(record.mark, 77);
    assert_eq!(record.in_device.as_deref(), Some("eth0"));
    assert_eq!(record.payload.as_ref(), &payload);
    assert_eq!(record.timestamp_us, 1_700_000_000_000_000);
}

#[test]
fn two_messages_in_one_receive_queue_two_records() {
    let mut buf = packet_message(1, &[0xaa]);
    buf.extend_from_slice(&packet_message(2, &[0xbb]));
    let mut s = session(vec![Step::Bytes(buf)], EnobufsPolicy::Raise);

    assert_eq!(s.queue(true).unwrap(), 2);
    assert_eq!(s.next(false).unwrap().unwrap().mark, 1);
    assert_eq!(s.next(false).unwrap().unwrap().mark, 2);
}

#[test]
fn raise_policy_surfaces_loss_as_error() {
    let mut s = session(vec![Step::Dropped], EnobufsPolicy::Raise);
    assert!(matches!(s.queue(false), Err(Error::Dropped)));
    // the error is per detection, not terminal
    assert_eq!(s.queue(false).unwrap(), 0);
}

#[test]
fn handle_policy_counts_and_continues() {
    let steps = vec![
        Step::Dropped,
        Step::Bytes(packet_message(5, &[1])),
        Step::Dropped,
    ];
    let mut s = session(steps, EnobufsPolicy::Handle);

    assert_eq!(s.queue(false).unwrap(), 0);
    assert_eq!(s.drops(), 1);

    assert_eq!(s.queue(false).unwrap(), 1);
    assert_eq!(s.next(false).unwrap().unwrap().mark, 5);

    assert_eq!(s.queue(false).unwrap(), 0);
    assert_eq!(s.drops(), 2);
    s.reset_drops();
    assert_eq!(s.drops(), 0);
}

#[test]
fn disable_policy_never_surfaces_loss() {
    let steps = vec![
        Step::Dropped,
        Step::Bytes(packet_message(3, &[1])),
        Step::Dropped,
    ];
    let mut s = session(steps, EnobufsPolicy::Disable);

    // loss notifications neither error nor count
    assert_eq!(s.queue(false).unwrap(), 0);
    assert_eq!(s.drops(), 0);

    assert_eq!(s.next(false).unwrap().unwrap().mark, 3);

    assert_eq!(s.queue(false).unwrap(), 0);
    assert_eq!(s.drops(), 0);
}

#[test]
fn nonblocking_next_on_idle_source_returns_none() {
    let mut s = session(Vec::new(), EnobufsPolicy::Raise);
    assert_eq!(s.queue(false).unwrap(), 0);
    assert!(s.next(false).unwrap().is_none());
}

#[test]
fn retry_ceiling_trips_after_exact_limit() {
    // every receive "succeeds" with bytes that parse to no packet messages
    let steps: Vec<Step> = (0..RECV_RETRY_LIMIT * 2)
        .map(|_| Step::Bytes(Vec::new()))
        .collect();
    let mut s = session(steps, EnobufsPolicy::Raise);

    match s.next(true) {
        Err(Error::RetryExhausted(n)) => assert_eq!(n, RECV_RETRY_LIMIT),
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
}

#[test]
fn raw_mode_attaches_wire_capture() {
    let payload = [1u8, 2, 3];
    let steps = vec![Step::Bytes(packet_message(9, &payload))];
    let mut s = session(steps, EnobufsPolicy::Raise);

    s.raw_mode(Some(true));
    let record = s.next(true).unwrap().unwrap();
    let capture = record.raw.as_ref().unwrap();
    assert_eq!(capture.devices[&2], "eth0");

    // the capture replays to the same record fields
    let mut replay = IngestSession::from_replay(std::iter::once(vec![capture.clone()]));
    let replayed = replay.next(true).unwrap().unwrap();
    assert_eq!(replayed.mark, record.mark);
    assert_eq!(replayed.payload, record.payload);
    assert_eq!(replayed.in_device, record.in_device);
}
