use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use softu2f_device::{
    Device, DeviceConfig, DeviceContext, DeviceError, HostClient, ManualClock, ShutdownHandle,
};
use softu2f_frame::command::errors::{
    ERR_CHANNEL_BUSY, ERR_INVALID_LEN, ERR_INVALID_SEQ, ERR_OTHER,
};
use softu2f_frame::{
    decode_frame, Frame, FrameBody, Message, CID_BROADCAST, CONT_DATA_SIZE, INIT_DATA_SIZE,
    U2FHID_INIT, U2FHID_LOCK, U2FHID_MSG, U2FHID_PING, U2FHID_SYNC,
};
use softu2f_transport::{FrameTransport, Incoming, MemoryTransport};

struct Harness {
    client: HostClient<MemoryTransport>,
    clock: ManualClock,
    shutdown: ShutdownHandle,
    worker: Option<JoinHandle<softu2f_device::Result<()>>>,
}

impl Harness {
    fn start() -> Self {
        Self::start_with(|_| {})
    }

    fn start_with(setup: impl FnOnce(&mut Device)) -> Self {
        let (device_end, host_end) = MemoryTransport::pair();
        let clock = ManualClock::new();
        let config = DeviceConfig {
            input_wait_ms: 10,
            frame_pacing_ms: 0,
            ..DeviceConfig::default()
        };
        let mut device = Device::open_with_clock(device_end, config, clock.clone())
            .expect("device should open");
        setup(&mut device);
        let shutdown = device.shutdown_handle();
        let worker = std::thread::spawn(move || device.run());

        Self {
            client: HostClient::new(host_end).with_timeout(Duration::from_secs(2)),
            clock,
            shutdown,
            worker: Some(worker),
        }
    }

    fn send_raw(&mut self, frame: Frame) {
        let report = frame.to_report().expect("frame should encode");
        self.client
            .transport_mut()
            .send_frame(&report)
            .expect("host send should succeed");
    }

    /// Collect `n` raw frames from the device.
    fn frames(&mut self, n: usize) -> Vec<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let transport = self.client.transport_mut();
        let mut frames = Vec::new();
        while frames.len() < n {
            match transport.receive_frame().expect("host receive should succeed") {
                Incoming::Report(raw) => frames.push(decode_frame(&raw).unwrap()),
                Incoming::NoDataYet => {
                    assert!(Instant::now() < deadline, "timed out waiting for frames");
                    transport.wait_for_input(Duration::from_millis(20)).unwrap();
                }
            }
        }
        frames
    }

    fn expect_error(&mut self, cid: u32, code: u8) {
        let reply = self.client.receive(cid).expect("error reply expected");
        assert_eq!(reply.error_code(), Some(code), "reply: {reply:?}");
    }

    fn stop(mut self) -> softu2f_device::Result<()> {
        self.shutdown.request();
        self.worker
            .take()
            .expect("worker present")
            .join()
            .expect("device thread should not panic")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.request();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[test]
fn scenario_a_short_ping() {
    let mut h = Harness::start();
    let cid = h.client.init().unwrap().cid;
    assert_eq!(cid, 1);

    h.send_raw(Frame::init(cid, U2FHID_PING, 5, &b"hello"[..]));
    let frames = h.frames(1);
    match &frames[0].body {
        FrameBody::Init { cmd, bcnt, data } => {
            assert_eq!(frames[0].cid, cid);
            assert_eq!(*cmd, U2FHID_PING);
            assert_eq!(*bcnt, 5);
            assert_eq!(&data[..5], b"hello");
            assert!(data[5..].iter().all(|b| *b == 0));
        }
        other => panic!("expected INIT frame, got {other:?}"),
    }
    h.stop().unwrap();
}

#[test]
fn scenario_b_multi_frame_ping() {
    let mut h = Harness::start();
    h.client.init().unwrap();

    for (len, frames) in [(83usize, 2usize), (117, 3)] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let msg = Message::new(h.client.cid(), U2FHID_PING, payload.clone());
        for frame in softu2f_frame::fragment(&msg).unwrap() {
            h.send_raw(frame);
        }
        let out = h.frames(frames);
        assert!(out[0].is_init());
        for (seq, frame) in out[1..].iter().enumerate() {
            assert!(matches!(frame.body, FrameBody::Cont { seq: s, .. } if usize::from(s) == seq));
        }
        let mut echoed = out[0].data()[..INIT_DATA_SIZE].to_vec();
        for frame in &out[1..] {
            echoed.extend_from_slice(&frame.data()[..CONT_DATA_SIZE]);
        }
        echoed.truncate(len);
        assert_eq!(echoed, payload);
    }
    h.stop().unwrap();
}

#[test]
fn scenario_c_init_on_broadcast() {
    let mut h = Harness::start();
    let nonce = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
    h.send_raw(Frame::init(CID_BROADCAST, U2FHID_INIT, 8, nonce.to_vec()));

    let reply = h.client.receive(CID_BROADCAST).unwrap();
    assert_eq!(reply.cmd, U2FHID_INIT);
    assert_eq!(reply.len(), 17);
    assert_eq!(&reply.payload[..8], &nonce);
    assert_eq!(&reply.payload[8..12], &[0, 0, 0, 1]);
    assert_eq!(&reply.payload[12..], &[2, 0, 0, 0, 0x01]);

    // The counter advances; a non-broadcast INIT echoes its own channel.
    let second = h.client.init().unwrap();
    assert_eq!(second.cid, 2);
    let resync = h.client.init().unwrap();
    assert_eq!(resync.cid, 2);
    h.stop().unwrap();
}

#[test]
fn scenario_d_lock_gates_other_channels() {
    let mut h = Harness::start();
    let a = h.client.init().unwrap().cid;
    h.client.set_cid(CID_BROADCAST);
    let b = h.client.init().unwrap().cid;
    assert_ne!(a, b);

    h.client.set_cid(a);
    h.client.lock(3).unwrap();
    assert_eq!(h.client.ping(&b"mine"[..]).unwrap().as_ref(), b"mine");

    h.client.set_cid(b);
    let err = h.client.ping(&b"blocked"[..]).unwrap_err();
    assert!(matches!(err, DeviceError::Remote { code } if code == ERR_CHANNEL_BUSY));

    h.clock.advance(Duration::from_secs(3));
    assert_eq!(h.client.ping(&b"free"[..]).unwrap().as_ref(), b"free");
    h.stop().unwrap();
}

#[test]
fn lock_duration_is_clamped_to_ten_seconds() {
    let mut h = Harness::start();
    let a = h.client.init().unwrap().cid;
    h.client.set_cid(CID_BROADCAST);
    let b = h.client.init().unwrap().cid;

    h.client.set_cid(a);
    h.client.lock(200).unwrap();

    h.client.set_cid(b);
    h.clock.advance(Duration::from_millis(9_999));
    assert!(matches!(
        h.client.ping(&b"x"[..]),
        Err(DeviceError::Remote { code: ERR_CHANNEL_BUSY })
    ));
    h.clock.advance(Duration::from_millis(1));
    h.client.ping(&b"x"[..]).unwrap();
    h.stop().unwrap();
}

#[test]
fn lock_zero_releases() {
    let mut h = Harness::start();
    let a = h.client.init().unwrap().cid;
    h.client.set_cid(CID_BROADCAST);
    let b = h.client.init().unwrap().cid;

    h.client.set_cid(a);
    h.client.lock(5).unwrap();
    h.client.lock(0).unwrap();
    h.client.set_cid(b);
    h.client.ping(&b"x"[..]).unwrap();
    h.stop().unwrap();
}

#[test]
fn scenario_e_bad_sequence_then_recovery() {
    let mut h = Harness::start();
    let cid = h.client.init().unwrap().cid;

    h.send_raw(Frame::init(cid, U2FHID_PING, 100, vec![0xAB; INIT_DATA_SIZE]));
    h.send_raw(Frame::cont(cid, 1, vec![0xAB; CONT_DATA_SIZE]));
    h.expect_error(cid, ERR_INVALID_SEQ);

    let reply = h.client.ping(vec![0x11; 100]).unwrap();
    assert_eq!(reply.len(), 100);
    h.stop().unwrap();
}

#[test]
fn second_init_while_in_flight_is_busy() {
    let mut h = Harness::start();
    let a = h.client.init().unwrap().cid;
    h.client.set_cid(CID_BROADCAST);
    let b = h.client.init().unwrap().cid;

    h.send_raw(Frame::init(a, U2FHID_PING, 60, vec![1; INIT_DATA_SIZE]));
    h.send_raw(Frame::init(b, U2FHID_PING, 1, vec![2]));
    h.expect_error(b, ERR_CHANNEL_BUSY);

    h.send_raw(Frame::cont(a, 0, vec![3; 3]));
    let reply = h.client.receive(a).unwrap();
    assert_eq!(reply.cmd, U2FHID_PING);
    assert_eq!(reply.len(), 60);
    assert_eq!(&reply.payload[57..], &[3, 3, 3]);
    h.stop().unwrap();
}

#[test]
fn stray_cont_and_malformed_reports_are_dropped_quietly() {
    let mut h = Harness::start();
    let cid = h.client.init().unwrap().cid;

    h.send_raw(Frame::cont(cid, 0, vec![9; 4]));
    h.client
        .transport_mut()
        .send_raw(Bytes::from_static(&[0u8; 10]))
        .unwrap();
    assert_eq!(h.client.ping(&b"still here"[..]).unwrap().as_ref(), b"still here");
    h.stop().unwrap();
}

#[test]
fn sync_cancels_in_flight_message() {
    let mut h = Harness::start();
    let cid = h.client.init().unwrap().cid;

    h.send_raw(Frame::init(cid, U2FHID_PING, 200, vec![0; INIT_DATA_SIZE]));
    h.send_raw(Frame::init(cid, U2FHID_SYNC, 1, vec![0x5c]));
    let reply = h.client.receive(cid).unwrap();
    assert_eq!(reply.cmd, U2FHID_SYNC);
    assert_eq!(reply.payload.as_ref(), &[0x5c]);

    // The cancelled message is gone; a CONT for it is ignored.
    h.send_raw(Frame::cont(cid, 0, vec![0; CONT_DATA_SIZE]));
    h.client.ping(&b"after"[..]).unwrap();
    h.stop().unwrap();
}

#[test]
fn msg_without_handler_is_err_other() {
    let mut h = Harness::start();
    h.client.init().unwrap();
    let err = h.client.msg(vec![0x00, 0x03, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err, DeviceError::Remote { code } if code == ERR_OTHER));
    // The loop keeps serving.
    h.client.wink().unwrap();
    h.stop().unwrap();
}

#[test]
fn registered_handlers_serve_msg_and_vendor_commands() {
    let mut h = Harness::start_with(|device| {
        device
            .register_handler(
                U2FHID_MSG,
                |ctx: &mut DeviceContext, msg: &Message| -> softu2f_device::Result<()> {
                    ctx.send_message(&Message::new(msg.cid, U2FHID_MSG, vec![0x90, 0x00]))
                },
            )
            .unwrap();
        device
            .register_handler(
                0xc1,
                |ctx: &mut DeviceContext, msg: &Message| -> softu2f_device::Result<()> {
                    let mut reversed = msg.payload.to_vec();
                    reversed.reverse();
                    ctx.send_message(&Message::new(msg.cid, msg.cmd, reversed))
                },
            )
            .unwrap();
        device
            .register_handler(
                U2FHID_PING,
                |_: &mut DeviceContext, _: &Message| -> softu2f_device::Result<()> {
                    Err(DeviceError::handler("ping disabled"))
                },
            )
            .unwrap();
    });
    h.client.init().unwrap();

    assert_eq!(h.client.msg(vec![0u8; 7]).unwrap().as_ref(), &[0x90, 0x00]);
    assert_eq!(h.client.transact(0xc1, vec![1, 2, 3]).unwrap().as_ref(), &[3, 2, 1]);

    // A failing override sends nothing but does not stop the device.
    h.client.set_timeout(Duration::from_millis(100));
    assert!(matches!(
        h.client.ping(&b"x"[..]),
        Err(DeviceError::Timeout(_))
    ));
    h.client.wink().unwrap();
    h.stop().unwrap();
}

#[test]
fn wrong_payload_lengths_are_invalid_len() {
    let mut h = Harness::start();
    let cid = h.client.init().unwrap().cid;

    h.send_raw(Frame::init(cid, U2FHID_INIT, 4, vec![1, 2, 3, 4]));
    h.expect_error(cid, ERR_INVALID_LEN);
    h.send_raw(Frame::init(cid, U2FHID_LOCK, 2, vec![1, 2]));
    h.expect_error(cid, ERR_INVALID_LEN);
    h.send_raw(Frame::init(cid, U2FHID_PING, 7610, Bytes::new()));
    h.expect_error(cid, ERR_INVALID_LEN);
    h.stop().unwrap();
}

#[test]
fn host_hangup_stops_the_loop_with_transport_error() {
    let mut h = Harness::start();
    let worker = h.worker.take().expect("worker present");
    let idle = HostClient::new(MemoryTransport::pair().0);
    drop(std::mem::replace(&mut h.client, idle));

    let result = worker.join().expect("device thread should not panic");
    assert!(matches!(result, Err(ref err) if err.is_fatal()));
}
