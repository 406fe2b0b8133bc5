//! Lifecycle scenarios against a scripted transport and a synthetic clock.
//! Nothing here sleeps: time is advanced by handing later `Instant`s to the
//! manager.

use anyhow::anyhow;
use cgmath::vec2;
use joycon_hub::joycon_wire::spi::pack_u12_pair;
use joycon_hub::{
    Config, ControllerSnapshot, DeviceHandle, DeviceIdentity, EventSink, HubError, InputUpdate,
    LifecycleState, Manager, Transport, TransportEvent,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Everything observable, in global order: transport writes interleaved
/// with sink callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Ev {
    Write { handle: DeviceHandle, opcode: u8 },
    Ready { handle: DeviceHandle, degraded: bool },
    Removed { handle: DeviceHandle },
    Update { handle: DeviceHandle },
}

type Log = Rc<RefCell<Vec<Ev>>>;

#[derive(Default)]
struct MockTransport {
    log: Log,
    writes: Rc<RefCell<Vec<(DeviceHandle, Vec<u8>)>>>,
    fail_open: HashSet<DeviceHandle>,
    open: Rc<RefCell<HashSet<DeviceHandle>>>,
}

impl Transport for MockTransport {
    fn open(&mut self, handle: DeviceHandle, _exclusive: bool) -> anyhow::Result<()> {
        if self.fail_open.contains(&handle) {
            return Err(anyhow!("exclusive seize refused"));
        }
        self.open.borrow_mut().insert(handle);
        Ok(())
    }

    fn write(&mut self, handle: DeviceHandle, report: &[u8]) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Ev::Write {
            handle,
            opcode: report[10],
        });
        self.writes.borrow_mut().push((handle, report.to_vec()));
        Ok(())
    }

    fn close(&mut self, handle: DeviceHandle) {
        self.open.borrow_mut().remove(&handle);
    }
}

#[derive(Default)]
struct RecordingSink {
    log: Log,
    readies: Rc<RefCell<Vec<ControllerSnapshot>>>,
    updates: Rc<RefCell<Vec<(DeviceHandle, InputUpdate)>>>,
}

impl EventSink for RecordingSink {
    fn on_controller_ready(&mut self, snapshot: &ControllerSnapshot) {
        self.log.borrow_mut().push(Ev::Ready {
            handle: snapshot.handle,
            degraded: snapshot.degraded,
        });
        self.readies.borrow_mut().push(snapshot.clone());
    }

    fn on_controller_removed(&mut self, handle: DeviceHandle) {
        self.log.borrow_mut().push(Ev::Removed { handle });
    }

    fn on_input_update(&mut self, handle: DeviceHandle, update: &InputUpdate) {
        self.log.borrow_mut().push(Ev::Update { handle });
        self.updates.borrow_mut().push((handle, update.clone()));
    }
}

struct Harness {
    mgr: Manager<MockTransport, RecordingSink>,
    log: Log,
    writes: Rc<RefCell<Vec<(DeviceHandle, Vec<u8>)>>>,
    readies: Rc<RefCell<Vec<ControllerSnapshot>>>,
    updates: Rc<RefCell<Vec<(DeviceHandle, InputUpdate)>>>,
    open: Rc<RefCell<HashSet<DeviceHandle>>>,
    t0: Instant,
}

impl Harness {
    fn new(config: Config) -> Harness {
        Harness::with_failing_open(config, &[])
    }

    fn with_failing_open(config: Config, fail_open: &[u32]) -> Harness {
        let log: Log = Rc::default();
        let writes = Rc::new(RefCell::new(vec![]));
        let readies = Rc::new(RefCell::new(vec![]));
        let updates = Rc::new(RefCell::new(vec![]));
        let open = Rc::new(RefCell::new(HashSet::new()));
        let transport = MockTransport {
            log: log.clone(),
            writes: writes.clone(),
            fail_open: fail_open.iter().map(|&n| DeviceHandle(n)).collect(),
            open: open.clone(),
        };
        let sink = RecordingSink {
            log: log.clone(),
            readies: readies.clone(),
            updates: updates.clone(),
        };
        Harness {
            mgr: Manager::new(transport, sink, config),
            log,
            writes,
            readies,
            updates,
            open,
            t0: Instant::now(),
        }
    }

    fn at(&self, offset_ms: u64) -> Instant {
        self.t0 + Duration::from_millis(offset_ms)
    }

    fn match_device(&mut self, id: u32, product_id: u16, at_ms: u64) -> Result<(), HubError> {
        let identity = DeviceIdentity {
            vendor_id: 0x057E,
            product_id,
            product_name: Some(format!("pad {}", id)),
            serial: None,
        };
        self.mgr.handle_event(
            TransportEvent::Matched {
                handle: DeviceHandle(id),
                identity,
            },
            self.at(at_ms),
        )
    }

    fn remove_device(&mut self, id: u32, at_ms: u64) {
        self.mgr
            .handle_event(
                TransportEvent::Removed {
                    handle: DeviceHandle(id),
                },
                self.at(at_ms),
            )
            .unwrap();
    }

    fn input(&mut self, id: u32, bytes: Vec<u8>, at_ms: u64) {
        self.mgr
            .handle_event(
                TransportEvent::Input {
                    handle: DeviceHandle(id),
                    read: Ok(bytes),
                },
                self.at(at_ms),
            )
            .unwrap();
    }

    fn last_write_to(&self, id: u32) -> Vec<u8> {
        self.writes
            .borrow()
            .iter()
            .rev()
            .find(|(h, _)| *h == DeviceHandle(id))
            .map(|(_, b)| b.clone())
            .expect("no write for device")
    }

    /// Feeds the scripted reply to the device's most recent request.
    fn reply_to_last(&mut self, id: u32, at_ms: u64) {
        let request = self.last_write_to(id);
        let opcode = request[10];
        let payload = match opcode {
            0x02 => device_info_payload(),
            0x10 => {
                let mut payload = request[11..16].to_vec();
                payload.extend_from_slice(&calibration_block());
                payload
            }
            _ => vec![],
        };
        self.input(id, subcmd_reply_frame(opcode, &payload), at_ms);
    }

    /// Settle wait, then answer every init request. Returns the ms offset
    /// after the ready transition.
    fn drive_init(&mut self, id: u32, settle_at_ms: u64) -> u64 {
        let mut at = settle_at_ms;
        self.mgr.poll(self.at(at));
        for _ in 0..4 {
            if self.is_ready(id) {
                break;
            }
            at += 1;
            self.reply_to_last(id, at);
        }
        assert!(self.is_ready(id), "device {} did not become ready", id);
        at
    }

    fn is_ready(&self, id: u32) -> bool {
        self.mgr
            .controller(DeviceHandle(id))
            .map(|c| c.state() == LifecycleState::Ready)
            .unwrap_or(false)
    }

    fn writes_to(&self, id: u32) -> usize {
        self.writes
            .borrow()
            .iter()
            .filter(|(h, _)| *h == DeviceHandle(id))
            .count()
    }

    fn ready_count(&self, id: u32) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|ev| matches!(ev, Ev::Ready { handle, .. } if *handle == DeviceHandle(id)))
            .count()
    }
}

fn standard_frame() -> Vec<u8> {
    let mut buf = vec![0u8; 49];
    buf[0] = 0x30;
    buf[2] = 4 << 5; // battery full, not charging
    buf[6..9].copy_from_slice(&pack_u12_pair(0x800, 0x800));
    buf[9..12].copy_from_slice(&pack_u12_pair(0x800, 0x800));
    buf
}

fn subcmd_reply_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = standard_frame();
    buf[0] = 0x21;
    buf[13] = 0x80;
    buf[14] = opcode;
    buf[15..15 + payload.len()].copy_from_slice(payload);
    buf
}

fn device_info_payload() -> Vec<u8> {
    vec![3, 72, 2, 2, 0xdc, 0x68, 0xeb, 0x01, 0x02, 0x03, 1, 0]
}

/// 18-byte factory block: left x 1300/1800/2200, right x 1500/2100/2800.
fn calibration_block() -> Vec<u8> {
    let mut block = vec![];
    block.extend_from_slice(&pack_u12_pair(400, 300)); // left above center
    block.extend_from_slice(&pack_u12_pair(1800, 1900)); // left center
    block.extend_from_slice(&pack_u12_pair(500, 600)); // left below center
    block.extend_from_slice(&pack_u12_pair(2100, 2200)); // right center
    block.extend_from_slice(&pack_u12_pair(600, 500)); // right below center
    block.extend_from_slice(&pack_u12_pair(700, 800)); // right above center
    block
}

#[test]
fn two_devices_initialize_strictly_in_order() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.match_device(2, 0x2007, 10).unwrap();

    // Nothing is sent before the settle delay.
    assert_eq!(h.writes.borrow().len(), 0);
    assert_eq!(h.mgr.next_deadline(), Some(h.at(250)));

    let after_a = h.drive_init(1, 250);
    // B's settle wait starts only at A's completion.
    assert_eq!(h.writes_to(2), 0);
    assert_eq!(h.mgr.next_deadline(), Some(h.at(after_a) + Duration::from_millis(250)));
    h.drive_init(2, after_a + 250);

    // Global order: every A write and A's ready precede any B write.
    let log = h.log.borrow();
    let a_ready = log
        .iter()
        .position(|ev| matches!(ev, Ev::Ready { handle, .. } if *handle == DeviceHandle(1)))
        .unwrap();
    let first_b_write = log
        .iter()
        .position(|ev| matches!(ev, Ev::Write { handle, .. } if *handle == DeviceHandle(2)))
        .unwrap();
    assert!(a_ready < first_b_write);
    drop(log);

    // Full init sequence: device info, SPI calibration read, report mode.
    assert_eq!(h.writes_to(1), 3);
    let readies = h.readies.borrow();
    assert_eq!(readies.len(), 2);
    assert!(!readies[0].degraded);
    assert_eq!(readies[0].serial.as_deref(), Some("dc:68:eb:01:02:03"));
    assert_eq!(readies[0].calibration.left.x.min, 1300);
    assert_eq!(readies[0].calibration.left.x.center, 1800);
    assert_eq!(readies[0].calibration.left.x.max, 2200);
    assert_eq!(readies[0].calibration.right.x.center, 2100);
}

#[test]
fn dropped_reply_is_retried_once_then_succeeds() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.mgr.poll(h.at(250));
    assert_eq!(h.writes_to(1), 1);

    // First device-info reply is dropped: time out once, resend.
    let deadline = h.mgr.next_deadline().unwrap();
    assert_eq!(deadline, h.at(250) + Duration::from_secs(3));
    h.mgr.poll(deadline);
    assert_eq!(h.writes_to(1), 2, "identical request resent");

    // The resend is answered, and the rest of the sequence proceeds.
    h.reply_to_last(1, 3251);
    h.reply_to_last(1, 3252);
    h.reply_to_last(1, 3253);
    assert!(h.is_ready(1));
    assert_eq!(h.writes_to(1), 4);
    assert!(!h.readies.borrow()[0].degraded);
    assert_eq!(h.readies.borrow()[0].calibration.left.x.center, 1800);

    let info_requests = h
        .writes
        .borrow()
        .iter()
        .filter(|(_, b)| b[10] == 0x02)
        .count();
    assert_eq!(info_requests, 2);
}

#[test]
fn silent_device_becomes_ready_with_fallback_calibration() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2009, 0).unwrap();

    // Never reply; just follow the deadlines the manager reports.
    for _ in 0..64 {
        match h.mgr.next_deadline() {
            Some(deadline) => {
                h.mgr.poll(deadline);
            }
            None => break,
        }
    }

    assert!(h.is_ready(1), "never stuck in Initializing");
    // 3 attempts for each of the 3 init requests.
    assert_eq!(h.writes_to(1), 9);
    let readies = h.readies.borrow();
    assert_eq!(readies.len(), 1);
    assert!(readies[0].degraded);
    assert_eq!(readies[0].calibration.left.x.center, 0x800);
    assert_eq!(h.mgr.next_deadline(), None);
}

#[test]
fn disconnect_while_queued_is_skipped() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.match_device(2, 0x2007, 5).unwrap();
    h.remove_device(2, 20);

    let after_a = h.drive_init(1, 250);
    h.mgr.poll(h.at(after_a + 1));

    // The queue drained without serving B and the slot is free again.
    assert_eq!(h.mgr.next_deadline(), None);
    assert_eq!(h.writes_to(2), 0);
    assert_eq!(h.ready_count(2), 0);
    assert!(h
        .log
        .borrow()
        .contains(&Ev::Removed { handle: DeviceHandle(2) }));
}

#[test]
fn disconnect_during_init_vacates_the_slot() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.match_device(2, 0x2007, 5).unwrap();

    // A's first request is outstanding when A disappears.
    h.mgr.poll(h.at(250));
    assert_eq!(h.writes_to(1), 1);
    h.remove_device(1, 300);

    // B is served next; A never becomes ready.
    assert_eq!(h.mgr.next_deadline(), Some(h.at(300) + Duration::from_millis(250)));
    h.drive_init(2, 550);
    assert_eq!(h.ready_count(1), 0);
    assert_eq!(h.ready_count(2), 1);
    assert!(!h.open.borrow().contains(&DeviceHandle(1)));
}

#[test]
fn duplicate_match_creates_one_entry() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.match_device(1, 0x2006, 1).unwrap();

    assert_eq!(h.mgr.controllers().count(), 1);
    let after = h.drive_init(1, 250);
    h.mgr.poll(h.at(after + 1));

    // One ready callback, and no second queue entry left to serve.
    assert_eq!(h.ready_count(1), 1);
    assert_eq!(h.mgr.next_deadline(), None);
}

#[test]
fn unknown_product_id_is_ignored() {
    let mut h = Harness::new(Config::default());
    assert!(h.match_device(1, 0x1234, 0).is_ok());
    assert_eq!(h.mgr.controllers().count(), 0);
    assert_eq!(h.mgr.next_deadline(), None);
    assert_eq!(h.writes.borrow().len(), 0);
}

#[test]
fn open_failure_only_affects_that_device() {
    let mut h = Harness::with_failing_open(Config::default(), &[1]);
    match h.match_device(1, 0x2006, 0) {
        Err(HubError::TransportOpenFailure { handle, .. }) => {
            assert_eq!(handle, DeviceHandle(1))
        }
        other => panic!("expected open failure, got {:?}", other.err()),
    }
    assert_eq!(h.mgr.controllers().count(), 0);

    h.match_device(2, 0x2007, 10).unwrap();
    h.drive_init(2, 260);
    assert_eq!(h.ready_count(2), 1);
}

#[test]
fn removal_of_never_matched_handle_is_a_noop() {
    let mut h = Harness::new(Config::default());
    h.remove_device(7, 0);
    assert!(h.log.borrow().is_empty());
}

#[test]
fn input_keeps_flowing_during_initialization() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    h.mgr.poll(h.at(250));

    // A periodic report while the device-info request is outstanding.
    let mut frame = standard_frame();
    frame[3] = 0x08; // A button
    frame[2] = (2 << 5) | 0x10; // battery low, charging
    h.input(1, frame, 300);

    let updates = h.updates.borrow();
    assert_eq!(updates.len(), 1);
    let (handle, update) = &updates[0];
    assert_eq!(*handle, DeviceHandle(1));
    assert!(update.buttons.right.a());
    assert!(update.charging);
    assert_eq!(update.left_stick, vec2(0.0, 0.0));
    drop(updates);

    let ctrl = h.mgr.controller(DeviceHandle(1)).unwrap();
    assert!(ctrl.charging);
    assert_eq!(ctrl.state(), LifecycleState::Initializing);
}

#[test]
fn failed_read_leaves_state_untouched() {
    let mut h = Harness::new(Config::default());
    h.match_device(1, 0x2006, 0).unwrap();
    let after = h.drive_init(1, 250);
    let updates_before = h.updates.borrow().len();

    h.mgr
        .handle_event(
            TransportEvent::Input {
                handle: DeviceHandle(1),
                read: Err(anyhow!("io error -536870212")),
            },
            h.at(after + 5),
        )
        .unwrap();

    assert!(h.is_ready(1));
    assert_eq!(h.updates.borrow().len(), updates_before);
}

#[test]
fn tight_profile_primes_and_spaces_requests() {
    let mut h = Harness::new(Config::tight());
    h.match_device(1, 0x2006, 0).unwrap();
    h.mgr.poll(h.at(250));

    // First request is the priming no-op.
    assert_eq!(h.last_write_to(1)[10], 0x00);
    h.reply_to_last(1, 251);

    // The follow-up is rate limited to 25ms after the priming send.
    assert_eq!(h.writes_to(1), 1);
    assert_eq!(h.mgr.next_deadline(), Some(h.at(275)));
    h.mgr.poll(h.at(275));
    assert_eq!(h.writes_to(1), 2);
    assert_eq!(h.last_write_to(1)[10], 0x02);

    h.reply_to_last(1, 301);
    h.mgr.poll(h.at(326));
    h.reply_to_last(1, 352);
    h.mgr.poll(h.at(377));
    h.reply_to_last(1, 403);
    assert!(h.is_ready(1));
}
