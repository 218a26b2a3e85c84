use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use i2c_manager::{
    Clock, Config, ErrorKind, EventDelivery, Hardware, I2cManager, Instant,
    NoAcknowledgeSource, Request, Status, Transfer,
};
use pcf8574::{Error, Pcf8574};

// ---------------------------------------------------------------------------
// Mock expander on a mock bus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ExpanderState {
    /// Byte the device returns on reads.
    inputs: u8,
    /// Every byte written to the device, in order.
    written: Vec<u8>,
    clock_hz: Option<u32>,
    init_calls: usize,
    nack: bool,
}

#[derive(Clone, Default)]
struct MockBus {
    state: Arc<Mutex<ExpanderState>>,
}

impl Hardware for MockBus {
    fn init(&mut self) {
        self.state.lock().unwrap().init_calls += 1;
    }

    fn set_clock(&mut self, clock_hz: u32) {
        self.state.lock().unwrap().clock_hz = Some(clock_hz);
    }

    fn begin_transfer(&mut self, _transfer: &Transfer<'_>) {}

    fn advance(&mut self, transfer: &mut Transfer<'_>) {
        let mut state = self.state.lock().unwrap();
        if state.nack {
            transfer.fail(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            return;
        }
        while let Some(byte) = transfer.next_tx_byte() {
            state.written.push(byte);
        }
        while transfer.rx_remaining() > 0 {
            transfer.receive_byte(state.inputs);
        }
        transfer.complete(Status::Ok);
    }

    fn close(&mut self) {}
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(0)
    }
}

type Manager<'a> = I2cManager<'a, CriticalSectionRawMutex, MockBus, FixedClock>;

fn make_manager<'a>() -> (Manager<'a>, MockBus) {
    let bus = MockBus::default();
    let config = Config::default().with_event_delivery(EventDelivery::Polled);
    let mgr = I2cManager::new(bus.clone(), FixedClock, config);
    mgr.initialize();
    (mgr, bus)
}

const ADDR: u8 = 0x20;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn begin_selects_standard_mode() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, bus) = make_manager();
    mgr.set_clock(400_000);

    let dev = Pcf8574::new(&mgr, ADDR, 100, 8, &wr, &rd);
    dev.begin();

    let state = bus.state.lock().unwrap();
    assert_eq!(state.clock_hz, Some(100_000));
    // The manager is brought up by the application, not the driver.
    assert_eq!(state.init_calls, 1);
}

#[test]
fn write_pin_updates_port_byte() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, bus) = make_manager();
    let mut dev = Pcf8574::new(&mgr, ADDR, 100, 8, &wr, &rd);

    dev.write_pin(100, true).unwrap();
    dev.write_pin(103, true).unwrap();
    dev.write_pin(100, false).unwrap();
    wr.wait(&mgr);

    assert_eq!(dev.port_state(), 0b0000_1000);
    assert_eq!(bus.state.lock().unwrap().written, vec![0x01, 0x09, 0x08]);
}

#[test]
fn read_pin_releases_line_then_reads() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, bus) = make_manager();
    bus.state.lock().unwrap().inputs = 0b0000_0100;
    let mut dev = Pcf8574::new(&mgr, ADDR, 0, 8, &wr, &rd);

    assert_eq!(dev.read_pin(2), Ok(true));
    assert_eq!(dev.read_pin(3), Ok(false));

    // Both pins were released high before their reads.
    assert_eq!(bus.state.lock().unwrap().written, vec![0x04, 0x0C]);
}

#[test]
fn foreign_pin_is_rejected() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, _) = make_manager();
    let mut dev = Pcf8574::new(&mgr, ADDR, 10, 4, &wr, &rd);

    assert!(dev.owns(13));
    assert!(!dev.owns(14));
    assert_eq!(dev.write_pin(14, true), Err(Error::InvalidPin(14)));
    assert_eq!(dev.read_pin(9), Err(Error::InvalidPin(9)));
}

#[test]
fn pin_count_is_clamped_to_device() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, _) = make_manager();
    let dev = Pcf8574::new(&mgr, ADDR, 0, 16, &wr, &rd);

    assert!(dev.owns(7));
    assert!(!dev.owns(8));
}

#[test]
fn smaller_pin_count_is_kept() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, _) = make_manager();
    let mut dev = Pcf8574::new(&mgr, ADDR, 0, 4, &wr, &rd);

    assert!(dev.owns(3));
    assert!(!dev.owns(4));
    assert_eq!(dev.write_pin(4, true), Err(Error::InvalidPin(4)));
}

#[test]
fn pin_range_at_top_of_numbering_does_not_overflow() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, bus) = make_manager();
    let mut dev = Pcf8574::new(&mgr, ADDR, 65530, 8, &wr, &rd);

    assert!(!dev.owns(65529));
    assert!(dev.owns(65530));
    assert!(dev.owns(65535));
    dev.display();

    dev.write_pin(65535, true).unwrap();
    wr.wait(&mgr);
    assert_eq!(bus.state.lock().unwrap().written, vec![0x20]);
}

#[test]
fn bus_failure_surfaces_on_read() {
    let (wr, rd) = (Request::new(), Request::new());
    let (mgr, bus) = make_manager();
    bus.state.lock().unwrap().nack = true;
    let mut dev = Pcf8574::new(&mgr, ADDR, 0, 8, &wr, &rd);

    assert_eq!(
        dev.read_pin(0),
        Err(Error::Bus(Status::Failed(ErrorKind::NoAcknowledge(
            NoAcknowledgeSource::Address
        ))))
    );
}
