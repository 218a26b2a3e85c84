use embassy_time::Instant;
use embedded_hal::i2c::{ErrorKind, SevenBitAddress};
use heapless::Vec;

use crate::request::{Operation, Request, Status, WriteSource, MAX_TRANSFER_LEN};

/// Low-level driver for the bus peripheral.
///
/// Implementors run the byte-level protocol (start condition, address and
/// acknowledge, data, stop) and report progress through the [`Transfer`]
/// handed to [`advance`](Self::advance). The manager calls every method with
/// its lock held, so none of them may block on another transfer.
pub trait Hardware {
    /// Bring the peripheral to a known idle state.
    fn init(&mut self);

    /// Configure the bus clock frequency in Hz.
    fn set_clock(&mut self, clock_hz: u32);

    /// Start the physical transfer described by `transfer` (usually by
    /// issuing a start condition).
    fn begin_transfer(&mut self, transfer: &Transfer<'_>);

    /// Service one hardware event for the in-flight transfer.
    ///
    /// Move bytes with [`Transfer::next_tx_byte`] and
    /// [`Transfer::receive_byte`], and call [`Transfer::complete`] once the
    /// transfer finishes or fails. Leaving the status pending means more
    /// events are expected.
    fn advance(&mut self, transfer: &mut Transfer<'_>);

    /// Abort whatever the peripheral is doing and switch it off.
    fn close(&mut self);

    /// Best-effort recovery of a wedged bus, used after a timeout.
    fn shutdown_and_reset(&mut self) {
        self.close();
        self.init();
    }
}

/// Monotonic time source used to stamp and time out transfers.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the linked embassy-time driver.
#[cfg(feature = "time-driver")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[cfg(feature = "time-driver")]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Snapshot of the in-flight transaction.
///
/// Copied out of the [`Request`] when the transfer starts, so the event
/// handler never touches the request until it retires it.
pub struct Transfer<'a> {
    pub(crate) request: &'a Request<'a>,
    address: SevenBitAddress,
    operation: Operation,
    source: WriteSource,
    tx: Vec<u8, MAX_TRANSFER_LEN>,
    rx: Vec<u8, MAX_TRANSFER_LEN>,
    bytes_to_send: usize,
    bytes_to_receive: usize,
    tx_count: usize,
    status: Status,
    started_at: Instant,
}

impl<'a> Transfer<'a> {
    pub(crate) fn new(request: &'a Request<'a>) -> Self {
        request.with_slot(|slot| {
            let tx = match slot.source {
                WriteSource::Inline => slot.write.clone(),
                WriteSource::ReadOnly(_) => Vec::new(),
            };
            Self {
                request,
                address: slot.address,
                operation: slot.operation,
                source: slot.source,
                tx,
                rx: Vec::new(),
                bytes_to_send: slot.write_bytes().len(),
                bytes_to_receive: slot.read_len,
                tx_count: 0,
                status: Status::Pending,
                started_at: Instant::from_ticks(0),
            }
        })
    }

    pub(crate) fn stamp(&mut self, now: Instant) {
        self.started_at = now;
    }

    /// Target device address.
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Kind of transaction being performed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Length of the write phase.
    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    /// Length of the read phase.
    pub fn bytes_to_receive(&self) -> usize {
        self.bytes_to_receive
    }

    /// Bytes sent so far.
    pub fn tx_count(&self) -> usize {
        self.tx_count
    }

    /// Number of bytes received so far.
    pub fn rx_count(&self) -> usize {
        self.rx.len()
    }

    /// Bytes received so far.
    pub fn received(&self) -> &[u8] {
        &self.rx
    }

    /// `Pending` until [`complete`](Self::complete) or [`fail`](Self::fail) is called.
    pub fn status(&self) -> Status {
        self.status
    }

    /// When the transfer was begun on the bus.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Next byte to put on the bus, or `None` once the write phase is done.
    pub fn next_tx_byte(&mut self) -> Option<u8> {
        let bytes = match self.source {
            WriteSource::Inline => &self.tx[..],
            WriteSource::ReadOnly(bytes) => bytes,
        };
        let byte = bytes.get(self.tx_count).copied()?;
        self.tx_count += 1;
        Some(byte)
    }

    /// Bytes still to be read. The hardware usually NACKs the last one.
    pub fn rx_remaining(&self) -> usize {
        self.bytes_to_receive - self.rx.len()
    }

    /// Store a byte read from the bus. Returns `false` if the read phase
    /// is already complete and the byte was dropped.
    pub fn receive_byte(&mut self, byte: u8) -> bool {
        if self.rx_remaining() == 0 {
            return false;
        }
        self.rx.push(byte).is_ok()
    }

    /// Finish the transfer. Only the first terminal status sticks.
    pub fn complete(&mut self, status: Status) {
        if self.status.is_pending() {
            self.status = status;
        }
    }

    /// Finish the transfer with a hardware error.
    pub fn fail(&mut self, kind: ErrorKind) {
        self.complete(Status::Failed(kind));
    }

    /// Count reported back to the request when it retires.
    pub(crate) fn byte_count(&self) -> usize {
        if self.operation.is_read() {
            self.rx.len()
        } else {
            self.tx_count
        }
    }
}
