use core::cell::RefCell;
use core::mem;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Duration;
use embedded_hal::i2c::SevenBitAddress;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{Config, EventDelivery};
use crate::error::Error;
use crate::hardware::{Clock, Hardware, Transfer};
use crate::queue::Queue;
use crate::request::{Request, Status};

/// Manager whose lock masks interrupts, for use from an interrupt handler.
pub type SharedI2cManager<'a, H, C> = I2cManager<'a, CriticalSectionRawMutex, H, C>;

/// Phase state machine for the bus.
enum Phase<'a> {
    /// No transfer in flight.
    Free,
    /// The queue head is on the bus.
    Active(Transfer<'a>),
}

struct Inner<'a, H> {
    hw: H,
    queue: Queue<'a>,
    phase: Phase<'a>,
    config: Config,
}

/// Non-blocking transaction manager for a shared I2C bus.
///
/// Requests are served strictly in submission order with at most one on the
/// bus at a time. All shared state sits behind one blocking mutex; with
/// [`CriticalSectionRawMutex`] taking it masks the bus interrupt, so the
/// foreground loop and the hardware-event context never interleave. Each
/// section covers a queue relink, a phase change, and the hardware call
/// that goes with it, never a whole transfer.
pub struct I2cManager<'a, M: RawMutex, H: Hardware, C: Clock> {
    inner: Mutex<M, RefCell<Inner<'a, H>>>,
    clock: C,
    recoveries: AtomicU32,
}

impl<'a, M: RawMutex, H: Hardware, C: Clock> I2cManager<'a, M, H, C> {
    /// Create a manager around `hw`. Nothing touches the peripheral until
    /// [`initialize`](Self::initialize).
    pub const fn new(hw: H, clock: C, config: Config) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                hw,
                queue: Queue::new(),
                phase: Phase::Free,
                config,
            })),
            clock,
            recoveries: AtomicU32::new(0),
        }
    }

    /// Reset the queue and bring the peripheral up at the configured clock.
    ///
    /// Anything still queued is forgotten without being retired, so only
    /// call this before the first submission or after [`try_shutdown`](Self::try_shutdown).
    pub fn initialize(&self) {
        self.with_inner(|inner| {
            inner.queue.clear();
            inner.phase = Phase::Free;
            inner.hw.init();
            inner.hw.set_clock(inner.config.clock_hz);
            info!("i2c: initialised at {} Hz", inner.config.clock_hz);
        });
    }

    /// Change the bus clock. Must not be called with transfers queued.
    pub fn set_clock(&self, clock_hz: u32) {
        self.with_inner(|inner| {
            inner.config.clock_hz = clock_hz;
            inner.hw.set_clock(clock_hz);
        });
    }

    /// Set how long a transfer may stay in flight. Zero disables the check.
    pub fn set_timeout(&self, timeout: Duration) {
        self.with_inner(|inner| inner.config.timeout = timeout);
    }

    /// Current transfer timeout; zero when disabled.
    pub fn timeout(&self) -> Duration {
        self.with_inner(|inner| inner.config.timeout)
    }

    /// Queue a write of `data` to `address`, after waiting for any earlier
    /// use of `request` to finish.
    pub fn write(
        &self,
        address: SevenBitAddress,
        data: &[u8],
        request: &'a Request<'a>,
    ) -> Result<(), Error> {
        request.wait(self);
        request.set_write_params(address, data)?;
        self.submit(request)
    }

    /// Like [`write`](Self::write), but sends straight from a read-only
    /// `'static` buffer.
    pub fn write_static(
        &self,
        address: SevenBitAddress,
        data: &'static [u8],
        request: &'a Request<'a>,
    ) -> Result<(), Error> {
        request.wait(self);
        request.set_write_params_static(address, data)?;
        self.submit(request)
    }

    /// Queue a read of `read_len` bytes from `address`, preceded by a write
    /// of `write` when it is not empty.
    pub fn read(
        &self,
        address: SevenBitAddress,
        read_len: usize,
        write: &[u8],
        request: &'a Request<'a>,
    ) -> Result<(), Error> {
        request.wait(self);
        request.set_read_params(address, read_len, write)?;
        self.submit(request)
    }

    /// Queue an already configured request.
    ///
    /// Returns [`Error::Pending`] if the request is still queued or in
    /// flight; it is left untouched in that case.
    pub fn submit(&self, request: &'a Request<'a>) -> Result<(), Error> {
        request.arm()?;
        self.with_inner(|inner| {
            inner.queue.push_back(request);
            inner.start_if_idle(&self.clock);
        });
        Ok(())
    }

    /// Run one foreground scheduling cycle.
    ///
    /// Services the peripheral first when events are polled, then checks
    /// the in-flight transfer against the timeout.
    pub fn tick(&self) {
        let polled = self.with_inner(|inner| {
            inner.config.event_delivery == EventDelivery::Polled
        });
        if polled {
            self.on_hardware_event();
        }
        self.check_for_timeout();
    }

    /// Hardware-event entry point, to be called from the bus interrupt.
    ///
    /// The lock is held for the whole handler, retirement and the start of
    /// the next transfer included, so a nested event can never see a
    /// half-retired snapshot.
    pub fn on_hardware_event(&self) {
        self.with_inner(|inner| inner.handle_event(&self.clock));
    }

    fn check_for_timeout(&self) {
        let recovered =
            self.with_inner(|inner| inner.check_for_timeout(&self.clock));
        if recovered {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `true` when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.with_inner(|inner| {
            inner.queue.is_empty() && matches!(inner.phase, Phase::Free)
        })
    }

    /// Number of requests queued, the in-flight one included.
    pub fn queued(&self) -> usize {
        self.with_inner(|inner| inner.queue.len())
    }

    /// Number of timeout recoveries performed so far.
    pub fn recovery_count(&self) -> u32 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Switch the peripheral off if the bus is idle.
    ///
    /// Returns `Err(InUse(n))` while `n` requests are still queued.
    pub fn try_shutdown(&self) -> Result<(), Error> {
        self.with_inner(|inner| {
            let n = inner.queue.len();
            if n > 0 {
                return Err(Error::InUse(n));
            }
            inner.hw.close();
            info!("i2c: shut down");
            Ok(())
        })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<'a, H>) -> R) -> R {
        self.inner.lock(|inner| f(&mut inner.borrow_mut()))
    }
}

impl<'a, H: Hardware> Inner<'a, H> {
    /// The only FREE -> ACTIVE transition. Does nothing unless the bus is
    /// free and something is queued, so it is safe to call speculatively.
    /// The start stamp is taken once the hardware has begun the transfer.
    fn start_if_idle<C: Clock>(&mut self, clock: &C) {
        if !matches!(self.phase, Phase::Free) {
            return;
        }
        let Some(request) = self.queue.front() else {
            return;
        };
        let mut transfer = Transfer::new(request);
        trace!(
            "i2c: start {:?} to {=u8:#x}",
            transfer.operation(),
            transfer.address()
        );
        self.hw.begin_transfer(&transfer);
        transfer.stamp(clock.now());
        self.phase = Phase::Active(transfer);
    }

    fn handle_event<C: Clock>(&mut self, clock: &C) {
        let Phase::Active(transfer) = &mut self.phase else {
            debug!("i2c: spurious event while idle");
            return;
        };
        self.hw.advance(transfer);
        if transfer.status().is_pending() {
            return;
        }
        self.retire_active(None);
        self.start_if_idle(clock);
    }

    fn check_for_timeout<C: Clock>(&mut self, clock: &C) -> bool {
        let timeout = self.config.timeout;
        if timeout.as_ticks() == 0 {
            return false;
        }
        let now = clock.now();
        let Phase::Active(transfer) = &self.phase else {
            return false;
        };
        if now.saturating_duration_since(transfer.started_at()) <= timeout {
            return false;
        }

        warn!(
            "i2c: transfer to {=u8:#x} timed out, resetting bus",
            transfer.address()
        );
        self.retire_active(Some(Status::Timeout));
        self.hw.shutdown_and_reset();
        self.hw.set_clock(self.config.clock_hz);
        self.start_if_idle(clock);
        true
    }

    /// Unlink the queue head and write the outcome back into it, moving the
    /// phase back to FREE. `status` overrides what the hardware reported.
    fn retire_active(&mut self, status: Option<Status>) {
        let Phase::Active(transfer) = mem::replace(&mut self.phase, Phase::Free)
        else {
            return;
        };
        let status = status.unwrap_or(transfer.status());
        debug_assert!(self.queue.is_front(transfer.request));
        self.queue.pop_front();

        if let Status::Failed(kind) = status {
            debug!(
                "i2c: transfer to {=u8:#x} failed: {:?}",
                transfer.address(),
                kind
            );
        }
        transfer.request.retire(status, transfer.byte_count(), transfer.received());
    }
}
