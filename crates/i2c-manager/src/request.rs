use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embassy_sync::waitqueue::AtomicWaker;
use embedded_hal::i2c::{ErrorKind, SevenBitAddress};
use heapless::Vec;

use crate::error::Error;
use crate::hardware::{Clock, Hardware};
use crate::manager::I2cManager;

/// Largest write or read a single request can carry, matching the size of
/// the peripheral's DMA buffer.
pub const MAX_TRANSFER_LEN: usize = 32;

/// Kind of bus transaction a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    /// Write bytes copied into the request.
    Write,
    /// Write bytes straight from a `'static` read-only buffer (e.g. flash).
    WriteFromReadOnly,
    /// Read bytes.
    Read,
    /// Write bytes, then read with a repeated start.
    ReadAfterWrite,
}

impl Operation {
    /// `true` for operations with a read phase.
    pub fn is_read(self) -> bool {
        matches!(self, Operation::Read | Operation::ReadAfterWrite)
    }
}

/// Outcome of the most recent submission of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Queued or in flight.
    Pending,
    Ok,
    /// Gave up after the manager's timeout; the bus was reset.
    Timeout,
    /// Error reported by the hardware layer.
    Failed(ErrorKind),
}

impl Status {
    /// `true` while queued or in flight.
    pub fn is_pending(self) -> bool {
        self == Status::Pending
    }

    /// `Ok(())` for [`Status::Ok`], the status itself otherwise.
    pub fn into_result(self) -> Result<(), Status> {
        match self {
            Status::Ok => Ok(()),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum WriteSource {
    Inline,
    ReadOnly(&'static [u8]),
}

pub(crate) struct Slot<'a> {
    pub(crate) address: SevenBitAddress,
    pub(crate) operation: Operation,
    pub(crate) source: WriteSource,
    pub(crate) write: Vec<u8, MAX_TRANSFER_LEN>,
    pub(crate) read_len: usize,
    pub(crate) read: Vec<u8, MAX_TRANSFER_LEN>,
    pub(crate) status: Status,
    pub(crate) count: usize,
    pub(crate) next: Option<&'a Request<'a>>,
}

impl Slot<'_> {
    pub(crate) fn write_bytes(&self) -> &[u8] {
        match self.source {
            WriteSource::Inline => &self.write,
            WriteSource::ReadOnly(bytes) => bytes,
        }
    }
}

/// A caller-owned descriptor of one bus transaction.
///
/// The manager only ever holds `&'a Request<'a>` references to it, so the
/// request must outlive the manager's borrow; a `static` works well. While
/// the request is [`Status::Pending`] it cannot be reconfigured or submitted
/// again; those calls return [`Error::Pending`].
pub struct Request<'a> {
    slot: CriticalSectionMutex<RefCell<Slot<'a>>>,
    waker: AtomicWaker,
}

impl<'a> Request<'a> {
    /// An idle request, reporting [`Status::Ok`] until first submitted.
    pub const fn new() -> Self {
        Self {
            slot: CriticalSectionMutex::new(RefCell::new(Slot {
                address: 0,
                operation: Operation::Write,
                source: WriteSource::Inline,
                write: Vec::new(),
                read_len: 0,
                read: Vec::new(),
                status: Status::Ok,
                count: 0,
                next: None,
            })),
            waker: AtomicWaker::new(),
        }
    }

    /// Configure a write of `data` to `address`. The bytes are copied.
    pub fn set_write_params(
        &self,
        address: SevenBitAddress,
        data: &[u8],
    ) -> Result<(), Error> {
        check_len(data.len())?;
        self.configure(|slot| {
            slot.address = address;
            slot.operation = Operation::Write;
            slot.source = WriteSource::Inline;
            slot.write.clear();
            // Length checked above.
            let _ = slot.write.extend_from_slice(data);
            slot.read_len = 0;
        })
    }

    /// Configure a write from a read-only `'static` buffer without copying.
    /// There is no length limit on this variant.
    pub fn set_write_params_static(
        &self,
        address: SevenBitAddress,
        data: &'static [u8],
    ) -> Result<(), Error> {
        self.configure(|slot| {
            slot.address = address;
            slot.operation = Operation::WriteFromReadOnly;
            slot.source = WriteSource::ReadOnly(data);
            slot.write.clear();
            slot.read_len = 0;
        })
    }

    /// Configure a read of `read_len` bytes, preceded by a write of `write`
    /// if it is not empty.
    pub fn set_read_params(
        &self,
        address: SevenBitAddress,
        read_len: usize,
        write: &[u8],
    ) -> Result<(), Error> {
        check_len(read_len)?;
        check_len(write.len())?;
        self.configure(|slot| {
            slot.address = address;
            slot.operation = if write.is_empty() {
                Operation::Read
            } else {
                Operation::ReadAfterWrite
            };
            slot.source = WriteSource::Inline;
            slot.write.clear();
            let _ = slot.write.extend_from_slice(write);
            slot.read_len = read_len;
            slot.read.clear();
        })
    }

    fn configure(&self, f: impl FnOnce(&mut Slot<'a>)) -> Result<(), Error> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.status.is_pending() {
                return Err(Error::Pending);
            }
            f(&mut slot);
            Ok(())
        })
    }

    /// Outcome of the latest submission.
    pub fn status(&self) -> Status {
        self.slot.lock(|slot| slot.borrow().status)
    }

    /// `true` while the request is queued or in flight.
    pub fn is_busy(&self) -> bool {
        self.status().is_pending()
    }

    /// Bytes moved by the last completed submission: received bytes for
    /// reads, sent bytes for writes.
    pub fn bytes_transferred(&self) -> usize {
        self.slot.lock(|slot| slot.borrow().count)
    }

    /// Target address last configured.
    pub fn address(&self) -> SevenBitAddress {
        self.slot.lock(|slot| slot.borrow().address)
    }

    /// Operation last configured.
    pub fn operation(&self) -> Operation {
        self.slot.lock(|slot| slot.borrow().operation)
    }

    /// Copy the bytes received by the last read into `out`, returning how
    /// many were copied.
    pub fn read_into(&self, out: &mut [u8]) -> Result<usize, Error> {
        self.slot.lock(|slot| {
            let slot = slot.borrow();
            if slot.status.is_pending() {
                return Err(Error::Pending);
            }
            let n = out.len().min(slot.read.len());
            out[..n].copy_from_slice(&slot.read[..n]);
            Ok(n)
        })
    }

    /// Spin on `manager.tick()` until the request leaves `Pending`.
    ///
    /// No other foreground work runs meanwhile. With timeouts disabled this
    /// only returns once the hardware reports a terminal status.
    pub fn wait<M, H, C>(&self, manager: &I2cManager<'_, M, H, C>) -> Status
    where
        M: RawMutex,
        H: Hardware,
        C: Clock,
    {
        loop {
            let status = self.status();
            if !status.is_pending() {
                return status;
            }
            manager.tick();
        }
    }

    /// Resolves once the request leaves `Pending`.
    ///
    /// Something else must keep driving the manager (the bus interrupt, and
    /// a task calling [`I2cManager::tick`] if timeouts are wanted).
    pub async fn completion(&self) -> Status {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            match self.status() {
                Status::Pending => Poll::Pending,
                status => Poll::Ready(status),
            }
        })
        .await
    }

    /// Marks the request pending for a fresh submission. Fails if it
    /// already is, which keeps a request from being queued twice.
    pub(crate) fn arm(&self) -> Result<(), Error> {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.status.is_pending() {
                return Err(Error::Pending);
            }
            slot.status = Status::Pending;
            slot.count = 0;
            slot.next = None;
            Ok(())
        })
    }

    /// Writes back the terminal outcome. Called exactly once per submission.
    pub(crate) fn retire(&self, status: Status, count: usize, received: &[u8]) {
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            slot.read.clear();
            let _ = slot.read.extend_from_slice(received);
            slot.count = count;
            slot.status = status;
        });
        self.waker.wake();
    }

    pub(crate) fn with_slot<R>(&self, f: impl FnOnce(&Slot<'a>) -> R) -> R {
        self.slot.lock(|slot| f(&slot.borrow()))
    }

    pub(crate) fn next(&self) -> Option<&'a Request<'a>> {
        self.slot.lock(|slot| slot.borrow().next)
    }

    pub(crate) fn set_next(&self, next: Option<&'a Request<'a>>) {
        self.slot.lock(|slot| slot.borrow_mut().next = next);
    }
}

impl Default for Request<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(len: usize) -> Result<(), Error> {
    if len > MAX_TRANSFER_LEN {
        Err(Error::BufferTooLong { len, max: MAX_TRANSFER_LEN })
    } else {
        Ok(())
    }
}
