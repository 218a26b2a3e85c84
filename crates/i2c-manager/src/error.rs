/// Errors returned when configuring or submitting a [`Request`](crate::Request).
///
/// These only cover caller misuse. The outcome of a bus transaction is
/// reported through the request's [`Status`](crate::Status) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The request is still queued or in flight.
    Pending,
    /// A buffer of `len` bytes does not fit in a request (limit `max`).
    BufferTooLong { len: usize, max: usize },
    /// The bus still has `n` queued requests and cannot be shut down.
    InUse(usize),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Pending => write!(f, "request is still pending"),
            Error::BufferTooLong { len, max } => {
                write!(f, "buffer of {} bytes exceeds limit of {}", len, max)
            }
            Error::InUse(n) => write!(f, "bus has {} queued requests", n),
        }
    }
}
