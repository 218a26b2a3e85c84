#![cfg_attr(not(test), no_std)]
//! Non-blocking transaction manager for a shared I2C bus.
//!
//! Callers own [`Request`] blocks and submit them to an [`I2cManager`], which
//! queues them in FIFO order and drives exactly one transfer at a time through
//! a [`Hardware`] implementation. The hardware-event context (usually the bus
//! interrupt) calls [`I2cManager::on_hardware_event`] to advance and retire
//! transfers, and the foreground loop calls [`I2cManager::tick`] once per
//! cycle so that a wedged bus is reset after the configured timeout.

// This must go first so the macros are visible to the other modules.
mod fmt;

mod config;
mod error;
mod hardware;
mod manager;
mod queue;
mod request;

pub use config::{
    Config, EventDelivery, FAST_MODE_HZ, FAST_MODE_PLUS_HZ, STANDARD_MODE_HZ,
};
pub use error::Error;
#[cfg(feature = "time-driver")]
pub use hardware::SystemClock;
pub use hardware::{Clock, Hardware, Transfer};
pub use manager::{I2cManager, SharedI2cManager};
pub use request::{Operation, Request, Status, MAX_TRANSFER_LEN};

pub use embassy_time::{Duration, Instant};
pub use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, SevenBitAddress};
