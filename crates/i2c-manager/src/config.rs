use embassy_time::Duration;

/// Standard mode bus clock (100 kHz).
pub const STANDARD_MODE_HZ: u32 = 100_000;
/// Fast mode bus clock (400 kHz).
pub const FAST_MODE_HZ: u32 = 400_000;
/// Fast mode plus bus clock (1 MHz).
pub const FAST_MODE_PLUS_HZ: u32 = 1_000_000;

/// How hardware events reach the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventDelivery {
    /// The bus interrupt calls [`I2cManager::on_hardware_event`](crate::I2cManager::on_hardware_event).
    Interrupt,
    /// No interrupt is wired up; every [`tick`](crate::I2cManager::tick)
    /// services the peripheral before checking for a timeout.
    Polled,
}

/// Manager configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bus clock applied by [`I2cManager::initialize`](crate::I2cManager::initialize).
    pub clock_hz: u32,
    /// Longest a transfer may stay in flight. Zero disables the check.
    pub timeout: Duration,
    pub event_delivery: EventDelivery,
}

impl Config {
    /// Standard mode, no timeout, interrupt-driven events.
    pub const fn new() -> Self {
        Self {
            clock_hz: STANDARD_MODE_HZ,
            timeout: Duration::from_ticks(0),
            event_delivery: EventDelivery::Interrupt,
        }
    }

    /// Set the bus clock in Hz.
    pub const fn with_clock(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    /// Set the transfer timeout; zero disables it.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Select how hardware events are delivered.
    pub const fn with_event_delivery(mut self, delivery: EventDelivery) -> Self {
        self.event_delivery = delivery;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
