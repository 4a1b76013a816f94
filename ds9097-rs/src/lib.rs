#![deny(missing_docs)]

/*! # DS9097
 *
 * Drives a 1-Wire bus through a passive serial adapter (DS9097 and clones),
 * where the UART's own start and data bits form the 1-Wire time slots.
 *
 * A reset pulse is one `0xf0` byte at 9600 baud: the low start bit plus four
 * low data bits are long enough to reset every device, and a presence pulse
 * pulls some of the high bits low in the echo. At 115200 baud a byte lasts
 * ~87 µs, one 1-Wire slot: `0xff` is a write-one/read slot whose echo has its
 * least significant bit cleared if a device held the line low, `0x00` is a
 * write-zero slot.
 */

pub use onewire_core::{OneWire, OneWireError, OneWireResult};
mod error;
mod link;
mod onewire;
mod traits;

pub use error::Ds9097Error;
pub use link::{DEFAULT_READ_TIMEOUT, SerialPortLink, SerialPortLinkBuilder};
pub use onewire::ResetStatus;
pub use traits::SerialLink;

/// Symbol rate of the reset phase.
pub const RESET_BAUD: u32 = 9600;
/// Symbol rate of the data phase.
pub const DATA_BAUD: u32 = 115_200;
/// Byte transmitted at [`RESET_BAUD`] to generate the reset pulse.
pub const RESET_PULSE: u8 = 0xf0;
/// Time slots sent per write/read cycle, the depth of a 16550 UART FIFO.
pub const UART_FIFO_SIZE: usize = 16;

/// A DS9097 passive serial to 1-Wire adapter.
///
/// Takes ownership of a serial link (implementing [`SerialLink`])
/// and a timer object implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
pub struct Ds9097<L, D> {
    pub(crate) link: L,
    pub(crate) delay: D,
    pub(crate) reset_settle_ms: u32,
    pub(crate) chunk_settle_us: u32,
}

impl<L, D> Ds9097<L, D> {
    /// Creates a new instance of `Ds9097` on the given serial link.
    pub fn new(link: L, delay: D) -> Self {
        Ds9097 {
            link,
            delay,
            reset_settle_ms: 5,
            chunk_settle_us: 1000,
        }
    }

    /// Set how long to wait for the presence pulse echo after a reset.
    pub fn with_reset_settle_ms(mut self, ms: u32) -> Self {
        self.reset_settle_ms = ms;
        self
    }

    /// Set the pause between writing a chunk of time slots and reading the
    /// echo back.
    pub fn with_chunk_settle_us(mut self, us: u32) -> Self {
        self.chunk_settle_us = us;
        self
    }

    /// The underlying serial link.
    pub fn link(&self) -> &L {
        &self.link
    }
}

impl<D> Ds9097<SerialPortLink, D> {
    /// Opens the serial device at `path` at the data-phase rate.
    pub fn open(path: &str, delay: D) -> Result<Self, Ds9097Error> {
        Ok(Self::new(SerialPortLink::open(path, DATA_BAUD)?, delay))
    }
}
