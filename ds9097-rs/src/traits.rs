use crate::Ds9097Error;

/// Byte-level access to the serial port the adapter is plugged into.
///
/// Reset and data slots need different bit timings on the same wire, so the
/// link must be able to change its symbol rate between transactions. Whether
/// that takes a close/reopen cycle or can be done in place is up to the
/// implementation.
pub trait SerialLink {
    /// The symbol rate the link is currently configured for.
    fn rate(&self) -> u32;

    /// Reconfigure the link for `rate` baud, keeping 8-N-1 framing and the
    /// read timeout.
    fn switch_rate(&mut self, rate: u32) -> Result<(), Ds9097Error>;

    /// Write all of `bytes`. A partial write is an error and is not retried.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Ds9097Error>;

    /// Fill `buf` completely, accumulating partial reads until the read
    /// timeout expires.
    ///
    /// # Errors
    /// [`Ds9097Error::ShortRead`] if the timeout expires first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Ds9097Error>;

    /// Discard any bytes buffered in either direction.
    fn flush(&mut self) -> Result<(), Ds9097Error>;
}
