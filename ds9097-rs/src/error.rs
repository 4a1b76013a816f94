#[derive(Debug, thiserror::Error)]
/// Serial transport errors of the passive adapter.
pub enum Ds9097Error {
    /// The serial device could not be opened or reopened.
    #[error("cannot open {path} at {rate} baud: {source}")]
    Open {
        /// Device path.
        path: String,
        /// Requested symbol rate.
        rate: u32,
        /// Underlying error.
        #[source]
        source: serialport::Error,
    },
    /// Configuring an open port failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Reading from or writing to the port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The port delivered fewer bytes than expected before the read timeout.
    #[error("short read: expected {expected} byte(s), got {got}")]
    ShortRead {
        /// Bytes requested.
        expected: usize,
        /// Bytes received.
        got: usize,
    },
    /// The port accepted fewer bytes than written.
    #[error("short write: wrote {written} of {expected} byte(s)")]
    ShortWrite {
        /// Bytes to write.
        expected: usize,
        /// Bytes accepted.
        written: usize,
    },
    /// The port was lost while switching rates.
    #[error("serial port is closed")]
    Closed,
}
