use crate::{DATA_BAUD, Ds9097Error, SerialLink};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};

/// Default bound on how long a read waits for the adapter's echo.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for creating a [`SerialPortLink`] with custom configuration.
#[derive(Debug, Clone)]
pub struct SerialPortLinkBuilder {
    rate: u32,
    timeout: Duration,
    reopen_on_switch: bool,
}

impl Default for SerialPortLinkBuilder {
    fn default() -> Self {
        Self {
            rate: DATA_BAUD,
            timeout: DEFAULT_READ_TIMEOUT,
            reopen_on_switch: true,
        }
    }
}

impl SerialPortLinkBuilder {
    /// Sets the initial symbol rate.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Selects how the symbol rate is changed.
    ///
    /// With `true` (the default) the port is closed and opened again at the
    /// new rate, which works with every USB serial driver. With `false` the
    /// rate is changed in place on the open port.
    pub fn with_reopen_on_switch(mut self, reopen: bool) -> Self {
        self.reopen_on_switch = reopen;
        self
    }

    /// Opens the serial device at `path`.
    pub fn open(self, path: &str) -> Result<SerialPortLink, Ds9097Error> {
        let port = open_port(path, self.rate, self.timeout)?;
        log::debug!("opened {path} at {} baud", self.rate);
        Ok(SerialPortLink {
            path: path.to_owned(),
            rate: self.rate,
            timeout: self.timeout,
            reopen_on_switch: self.reopen_on_switch,
            port: Some(port),
        })
    }
}

/// A [`SerialLink`] backed by an exclusive [`serialport`] connection.
pub struct SerialPortLink {
    path: String,
    rate: u32,
    timeout: Duration,
    reopen_on_switch: bool,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    /// Opens `path` at `rate` baud, 8-N-1, with the default read timeout.
    pub fn open(path: &str, rate: u32) -> Result<Self, Ds9097Error> {
        SerialPortLinkBuilder::default().with_rate(rate).open(path)
    }

    /// Returns a builder for a link with non-default settings.
    pub fn builder() -> SerialPortLinkBuilder {
        SerialPortLinkBuilder::default()
    }

    /// Path of the serial device.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The open port, reopened at the current rate if an earlier rate switch
    /// lost it.
    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, Ds9097Error> {
        if self.port.is_none() {
            log::debug!("reopening {} at {} baud", self.path, self.rate);
            self.port = Some(open_port(&self.path, self.rate, self.timeout)?);
        }
        self.port.as_mut().ok_or(Ds9097Error::Closed)
    }
}

fn open_port(path: &str, rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>, Ds9097Error> {
    serialport::new(path, rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|source| Ds9097Error::Open {
            path: path.to_owned(),
            rate,
            source,
        })
}

/// Writes `bytes` with a single call; anything short of all of them is an error.
fn send<P: Write + ?Sized>(port: &mut P, bytes: &[u8]) -> Result<(), Ds9097Error> {
    let written = loop {
        match port.write(bytes) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => break 0,
            Err(e) => return Err(e.into()),
        }
    };
    if written < bytes.len() {
        return Err(Ds9097Error::ShortWrite {
            expected: bytes.len(),
            written,
        });
    }
    Ok(())
}

/// Accumulates partial reads until `buf` is full or the port times out.
fn fill<P: Read + ?Sized>(port: &mut P, buf: &mut [u8]) -> Result<(), Ds9097Error> {
    let mut got = 0;
    while got < buf.len() {
        match port.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) => return Err(e.into()),
        }
    }
    if got < buf.len() {
        return Err(Ds9097Error::ShortRead {
            expected: buf.len(),
            got,
        });
    }
    Ok(())
}

impl SerialLink for SerialPortLink {
    fn rate(&self) -> u32 {
        self.rate
    }

    fn switch_rate(&mut self, rate: u32) -> Result<(), Ds9097Error> {
        if rate == self.rate && self.port.is_some() {
            return Ok(());
        }
        if self.reopen_on_switch {
            // the port is opened exclusively, so it has to be closed first
            drop(self.port.take());
            self.port = Some(open_port(&self.path, rate, self.timeout)?);
        } else {
            self.port()?.set_baud_rate(rate)?;
        }
        log::trace!("{}: {} -> {} baud", self.path, self.rate, rate);
        self.rate = rate;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Ds9097Error> {
        send(self.port()?, bytes)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Ds9097Error> {
        fill(self.port()?, buf)
    }

    fn flush(&mut self) -> Result<(), Ds9097Error> {
        self.port()?.clear(ClearBuffer::All)?;
        Ok(())
    }
}
