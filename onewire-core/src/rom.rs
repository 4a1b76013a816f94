use crate::OneWireCrc;
use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};

/// A 64-bit 1-Wire device address (ROM code).
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6  | Serial number, least significant byte first |
/// | 7    | CRC-8 of bytes 0-6 |
///
/// Bit `n` of the ROM (as seen by the search algorithm) is bit `n % 8` of byte `n / 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Rom([u8; Rom::BYTES]);

impl Rom {
    /// The length of a ROM code in bytes
    pub const BYTES: usize = 8;

    /// The length of a ROM code in bits
    pub const BITS: usize = Self::BYTES * 8;

    /// Create a ROM code from its raw bytes, family code first.
    pub const fn new(raw: [u8; Self::BYTES]) -> Self {
        Self(raw)
    }

    /// Build a ROM code from a family code and a 48-bit serial, appending the CRC byte.
    pub fn with_serial(family: u8, serial: [u8; 6]) -> Self {
        let mut raw = [0u8; Self::BYTES];
        raw[0] = family;
        raw[1..7].copy_from_slice(&serial);
        raw[7] = OneWireCrc::compute(&raw[..7]);
        Self(raw)
    }

    /// Raw bytes of the ROM code.
    pub const fn bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }

    /// Family code identifying the device type.
    pub fn family_code(&self) -> u8 {
        self.0[0]
    }

    /// Stored CRC-8 byte.
    pub fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Whether the CRC-8 over all eight bytes is zero.
    pub fn is_valid(&self) -> bool {
        OneWireCrc::validate(&self.0)
    }

    /// Value of bit `n` (0-based, transmission order).
    pub fn bit(&self, n: usize) -> bool {
        self.0[n / 8] & (1 << (n % 8)) != 0
    }

    pub(crate) fn write_bit(&mut self, n: usize, value: bool) {
        let mask = 1 << (n % 8);
        if value {
            self.0[n / 8] |= mask;
        } else {
            self.0[n / 8] &= !mask;
        }
    }
}

impl From<[u8; Rom::BYTES]> for Rom {
    fn from(raw: [u8; Rom::BYTES]) -> Self {
        Self(raw)
    }
}

impl From<Rom> for [u8; Rom::BYTES] {
    fn from(rom: Rom) -> Self {
        rom.0
    }
}

impl From<u64> for Rom {
    fn from(value: u64) -> Self {
        Self(value.to_le_bytes())
    }
}

impl From<Rom> for u64 {
    fn from(rom: Rom) -> Self {
        u64::from_le_bytes(rom.0)
    }
}

impl Deref for Rom {
    type Target = [u8; Rom::BYTES];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Rom {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Error returned when parsing a [`Rom`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RomParseError {
    /// Fewer than 16 hexadecimal digits.
    #[error("expected 8 hexadecimal bytes")]
    NotEnough,
    /// Non-hexadecimal character, or trailing digits.
    #[error("invalid hexadecimal digit")]
    Invalid,
}

impl FromStr for Rom {
    type Err = RomParseError;

    /// Parses 16 hex digits, optionally separated by whitespace or `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES];
        let mut digits = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .map(|c| c.to_digit(16));

        for byte in raw.iter_mut() {
            match (digits.next(), digits.next()) {
                (Some(Some(h)), Some(Some(l))) => *byte = ((h << 4) | l) as u8,
                (Some(None), _) | (_, Some(None)) => return Err(RomParseError::Invalid),
                _ => return Err(RomParseError::NotEnough),
            }
        }
        if digits.next().is_some() {
            return Err(RomParseError::Invalid);
        }
        Ok(Self(raw))
    }
}

impl Display for Rom {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
