//! The `digitemp.conf` roster file.
//!
//! ```text
//! TTY /dev/ttyUSB0
//! READ_TIME 1000
//! SENSORS 2
//! ROM 0 0x28 0xFF 0x64 0x1E 0x0F 0x00 0x00 0x34
//! ROM 1 0x28 0xFF 0x64 0x1E 0x0F 0x00 0x01 0x03
//! ```
//!
//! Unknown keys (such as the log format settings written by the C digitemp)
//! are ignored, as are blank lines and `#` comments.

use onewire_core::Rom;
use std::{
    fmt::{self, Display, Formatter},
    fs, io,
    path::Path,
    str::FromStr,
};

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_READ_TIME_MS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serial device and sensor roster of one bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: String,
    pub read_time_ms: u32,
    pub sensors: Vec<Rom>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_owned(),
            read_time_ms: DEFAULT_READ_TIME_MS,
            sensors: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the roster at `path`, or the defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => text.parse(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

fn parse_byte(field: &str) -> Option<u8> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u8::from_str_radix(digits, 16).ok()
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut config = Config::default();
        let mut declared = None;
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |reason: &str| ConfigError::Parse {
                line: idx + 1,
                reason: reason.to_owned(),
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields[0] {
                "TTY" => {
                    config.device = fields.get(1).ok_or_else(|| err("missing device path"))?.to_string();
                }
                "READ_TIME" => {
                    config.read_time_ms = fields
                        .get(1)
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(|| err("invalid read time"))?;
                }
                "SENSORS" => {
                    declared = Some(
                        fields
                            .get(1)
                            .and_then(|v| v.parse::<usize>().ok())
                            .ok_or_else(|| err("invalid sensor count"))?,
                    );
                }
                "ROM" => {
                    if fields.len() != 10 {
                        return Err(err("expected an index and 8 address bytes"));
                    }
                    let mut raw = [0u8; Rom::BYTES];
                    for (b, field) in raw.iter_mut().zip(&fields[2..]) {
                        *b = parse_byte(field).ok_or_else(|| err("invalid address byte"))?;
                    }
                    config.sensors.push(Rom::new(raw));
                }
                key => log::debug!("ignoring {key} on line {}", idx + 1),
            }
        }
        if let Some(n) = declared.filter(|&n| n != config.sensors.len()) {
            log::warn!("roster declares {n} sensor(s) but lists {}", config.sensors.len());
        }
        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "TTY {}", self.device)?;
        writeln!(f, "READ_TIME {}", self.read_time_ms)?;
        writeln!(f, "SENSORS {}", self.sensors.len())?;
        for (i, rom) in self.sensors.iter().enumerate() {
            write!(f, "ROM {i}")?;
            for b in rom.iter() {
                write!(f, " 0x{b:02X}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
