//! A simulated 1-Wire bus populated with temperature sensors.
//!
//! The simulation works at the level of individual time slots: every slot
//! passed to [`touch_bits`](OneWire::touch_bits) is decoded by each device's
//! state machine, and the sampled level is the wired-AND of the master's write
//! and every participating device's output. This is enough to run the search
//! algorithm, device selection and the convert/read-scratchpad sequence of the
//! DS18B20 family against several devices at once.

use crate::{
    OneWire, OneWireCrc, OneWireResult, Rom,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_SEARCH_CMD},
};

const CONVERT_T_CMD: u8 = 0x44;
const READ_SCRATCHPAD_CMD: u8 = 0xbe;

/// Errors injected by the simulated transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The simulated port was configured to fail.
    #[error("simulated port disconnected")]
    Disconnected,
}

/// One simulated device.
#[derive(Debug, Clone)]
pub struct SimDevice {
    rom: Rom,
    scratchpad: [u8; 9],
    detach_on_convert: bool,
}

impl SimDevice {
    /// A DS18B20 reporting `raw` (1/16 degC units) with a correct scratchpad CRC.
    pub fn ds18b20(rom: Rom, raw: i16) -> Self {
        let [lsb, msb] = raw.to_le_bytes();
        let mut scratchpad = [lsb, msb, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0];
        scratchpad[8] = OneWireCrc::compute(&scratchpad[..8]);
        Self {
            rom,
            scratchpad,
            detach_on_convert: false,
        }
    }

    /// Replace the scratchpad contents verbatim, CRC byte included.
    pub fn with_scratchpad(mut self, scratchpad: [u8; 9]) -> Self {
        self.scratchpad = scratchpad;
        self
    }

    /// Make the device leave the bus once it receives a convert command.
    pub fn with_detach_on_convert(mut self, detach: bool) -> Self {
        self.detach_on_convert = detach;
        self
    }

    /// Address of the device.
    pub fn rom(&self) -> Rom {
        self.rom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for a reset pulse.
    Idle,
    /// Collecting the ROM command byte.
    RomCommand { byte: u8, bit: usize },
    /// Receiving the 64 address bits of a Match ROM.
    Match { bit: usize },
    /// Search ROM: `step` 0 sends the id bit, 1 its complement, 2 receives the direction.
    Search { bit: usize, step: u8 },
    /// Collecting the function command byte.
    Function { byte: u8, bit: usize },
    /// Sending the scratchpad, bit by bit.
    ReadScratchpad { bit: usize },
}

/// Simulated bus master and device population.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    devices: Vec<SimDevice>,
    active: Vec<bool>,
    phase: Phase,
    resets: usize,
    search_rounds: usize,
    touched_bits: usize,
    fail_after_resets: Option<usize>,
}

impl SimulatedBus {
    /// Create a bus populated with `devices`.
    pub fn new(devices: Vec<SimDevice>) -> Self {
        let active = vec![false; devices.len()];
        Self {
            devices,
            active,
            phase: Phase::Idle,
            resets: 0,
            search_rounds: 0,
            touched_bits: 0,
            fail_after_resets: None,
        }
    }

    /// Make every reset after the first `resets` fail with [`SimError::Disconnected`].
    pub fn fail_after_resets(mut self, resets: usize) -> Self {
        self.fail_after_resets = Some(resets);
        self
    }

    /// Number of reset pulses issued.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Number of Search ROM commands received.
    pub fn search_rounds(&self) -> usize {
        self.search_rounds
    }

    /// Number of time slots performed after a reset.
    pub fn touched_bits(&self) -> usize {
        self.touched_bits
    }

    /// Devices currently attached to the bus.
    pub fn devices(&self) -> &[SimDevice] {
        &self.devices
    }

    fn participants(&self) -> impl Iterator<Item = &SimDevice> {
        self.devices
            .iter()
            .zip(self.active.iter())
            .filter_map(|(d, &a)| a.then_some(d))
    }

    /// Level driven by the participants: low if any of them pulls it low.
    fn wired_and(&self, f: impl Fn(&SimDevice) -> bool) -> bool {
        self.participants().all(f)
    }

    fn slot(&mut self, master: bool) -> bool {
        self.touched_bits += 1;
        match self.phase {
            Phase::Idle => master,
            Phase::RomCommand { byte, bit } => {
                let byte = byte | ((master as u8) << bit);
                self.phase = if bit < 7 {
                    Phase::RomCommand { byte, bit: bit + 1 }
                } else {
                    match byte {
                        ONEWIRE_MATCH_ROM_CMD => Phase::Match { bit: 0 },
                        ONEWIRE_SEARCH_CMD => {
                            self.search_rounds += 1;
                            Phase::Search { bit: 0, step: 0 }
                        }
                        _ => Phase::Idle,
                    }
                };
                master
            }
            Phase::Match { bit } => {
                for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
                    *active &= device.rom.bit(bit) == master;
                }
                self.phase = if bit + 1 < Rom::BITS {
                    Phase::Match { bit: bit + 1 }
                } else {
                    Phase::Function { byte: 0, bit: 0 }
                };
                master
            }
            Phase::Search { bit, step } => match step {
                0 => {
                    self.phase = Phase::Search { bit, step: 1 };
                    master && self.wired_and(|d| d.rom.bit(bit))
                }
                1 => {
                    self.phase = Phase::Search { bit, step: 2 };
                    master && self.wired_and(|d| !d.rom.bit(bit))
                }
                _ => {
                    for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        *active &= device.rom.bit(bit) == master;
                    }
                    self.phase = if bit + 1 < Rom::BITS {
                        Phase::Search { bit: bit + 1, step: 0 }
                    } else {
                        Phase::Idle
                    };
                    master
                }
            },
            Phase::Function { byte, bit } => {
                let byte = byte | ((master as u8) << bit);
                self.phase = if bit < 7 {
                    Phase::Function { byte, bit: bit + 1 }
                } else {
                    self.function(byte)
                };
                master
            }
            Phase::ReadScratchpad { bit } => {
                self.phase = if bit + 1 < 9 * 8 {
                    Phase::ReadScratchpad { bit: bit + 1 }
                } else {
                    Phase::Idle
                };
                master && self.wired_and(|d| d.scratchpad[bit / 8] & (1 << (bit % 8)) != 0)
            }
        }
    }

    fn function(&mut self, cmd: u8) -> Phase {
        match cmd {
            CONVERT_T_CMD => {
                let mut i = 0;
                while i < self.devices.len() {
                    if self.active[i] && self.devices[i].detach_on_convert {
                        self.devices.remove(i);
                        self.active.remove(i);
                    } else {
                        i += 1;
                    }
                }
                Phase::Idle
            }
            READ_SCRATCHPAD_CMD => Phase::ReadScratchpad { bit: 0 },
            _ => Phase::Idle,
        }
    }
}

impl OneWire for SimulatedBus {
    type Status = bool;
    type BusError = SimError;

    fn reset(&mut self) -> OneWireResult<bool, SimError> {
        if self.fail_after_resets.is_some_and(|n| self.resets >= n) {
            return Err(SimError::Disconnected.into());
        }
        self.resets += 1;
        self.active.iter_mut().for_each(|a| *a = true);
        self.phase = Phase::RomCommand { byte: 0, bit: 0 };
        Ok(!self.devices.is_empty())
    }

    fn touch_bits(&mut self, bits: &mut [bool]) -> OneWireResult<(), SimError> {
        for bit in bits.iter_mut() {
            *bit = self.slot(*bit);
        }
        Ok(())
    }
}
