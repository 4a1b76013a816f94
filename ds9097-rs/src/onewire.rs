use crate::{
    DATA_BAUD, Ds9097, Ds9097Error, RESET_BAUD, RESET_PULSE, SerialLink, UART_FIFO_SIZE,
};
use embedded_hal::delay::DelayNs;
use onewire_core::{OneWire, OneWireResult, OneWireStatus};

/// Echo byte of a reset pulse.
///
/// With nothing on the bus the adapter's loopback returns the pulse
/// unchanged. A presence pulse pulls some of its high bits low; a bus stuck low
/// returns all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStatus(pub u8);

impl ResetStatus {
    /// The raw echo byte.
    pub fn echo(&self) -> u8 {
        self.0
    }
}

impl OneWireStatus for ResetStatus {
    fn presence(&self) -> bool {
        self.0 != RESET_PULSE && self.0 != 0x00
    }

    fn shortcircuit(&self) -> bool {
        self.0 == 0x00
    }
}

impl<L: SerialLink, D: DelayNs> OneWire for Ds9097<L, D> {
    type Status = ResetStatus;

    type BusError = Ds9097Error;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.link.flush()?; // stale echo bytes would fake a presence pulse
        self.link.switch_rate(RESET_BAUD)?;
        self.link.write(&[RESET_PULSE])?;
        self.delay.delay_ms(self.reset_settle_ms);
        let mut echo = [0u8; 1];
        let read = self.link.read_exact(&mut echo);
        self.link.switch_rate(DATA_BAUD)?;
        read?;

        let status = ResetStatus(echo[0]);
        log::trace!("reset echo {:#04x}", status.echo());
        if status.shortcircuit() {
            log::warn!("1-Wire bus is held low");
        }
        Ok(status)
    }

    fn touch_bits(&mut self, bits: &mut [bool]) -> OneWireResult<(), Self::BusError> {
        if self.link.rate() != DATA_BAUD {
            self.link.switch_rate(DATA_BAUD)?;
        }
        let mut buf = [0u8; UART_FIFO_SIZE];
        for chunk in bits.chunks_mut(UART_FIFO_SIZE) {
            let slots = &mut buf[..chunk.len()];
            for (slot, &bit) in slots.iter_mut().zip(chunk.iter()) {
                *slot = if bit { 0xff } else { 0x00 };
            }
            self.link.write(slots)?;
            self.delay.delay_us(self.chunk_settle_us);
            self.link.read_exact(slots)?;
            for (bit, &echo) in chunk.iter_mut().zip(slots.iter()) {
                *bit = echo & 0x01 == 0x01;
            }
            log::trace!("touched {} slot(s)", chunk.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ResetStatus;
    use crate::{DATA_BAUD, Ds9097, Ds9097Error, RESET_BAUD, SerialLink, UART_FIFO_SIZE};
    use embedded_hal::delay::DelayNs;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use onewire_core::{
        OneWire, OneWireError, OneWireStatus, Rom, discover,
        sim::{SimDevice, SimulatedBus},
    };
    use std::collections::VecDeque;

    /// Echoes writes back, optionally pulling selected slots low.
    #[derive(Default)]
    struct ScriptedLink {
        rate: u32,
        switches: Vec<u32>,
        writes: Vec<(u32, Vec<u8>)>,
        pending: VecDeque<u8>,
        /// Reply to the next reset pulse; `None` simulates a read timeout.
        reset_reply: Option<u8>,
        /// Slots (by global index) a device pulls low.
        pulled_low: Vec<usize>,
        slots: usize,
        flushes: usize,
    }

    impl SerialLink for ScriptedLink {
        fn rate(&self) -> u32 {
            self.rate
        }

        fn switch_rate(&mut self, rate: u32) -> Result<(), Ds9097Error> {
            self.switches.push(rate);
            self.rate = rate;
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), Ds9097Error> {
            self.writes.push((self.rate, bytes.to_vec()));
            if self.rate == RESET_BAUD {
                self.pending.extend(self.reset_reply);
            } else {
                for &b in bytes {
                    let low = self.pulled_low.contains(&self.slots);
                    self.pending.push_back(if low { b & 0xfe } else { b });
                    self.slots += 1;
                }
            }
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Ds9097Error> {
            if self.pending.len() < buf.len() {
                return Err(Ds9097Error::ShortRead {
                    expected: buf.len(),
                    got: self.pending.len(),
                });
            }
            for b in buf.iter_mut() {
                *b = self.pending.pop_front().unwrap_or_default();
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Ds9097Error> {
            self.flushes += 1;
            self.pending.clear();
            Ok(())
        }
    }

    fn adapter(link: ScriptedLink) -> Ds9097<ScriptedLink, NoopDelay> {
        Ds9097::new(
            ScriptedLink {
                rate: DATA_BAUD,
                ..link
            },
            NoopDelay::new(),
        )
    }

    #[test]
    fn reset_status_interpretation() {
        assert!(ResetStatus(0xe0).presence());
        assert!(ResetStatus(0x10).presence());
        assert!(!ResetStatus(0xf0).presence());
        assert!(!ResetStatus(0x00).presence());
        assert!(ResetStatus(0x00).shortcircuit());
        assert!(!ResetStatus(0xe0).shortcircuit());
    }

    #[test]
    fn reset_switches_rate_around_pulse() {
        let mut dev = adapter(ScriptedLink {
            reset_reply: Some(0xe0),
            ..Default::default()
        });
        assert!(dev.reset().unwrap().presence());
        let link = dev.link();
        assert_eq!(link.flushes, 1);
        assert_eq!(link.switches, [RESET_BAUD, DATA_BAUD]);
        assert_eq!(link.writes, [(RESET_BAUD, vec![0xf0])]);
        assert_eq!(link.rate(), DATA_BAUD);
    }

    #[test]
    fn reset_without_presence() {
        let mut dev = adapter(ScriptedLink {
            reset_reply: Some(0xf0),
            ..Default::default()
        });
        assert!(!dev.reset().unwrap().presence());
    }

    #[test]
    fn reset_timeout_is_transport_error() {
        let mut dev = adapter(ScriptedLink::default());
        let err = dev.reset().unwrap_err();
        assert!(matches!(
            err,
            OneWireError::Other(Ds9097Error::ShortRead {
                expected: 1,
                got: 0
            })
        ));
        // back at the data rate even though the read failed
        assert_eq!(dev.link().rate(), DATA_BAUD);
    }

    #[test]
    fn touch_bits_encodes_slots_in_fifo_chunks() {
        let mut dev = adapter(ScriptedLink {
            pulled_low: vec![1, 17],
            ..Default::default()
        });
        let mut bits = [true; 20];
        bits[3] = false;
        dev.touch_bits(&mut bits).unwrap();

        let writes = &dev.link().writes;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1.len(), UART_FIFO_SIZE);
        assert_eq!(writes[1].1.len(), 4);
        assert!(writes.iter().all(|(rate, _)| *rate == DATA_BAUD));
        assert_eq!(writes[0].1[3], 0x00);
        assert_eq!(writes[0].1[0], 0xff);

        let low: Vec<usize> = (0..20).filter(|&i| !bits[i]).collect();
        assert_eq!(low, [1, 3, 17]);
    }

    #[test]
    fn bytes_round_trip_through_loopback() {
        let mut dev = adapter(ScriptedLink::default());
        dev.write_byte(0xa5).unwrap();
        assert_eq!(
            dev.link().writes[0].1,
            [0xff, 0x00, 0xff, 0x00, 0x00, 0xff, 0x00, 0xff]
        );
        // nobody pulls the line: a read slot sees a released bus
        assert_eq!(dev.read_byte().unwrap(), 0xff);
    }

    #[test]
    fn read_byte_assembles_lsb_first() {
        // 0x28 = 0b0010_1000: slots 0-2, 4, 6, 7 pulled low
        let mut dev = adapter(ScriptedLink {
            pulled_low: vec![0, 1, 2, 4, 6, 7],
            ..Default::default()
        });
        assert_eq!(dev.read_byte().unwrap(), 0x28);
    }

    /// Records every requested delay, in nanoseconds.
    #[derive(Default)]
    struct RecordingDelay(Vec<u64>);

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.push(ns as u64);
        }
    }

    #[test]
    fn settle_delays_are_configurable() {
        let link = ScriptedLink {
            rate: DATA_BAUD,
            reset_reply: Some(0xe0),
            ..Default::default()
        };
        let mut dev = Ds9097::new(link, RecordingDelay::default())
            .with_reset_settle_ms(2)
            .with_chunk_settle_us(250);
        dev.reset().unwrap();
        dev.touch_bits(&mut [true; 20]).unwrap();
        // one wait after the reset pulse, one per chunk of slots
        assert_eq!(dev.delay.0, [2_000_000, 250_000, 250_000]);
    }

    #[test]
    fn default_settle_delays() {
        let link = ScriptedLink {
            rate: DATA_BAUD,
            reset_reply: Some(0xe0),
            ..Default::default()
        };
        let mut dev = Ds9097::new(link, RecordingDelay::default());
        dev.reset().unwrap();
        dev.write_byte(0x44).unwrap();
        assert_eq!(dev.delay.0, [5_000_000, 1_000_000]);
    }

    /// Adapter loopback in front of a simulated device population.
    struct SimLink {
        bus: SimulatedBus,
        rate: u32,
        pending: VecDeque<u8>,
    }

    impl SerialLink for SimLink {
        fn rate(&self) -> u32 {
            self.rate
        }

        fn switch_rate(&mut self, rate: u32) -> Result<(), Ds9097Error> {
            self.rate = rate;
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), Ds9097Error> {
            if self.rate == RESET_BAUD {
                let presence = self.bus.reset().map_err(|_| Ds9097Error::Closed)?;
                self.pending.push_back(if presence { 0xe0 } else { 0xf0 });
                return Ok(());
            }
            for &b in bytes {
                let mut bit = [b == 0xff];
                self.bus
                    .touch_bits(&mut bit)
                    .map_err(|_| Ds9097Error::Closed)?;
                self.pending.push_back(match (b, bit[0]) {
                    (0xff, true) => 0xff,
                    (0xff, false) => 0xfc,
                    _ => 0x00,
                });
            }
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Ds9097Error> {
            let expected = buf.len();
            for (got, b) in buf.iter_mut().enumerate() {
                *b = self
                    .pending
                    .pop_front()
                    .ok_or(Ds9097Error::ShortRead { expected, got })?;
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Ds9097Error> {
            self.pending.clear();
            Ok(())
        }
    }

    #[test]
    fn discovers_devices_through_adapter() {
        let roms = [
            Rom::with_serial(0x28, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Rom::with_serial(0x28, [0x81, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Rom::with_serial(0x10, [0x01, 0x02, 0x03, 0x04, 0x05, 0x07]),
        ];
        let bus = SimulatedBus::new(roms.iter().map(|&r| SimDevice::ds18b20(r, 0)).collect());
        let link = SimLink {
            bus,
            rate: DATA_BAUD,
            pending: VecDeque::new(),
        };
        let mut dev = Ds9097::new(link, NoopDelay::new());
        let mut found = discover(&mut dev).unwrap();
        found.sort();
        let mut expected = roms.to_vec();
        expected.sort();
        assert_eq!(found, expected);
        assert_eq!(dev.link().bus.search_rounds(), 3);
    }
}
