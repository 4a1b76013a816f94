use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use fixed::types::I12F4;
use onewire_core::{OneWire, OneWireCrc, OneWireError, OneWireResult, OneWireStatus, Rom};

/// Temperature in degrees Celsius, in the sensor's native 1/16 degC resolution.
pub type Temperature = I12F4;

/// Family code of the DS18B20.
pub const DS18B20_FAMILY: u8 = 0x28;

/// Worst-case conversion time at 12-bit resolution.
pub const CONVERSION_TIME_MS: u32 = 750;

/// Default pause between two sensors of a roster pass.
pub const DEFAULT_PACING_MS: u32 = 500;

const DS18B20_START_CONV: u8 = 0x44;
const DS18B20_READ_SCRATCH: u8 = 0xbe;

/// Decodes the little-endian temperature register (bytes 0 and 1 of the scratchpad).
pub fn decode_temperature(raw: [u8; 2]) -> Temperature {
    I12F4::from_le_bytes(raw)
}

pub fn celsius_to_fahrenheit(temp: Temperature) -> f32 {
    temp.to_num::<f32>() * 9.0 / 5.0 + 32.0
}

/// The nine bytes returned by Read Scratchpad.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0-1  | Temperature register, signed 16 bit little endian, 1/16 degC |
/// | 2-3  | Alarm thresholds T_H and T_L |
/// | 4    | Configuration register |
/// | 5-7  | Reserved |
/// | 8    | CRC-8 of bytes 0-7 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad(pub [u8; 9]);

impl Scratchpad {
    /// Reads nine bytes from a device that was just sent Read Scratchpad.
    pub fn read<O: OneWire>(bus: &mut O) -> OneWireResult<Self, O::BusError> {
        let mut buf = [0; 9];
        bus.read_bytes(&mut buf)?;
        Ok(Self(buf))
    }

    pub fn is_valid(&self) -> bool {
        OneWireCrc::validate(&self.0)
    }

    /// The raw temperature register.
    pub fn raw(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// Decodes the temperature after checking the CRC.
    ///
    /// # Errors
    /// [`OneWireError::InvalidCrc`] if the CRC-8 over all nine bytes is not zero.
    pub fn temperature<E>(&self) -> OneWireResult<Temperature, E> {
        if !self.is_valid() {
            return Err(OneWireError::InvalidCrc);
        }
        Ok(decode_temperature([self.0[0], self.0[1]]))
    }
}

/// A single DS18B20 on a shared bus, addressed by ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18b20 {
    rom: Rom,
}

impl From<Rom> for Ds18b20 {
    fn from(rom: Rom) -> Self {
        Self::new(rom)
    }
}

impl Ds18b20 {
    pub fn new(rom: Rom) -> Self {
        Self { rom }
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    /// Runs a full conversion and reads the result.
    ///
    /// The device is addressed twice: once to start the conversion and, after
    /// waiting out the conversion time, again to read the scratchpad.
    ///
    /// # Errors
    /// * [`OneWireError::NoDevicePresent`] if nothing answers the first reset.
    /// * [`OneWireError::DeviceLost`] if nothing answers the reset after the conversion.
    /// * [`OneWireError::InvalidCrc`] if the scratchpad fails CRC-8.
    /// * [`OneWireError::Other`] on a transport failure.
    pub fn read_temperature<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> OneWireResult<Temperature, O::BusError> {
        bus.reset_select(&self.rom)?;
        bus.write_byte(DS18B20_START_CONV)?; // start temperature conversion
        delay.delay_ms(CONVERSION_TIME_MS); // wait till conversion is finished

        if !bus.reset()?.presence() {
            return Err(OneWireError::DeviceLost);
        }
        bus.select(&self.rom)?;
        bus.write_byte(DS18B20_READ_SCRATCH)?;
        let scratchpad = Scratchpad::read(bus)?;
        log::debug!("{}: scratchpad {:02x?}", self.rom, scratchpad.0);
        scratchpad.temperature()
    }
}

/// Outcome of reading one sensor of a roster.
#[derive(Debug)]
pub struct Reading<E> {
    /// Position of the sensor in the roster.
    pub index: usize,
    /// Address of the sensor.
    pub rom: Rom,
    /// The temperature, or why it could not be read.
    pub result: OneWireResult<Temperature, E>,
}

/// An ordered roster of sensors on one bus.
#[derive(Debug, Clone)]
pub struct Ds18b20Group {
    sensors: Vec<Ds18b20>,
    pacing_ms: u32,
}

impl Default for Ds18b20Group {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Ds18b20Group {
    pub fn new(roms: impl IntoIterator<Item = Rom>) -> Self {
        Self {
            sensors: roms.into_iter().map(Ds18b20::new).collect(),
            pacing_ms: DEFAULT_PACING_MS,
        }
    }

    /// Set the pause between two consecutive sensors.
    pub fn with_pacing_ms(mut self, ms: u32) -> Self {
        self.pacing_ms = ms;
        self
    }

    pub fn sensors(&self) -> &[Ds18b20] {
        &self.sensors
    }

    pub fn get(&self, index: usize) -> Option<&Ds18b20> {
        self.sensors.get(index)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Reads every sensor in roster order, handing each outcome to `on_reading`.
    ///
    /// A sensor that is missing, lost or returns a corrupt scratchpad is
    /// reported and skipped. A transport error ends the pass immediately and is
    /// returned; sensors already read have been reported by then.
    ///
    /// Returns the number of sensors read successfully.
    pub fn read_all<O, D, F>(
        &self,
        bus: &mut O,
        delay: &mut D,
        mut on_reading: F,
    ) -> OneWireResult<usize, O::BusError>
    where
        O: OneWire,
        O::BusError: Debug,
        D: DelayNs,
        F: FnMut(Reading<O::BusError>),
    {
        let mut ok = 0;
        for (index, sensor) in self.sensors.iter().enumerate() {
            if index > 0 {
                delay.delay_ms(self.pacing_ms);
            }
            let result = sensor.read_temperature(bus, delay);
            match &result {
                Err(e) if e.is_transport() => {
                    log::error!("sensor {index} ({}): {e:?}, aborting", sensor.rom);
                    return result.map(|_| ok);
                }
                Err(e) => log::warn!("sensor {index} ({}): {e:?}", sensor.rom),
                Ok(_) => ok += 1,
            }
            on_reading(Reading {
                index,
                rom: sensor.rom,
                result,
            });
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use onewire_core::sim::{SimDevice, SimulatedBus};
    use rand::Rng;

    /// Accumulates requested delays.
    #[derive(Default)]
    struct TotalDelay {
        ns: u64,
    }

    impl DelayNs for TotalDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += ns as u64;
        }
    }

    fn probe(n: u8) -> Rom {
        Rom::with_serial(DS18B20_FAMILY, [0xff, 0x64, 0x1e, 0x0f, 0x00, n])
    }

    fn scratchpad(raw: u16) -> Scratchpad {
        let [lsb, msb] = raw.to_le_bytes();
        let mut buf = [lsb, msb, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0];
        buf[8] = OneWireCrc::compute(&buf[..8]);
        Scratchpad(buf)
    }

    #[test]
    fn test_temp_conv() {
        assert_eq!(decode_temperature(0x0191u16.to_le_bytes()).to_num::<f32>(), 25.0625);
        assert_eq!(decode_temperature(0xff5eu16.to_le_bytes()).to_num::<f32>(), -10.125);
        assert_eq!(decode_temperature(0x07d0u16.to_le_bytes()).to_num::<f32>(), 125.0);
        assert_eq!(decode_temperature(0xfc90u16.to_le_bytes()).to_num::<f32>(), -55.0);
        assert_eq!(decode_temperature(0x0550u16.to_le_bytes()).to_num::<f32>(), 85.0);
        assert_eq!(decode_temperature(0xfff8u16.to_le_bytes()).to_num::<f32>(), -0.5);
        assert_eq!(decode_temperature(0x0000u16.to_le_bytes()), Temperature::ZERO);
    }

    #[test]
    fn fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(Temperature::from_num(100)), 212.0);
        assert_eq!(celsius_to_fahrenheit(Temperature::from_num(-40)), -40.0);
    }

    #[test]
    fn scratchpad_decoding() {
        let pad = scratchpad(0xff5e);
        assert!(pad.is_valid());
        assert_eq!(pad.raw(), -162);
        assert_eq!(
            pad.temperature::<()>().unwrap(),
            Temperature::from_num(-10.125)
        );
    }

    #[test]
    fn any_corrupted_byte_is_rejected() {
        let mut rng = rand::rng();
        let pad = scratchpad(0x0191);
        for i in 0..9 {
            let mut bad = pad;
            bad.0[i] ^= rng.random_range(1..=255u8);
            assert!(!bad.is_valid(), "byte {i}");
            assert!(matches!(
                bad.temperature::<()>(),
                Err(OneWireError::InvalidCrc)
            ));
        }
    }

    #[test]
    fn reads_addressed_sensor() {
        let (a, b) = (probe(1), probe(2));
        let mut bus = SimulatedBus::new(vec![
            SimDevice::ds18b20(a, 0x0191),
            SimDevice::ds18b20(b, 0xfc90u16 as i16),
        ]);
        let mut delay = TotalDelay::default();
        let t = Ds18b20::new(b).read_temperature(&mut bus, &mut delay).unwrap();
        assert_eq!(t, Temperature::from_num(-55));
        assert_eq!(bus.resets(), 2);
        assert!(delay.ns >= CONVERSION_TIME_MS as u64 * 1_000_000);
    }

    #[test]
    fn empty_bus_reports_no_presence() {
        let mut bus = SimulatedBus::new(vec![]);
        let res = Ds18b20::new(probe(1)).read_temperature(&mut bus, &mut NoopDelay::new());
        assert!(matches!(res, Err(OneWireError::NoDevicePresent)));
        assert_eq!(bus.resets(), 1);
    }

    #[test]
    fn device_vanishing_during_conversion_is_lost() {
        let a = probe(1);
        let mut bus = SimulatedBus::new(vec![
            SimDevice::ds18b20(a, 0x0191).with_detach_on_convert(true),
        ]);
        let res = Ds18b20::new(a).read_temperature(&mut bus, &mut NoopDelay::new());
        assert!(matches!(res, Err(OneWireError::DeviceLost)));
        assert!(bus.devices().is_empty());
    }

    #[test]
    fn corrupted_scratchpad_is_an_integrity_error() {
        let a = probe(1);
        let mut pad = scratchpad(0x0191).0;
        pad[8] ^= 0x40;
        let mut bus = SimulatedBus::new(vec![SimDevice::ds18b20(a, 0).with_scratchpad(pad)]);
        let res = Ds18b20::new(a).read_temperature(&mut bus, &mut NoopDelay::new());
        assert!(matches!(res, Err(OneWireError::InvalidCrc)));
    }

    #[test]
    fn absent_sensor_reads_as_corrupt() {
        // other devices answer the reset, nobody answers the read slots
        let mut bus = SimulatedBus::new(vec![SimDevice::ds18b20(probe(1), 0x0191)]);
        let res = Ds18b20::new(probe(9)).read_temperature(&mut bus, &mut NoopDelay::new());
        assert!(matches!(res, Err(OneWireError::InvalidCrc)));
    }

    #[test]
    fn roster_pass_isolates_sensor_failures() {
        let (a, b, c) = (probe(1), probe(2), probe(3));
        let mut bad = scratchpad(0x0191).0;
        bad[0] ^= 0x01;
        let mut bus = SimulatedBus::new(vec![
            SimDevice::ds18b20(a, 0x0191),
            SimDevice::ds18b20(c, 0x07d0).with_scratchpad(bad),
        ]);
        let group = Ds18b20Group::new([a, b, c]).with_pacing_ms(500);
        let mut delay = TotalDelay::default();
        let mut readings = Vec::new();
        let ok = group
            .read_all(&mut bus, &mut delay, |r| readings.push(r))
            .unwrap();

        assert_eq!(ok, 1);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].rom, a);
        assert_eq!(
            readings[0].result.as_ref().ok(),
            Some(&Temperature::from_num(25.0625))
        );
        assert!(matches!(readings[1].result, Err(OneWireError::InvalidCrc)));
        assert_eq!(readings[2].index, 2);
        assert!(matches!(readings[2].result, Err(OneWireError::InvalidCrc)));
        // three conversions plus two pauses
        assert_eq!(delay.ns, (3 * 750 + 2 * 500) * 1_000_000);
    }

    #[test]
    fn roster_pass_aborts_on_transport_error() {
        let (a, b) = (probe(1), probe(2));
        let mut bus = SimulatedBus::new(vec![
            SimDevice::ds18b20(a, 0x0191),
            SimDevice::ds18b20(b, 0x0191),
        ])
        .fail_after_resets(2);
        let group = Ds18b20Group::new([a, b]);
        let mut seen = 0;
        let res = group.read_all(&mut bus, &mut NoopDelay::new(), |_| seen += 1);
        assert!(matches!(res, Err(OneWireError::Other(_))));
        assert_eq!(seen, 1);
    }

    #[test]
    fn group_accessors() {
        let group = Ds18b20Group::new([probe(1), probe(2)]);
        assert_eq!(group.len(), 2);
        assert_eq!(group.get(1).map(|s| *s.rom()), Some(probe(2)));
        assert!(group.get(2).is_none());
        assert!(Ds18b20Group::default().is_empty());
    }
}
