use crate::{OneWire, OneWireError, OneWireStatus, Rom, consts::ONEWIRE_SEARCH_CMD};
use core::fmt::Debug;

/// Cross-round state of one search, threaded from one round to the next.
///
/// Bit positions are 1-based; a discrepancy of `0` means none was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Position of the last discrepancy where the 0 branch was taken.
    pub last_discrepancy: usize,
    /// Set once the last round recorded no unexplored branch.
    pub last_device_found: bool,
    /// The path walked in the previous round; replayed up to `last_discrepancy`.
    pub last_address: Rom,
}

/// Result of a single search round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// A ROM with a valid CRC was assembled.
    Found(Rom),
    /// A ROM was assembled but failed CRC-8; the branch is skipped.
    Corrupt(Rom),
    /// Both the id bit and its complement read 1: nobody is participating.
    NoResponse,
}

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    state: SearchState,
    rounds: usize,
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    pub fn new(onewire: &'a mut T) -> Self {
        Self {
            onewire,
            state: SearchState::default(),
            rounds: 0,
        }
    }

    /// Number of search rounds issued on the bus so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Current cross-round state.
    pub fn state(&self) -> &SearchState {
        &self.state
    }
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for the next device on the 1-Wire bus.
    /// This method implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html) to discover devices connected to the bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    ///
    /// Rounds that assemble an address with an invalid CRC-8 are skipped and the
    /// search continues with the next branch.
    ///
    /// # Errors
    /// * [`OneWireError::NoDevicePresent`] if a reset receives no presence pulse.
    /// * [`OneWireError::ShortCircuit`] if the reset found the bus shorted.
    /// * [`OneWireError::Other`] on a transport failure. The search state is left
    ///   untouched, so the same round is repeated by the next call.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Rom>, OneWireError<T::BusError>> {
        while !self.state.last_device_found {
            match self.round()? {
                Round::Found(rom) => {
                    log::debug!("search round {} found {rom}", self.rounds);
                    return Ok(Some(rom));
                }
                Round::Corrupt(rom) => {
                    log::warn!("discarding ROM {rom} with invalid CRC-8");
                }
                Round::NoResponse => {
                    log::warn!("no device answered search round {}", self.rounds);
                    self.state.last_device_found = true;
                }
            }
        }
        Ok(None)
    }

    fn round(&mut self) -> Result<Round, OneWireError<T::BusError>> {
        let status = self.onewire.reset()?;
        if !status.presence() {
            return Err(if status.shortcircuit() {
                OneWireError::ShortCircuit
            } else {
                OneWireError::NoDevicePresent
            });
        }
        self.rounds += 1;
        self.onewire.write_byte(ONEWIRE_SEARCH_CMD)?;

        let mut rom = Rom::default();
        let mut last_zero = 0;
        for id_bit_number in 1..=Rom::BITS {
            // two read slots: the id bit and its complement, wired-AND of all participants
            let mut pair = [true, true];
            self.onewire.touch_bits(&mut pair)?;
            let direction = match pair {
                [true, true] => return Ok(Round::NoResponse),
                [id_bit, complement_bit] if id_bit != complement_bit => id_bit,
                _ => {
                    let dir = if id_bit_number < self.state.last_discrepancy {
                        self.state.last_address.bit(id_bit_number - 1)
                    } else {
                        id_bit_number == self.state.last_discrepancy
                    };
                    if !dir {
                        last_zero = id_bit_number;
                    }
                    dir
                }
            };
            // deselects every device whose bit differs from the chosen direction
            self.onewire.write_bit(direction)?;
            rom.write_bit(id_bit_number - 1, direction);
        }

        self.state.last_discrepancy = last_zero;
        self.state.last_device_found = last_zero == 0;
        self.state.last_address = rom;
        Ok(if rom.is_valid() {
            Round::Found(rom)
        } else {
            Round::Corrupt(rom)
        })
    }
}

impl<T: OneWire> OneWireSearch<'_, T>
where
    T::BusError: Debug,
{
    /// Runs the search to completion and returns every address found, in
    /// discovery order.
    ///
    /// An error before the first address was accepted is returned as is. An
    /// error after that ends the search early: the addresses accepted so far are
    /// returned and the error is logged.
    pub fn discover(mut self) -> Result<Vec<Rom>, OneWireError<T::BusError>> {
        let mut found = Vec::new();
        loop {
            match self.next() {
                Ok(Some(rom)) => found.push(rom),
                Ok(None) => break,
                Err(e) if found.is_empty() => return Err(e),
                Err(e) => {
                    log::warn!(
                        "search aborted after {} device(s) in round {}: {e:?}",
                        found.len(),
                        self.rounds
                    );
                    break;
                }
            }
        }
        log::debug!("search finished: {} device(s) in {} round(s)", found.len(), self.rounds);
        Ok(found)
    }
}

/// Enumerates every device on the bus.
///
/// Shorthand for `OneWireSearch::new(bus).discover()`.
pub fn discover<T: OneWire>(bus: &mut T) -> Result<Vec<Rom>, OneWireError<T::BusError>>
where
    T::BusError: Debug,
{
    OneWireSearch::new(bus).discover()
}
