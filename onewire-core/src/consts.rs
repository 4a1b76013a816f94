//! Command constants for 1-Wire communication.

/// Command to match a specific ROM address in 1-Wire communication.
///
/// The master follows this command with the 64-bit ROM sequence, least
/// significant byte first. Only the device that exactly matches the sequence
/// responds to the subsequent function command; all others wait for the
/// next reset pulse.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;
