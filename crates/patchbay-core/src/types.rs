//! Small value types shared by all device definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of MIDI channels
pub const MIDI_CHANNELS: u8 = 16;

/// A MIDI channel (0-15 internally, displayed 1-16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MidiChannel(u8);

impl MidiChannel {
    /// Create a channel from a zero-based number, `None` if out of range
    pub fn from_zero_based(channel: u8) -> Option<Self> {
        (channel < MIDI_CHANNELS).then_some(Self(channel))
    }

    /// Create a channel from the 1-16 numbering printed on hardware
    pub fn from_one_based(channel: u8) -> Option<Self> {
        channel.checked_sub(1).and_then(Self::from_zero_based)
    }

    pub fn zero_based(self) -> u8 {
        self.0
    }

    pub fn one_based(self) -> u8 {
        self.0 + 1
    }

    /// Iterate over all 16 channels
    pub fn all() -> impl Iterator<Item = MidiChannel> {
        (0..MIDI_CHANNELS).map(MidiChannel)
    }
}

impl Default for MidiChannel {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.one_based())
    }
}

/// Zero-based bank index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BankNumber(pub u32);

impl BankNumber {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Location of a patch: bank index plus slot within the bank
///
/// Both values are zero-based.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ProgramNumber {
    pub bank: u32,
    pub slot: u32,
}

impl ProgramNumber {
    pub fn new(bank: u32, slot: u32) -> Self {
        Self { bank, slot }
    }

    /// Split an absolute program number using the device's bank size
    ///
    /// A bank size of zero is treated as one single unbounded bank.
    pub fn from_absolute(program: u32, patches_per_bank: u32) -> Self {
        if patches_per_bank == 0 {
            return Self::new(0, program);
        }
        Self::new(program / patches_per_bank, program % patches_per_bank)
    }

    /// Absolute program number using the device's bank size
    pub fn absolute(self, patches_per_bank: u32) -> u32 {
        self.bank * patches_per_bank + self.slot
    }

    pub fn bank_number(self) -> BankNumber {
        BankNumber(self.bank)
    }
}

impl fmt::Display for ProgramNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bank, self.slot)
    }
}
