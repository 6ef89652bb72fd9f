//! In-place edits of outgoing messages
//!
//! Conversions take the stored patch bytes, overwrite a few header bytes
//! (device id, channel, bank and program) and recompute the checksum. Edits go
//! through the integer view of the message and are validated on the way back.

use std::collections::BTreeMap;

use patchbay_core::midi::{int_vector_to_byte_vector, MessageError};
use patchbay_core::{message_to_vector, MidiChannel, MidiMessage, ProgramNumber};
use serde::Deserialize;
use thiserror::Error;

/// Errors rewriting message bytes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("index {index} is outside of a {len} byte message")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("value {value} for index {index} is not a 7-bit data byte")]
    DataOutOfRange { index: usize, value: i64 },

    #[error("bank byte {value:#04x} is below the first bank {base:#04x}")]
    BankOutOfRange { value: u8, base: u8 },

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Checksum algorithms found in synthesizer dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// Two's complement of the 7-bit sum (Roland DT1)
    Roland,
    /// Plain 7-bit sum (Access)
    Sum7,
}

/// Checksum over the half-open byte range `from..to`, stored at `at`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checksum {
    pub kind: ChecksumKind,
    pub from: usize,
    pub to: usize,
    pub at: usize,
}

impl Checksum {
    pub fn compute(&self, message: &[u8]) -> Result<u8, RewriteError> {
        let range = message.get(self.from..self.to).ok_or(RewriteError::IndexOutOfRange {
            index: self.to,
            len: message.len(),
        })?;
        let sum = range.iter().fold(0u32, |acc, &b| acc + u32::from(b));

        Ok(match self.kind {
            ChecksumKind::Roland => ((0x80 - (sum & 0x7F)) & 0x7F) as u8,
            ChecksumKind::Sum7 => (sum & 0x7F) as u8,
        })
    }

    pub fn apply(&self, message: &mut [u8]) -> Result<(), RewriteError> {
        let value = self.compute(message)?;
        let len = message.len();
        let slot = message
            .get_mut(self.at)
            .ok_or(RewriteError::IndexOutOfRange { index: self.at, len })?;
        *slot = value;
        Ok(())
    }
}

/// Where the channel goes in an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelByte {
    pub byte: usize,
    #[serde(default)]
    pub base: u8,
}

/// Fixed edits applied to every outgoing message of a conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rewrite {
    #[serde(default)]
    pub set: BTreeMap<usize, u8>,
    #[serde(default)]
    pub channel: Option<ChannelByte>,
}

/// Where a program dump stores its bank and program
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotLayout {
    pub program_byte: usize,
    #[serde(default)]
    pub bank_byte: Option<usize>,
    #[serde(default)]
    pub bank_base: u8,
}

impl SlotLayout {
    /// Locator encoded in a dump
    pub fn read(&self, message: &[u8]) -> Result<ProgramNumber, RewriteError> {
        let slot = byte_at(message, self.program_byte)?;
        let bank = match self.bank_byte {
            Some(index) => {
                let value = byte_at(message, index)?;
                value
                    .checked_sub(self.bank_base)
                    .ok_or(RewriteError::BankOutOfRange {
                        value,
                        base: self.bank_base,
                    })?
            }
            None => 0,
        };
        Ok(ProgramNumber::new(u32::from(bank), u32::from(slot)))
    }
}

fn byte_at(message: &[u8], index: usize) -> Result<u8, RewriteError> {
    message.get(index).copied().ok_or(RewriteError::IndexOutOfRange {
        index,
        len: message.len(),
    })
}

/// Accumulates edits on the integer view of one message
pub struct MessageWriter {
    values: Vec<i32>,
}

impl MessageWriter {
    pub fn new(message: &MidiMessage) -> Self {
        Self {
            values: message_to_vector(message),
        }
    }

    /// Overwrite one data byte
    pub fn set(&mut self, index: usize, value: i64) -> Result<(), RewriteError> {
        if !(0..=0x7F).contains(&value) {
            return Err(RewriteError::DataOutOfRange { index, value });
        }
        let len = self.values.len();
        // Never touch the framing bytes
        if index == 0 || index + 1 >= len {
            return Err(RewriteError::IndexOutOfRange { index, len });
        }
        self.values[index] = value as i32;
        Ok(())
    }

    pub fn apply_rewrite(
        &mut self,
        rewrite: &Rewrite,
        channel: MidiChannel,
    ) -> Result<(), RewriteError> {
        for (&index, &value) in &rewrite.set {
            self.set(index, i64::from(value))?;
        }
        if let Some(target) = &rewrite.channel {
            self.set(
                target.byte,
                i64::from(target.base) | i64::from(channel.zero_based()),
            )?;
        }
        Ok(())
    }

    pub fn apply_slot(&mut self, layout: &SlotLayout, place: ProgramNumber) -> Result<(), RewriteError> {
        self.set(layout.program_byte, i64::from(place.slot))?;
        if let Some(index) = layout.bank_byte {
            self.set(index, i64::from(layout.bank_base) + i64::from(place.bank))?;
        }
        Ok(())
    }

    /// Validate and finish, recomputing the checksum if one is given
    pub fn finish(self, checksum: Option<&Checksum>) -> Result<MidiMessage, RewriteError> {
        let mut bytes = int_vector_to_byte_vector(&self.values)?;
        if let Some(checksum) = checksum {
            checksum.apply(&mut bytes)?;
        }
        Ok(MidiMessage::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roland_checksum() {
        let checksum = Checksum {
            kind: ChecksumKind::Roland,
            from: 1,
            to: 4,
            at: 4,
        };
        assert_eq!(checksum.compute(&[0xF0, 0x00, 0x00, 0x00, 0x00, 0xF7]).unwrap(), 0x00);
        assert_eq!(checksum.compute(&[0xF0, 0x40, 0x00, 0x7F, 0x00, 0xF7]).unwrap(), 0x41);
    }

    #[test]
    fn test_sum7_checksum_apply() {
        let checksum = Checksum {
            kind: ChecksumKind::Sum7,
            from: 1,
            to: 3,
            at: 3,
        };
        let mut message = vec![0xF0, 0x7F, 0x02, 0x00, 0xF7];
        checksum.apply(&mut message).unwrap();
        assert_eq!(message[3], 0x01);
    }

    #[test]
    fn test_checksum_out_of_range() {
        let checksum = Checksum {
            kind: ChecksumKind::Sum7,
            from: 1,
            to: 10,
            at: 10,
        };
        assert!(checksum.compute(&[0xF0, 0x01, 0xF7]).is_err());
    }

    #[test]
    fn test_writer_rewrite_and_slot() {
        let message = MidiMessage::new(vec![0xF0, 0x42, 0x30, 0x58, 0x00, 0x00, 0xF7]);
        let rewrite = Rewrite {
            set: BTreeMap::from([(1, 0x42)]),
            channel: Some(ChannelByte { byte: 2, base: 0x30 }),
        };
        let layout = SlotLayout {
            program_byte: 5,
            bank_byte: Some(4),
            bank_base: 1,
        };

        let mut writer = MessageWriter::new(&message);
        writer
            .apply_rewrite(&rewrite, MidiChannel::from_zero_based(9).unwrap())
            .unwrap();
        writer.apply_slot(&layout, ProgramNumber::new(2, 17)).unwrap();
        let out = writer.finish(None).unwrap();

        assert_eq!(out.as_bytes(), &[0xF0, 0x42, 0x39, 0x58, 0x03, 0x11, 0xF7]);
        assert_eq!(layout.read(out.as_bytes()).unwrap(), ProgramNumber::new(2, 17));
    }

    #[test]
    fn test_bank_below_base_is_rejected() {
        let layout = SlotLayout {
            program_byte: 3,
            bank_byte: Some(2),
            bank_base: 1,
        };

        assert_eq!(
            layout.read(&[0xF0, 0x10, 0x00, 0x40, 0xF7]),
            Err(RewriteError::BankOutOfRange { value: 0, base: 1 })
        );
        assert_eq!(
            layout.read(&[0xF0, 0x10, 0x01, 0x40, 0xF7]).unwrap(),
            ProgramNumber::new(0, 0x40)
        );
    }

    #[test]
    fn test_writer_rejects_framing_and_wide_values() {
        let message = MidiMessage::new(vec![0xF0, 0x00, 0xF7]);
        let mut writer = MessageWriter::new(&message);

        assert!(writer.set(0, 1).is_err());
        assert!(writer.set(2, 1).is_err());
        assert_eq!(
            writer.set(1, 0x80),
            Err(RewriteError::DataOutOfRange { index: 1, value: 0x80 })
        );
        assert!(writer.set(1, 0x7F).is_ok());
    }
}
