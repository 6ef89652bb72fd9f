//! MIDI message values and conversion helpers
//!
//! Messages are plain byte sequences owned by whoever produced them. The
//! integer-vector helpers give adaptation logic a view of a message where
//! intermediate arithmetic may leave the byte range; converting back validates
//! every value.

use midly::live::{LiveEvent, SystemCommon};
use thiserror::Error;

/// First byte of a System Exclusive message
pub const SYSEX_START: u8 = 0xF0;

/// Last byte of a System Exclusive message
pub const SYSEX_END: u8 = 0xF7;

/// Errors converting between integer views and MIDI bytes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Value {value} at index {index} does not fit into a MIDI byte")]
    ValueOutOfRange { index: usize, value: i32 },
}

/// Result type for message conversions
pub type MessageResult<T> = Result<T, MessageError>;

/// Errors reported by the outbound transport
#[derive(Debug, Error)]
pub enum SendError {
    #[error("MIDI output '{0}' is not available")]
    OutputUnavailable(String),

    #[error("MIDI output rejected message: {0}")]
    Rejected(String),
}

/// An owned MIDI message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MidiMessage(Vec<u8>);

impl MidiMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check for a complete, terminated System Exclusive message
    pub fn is_sysex(&self) -> bool {
        self.0.last() == Some(&SYSEX_END)
            && matches!(
                LiveEvent::parse(&self.0),
                Ok(LiveEvent::Common(SystemCommon::SysEx(_)))
            )
    }

    /// Payload between the F0 and F7 framing bytes
    ///
    /// Returns an empty slice for anything that is not a SysEx message.
    pub fn sysex_data(&self) -> &[u8] {
        if self.is_sysex() {
            &self.0[1..self.0.len() - 1]
        } else {
            &[]
        }
    }
}

impl From<Vec<u8>> for MidiMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for MidiMessage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Split a byte stream into individual SysEx messages
///
/// Bytes outside of an `F0 .. F7` frame are dropped, as is an unterminated
/// trailing frame.
pub fn split_sysex(data: &[u8]) -> Vec<MidiMessage> {
    let mut messages = Vec::new();
    let mut start = None;

    for (i, &byte) in data.iter().enumerate() {
        match byte {
            SYSEX_START => start = Some(i),
            SYSEX_END => {
                if let Some(begin) = start.take() {
                    messages.push(MidiMessage::from_slice(&data[begin..=i]));
                }
            }
            _ => {}
        }
    }

    messages
}

/// Integer view of a message
pub fn message_to_vector(message: &MidiMessage) -> Vec<i32> {
    message.as_bytes().iter().map(|&b| i32::from(b)).collect()
}

/// Validate an integer view back into bytes
pub fn int_vector_to_byte_vector(data: &[i32]) -> MessageResult<Vec<u8>> {
    data.iter()
        .enumerate()
        .map(|(index, &value)| {
            u8::try_from(value).map_err(|_| MessageError::ValueOutOfRange { index, value })
        })
        .collect()
}

/// Validate an integer view back into a message
pub fn vector_to_message(data: &[i32]) -> MessageResult<MidiMessage> {
    int_vector_to_byte_vector(data).map(MidiMessage::new)
}

/// Outbound MIDI transport
///
/// Implemented by the host's MIDI I/O layer. This crate only ever hands it
/// fully built messages.
pub trait MidiSink {
    fn send_message(&mut self, message: &MidiMessage) -> Result<(), SendError>;
}

/// Collects messages instead of sending them (offline export, tests)
impl MidiSink for Vec<MidiMessage> {
    fn send_message(&mut self, message: &MidiMessage) -> Result<(), SendError> {
        self.push(message.clone());
        Ok(())
    }
}
