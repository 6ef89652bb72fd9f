//! Canonical patch record
//!
//! Every adaptation, and the legacy bank decoders, normalize device data into
//! a [`PatchRecord`]: the raw device bytes, where the patch lives, and which
//! device definition produced it. Identity for storage is not the record
//! itself but the device's fingerprint of it (see [`crate::Synth`]).

use serde::{Deserialize, Serialize};

use crate::midi::{split_sysex, MidiMessage};
use crate::types::ProgramNumber;

/// Raw patch bytes plus locator and device tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    /// Device definition name (durable storage key of the device)
    device: String,
    /// Device-specific patch bytes, usually one or more SysEx messages
    data: Vec<u8>,
    /// Bank and slot the patch was read from
    place: ProgramNumber,
    /// Display name recovered outside of the patch data (legacy imports)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Name of the second part of a layered patch (the tone of a patch/tone pair)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    part_name: Option<String>,
}

impl PatchRecord {
    pub fn new(device: impl Into<String>, data: Vec<u8>, place: ProgramNumber) -> Self {
        Self {
            device: device.into(),
            data,
            place,
            name: None,
            part_name: None,
        }
    }

    /// Attach a display name carried alongside the data
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_part_name(mut self, name: impl Into<String>) -> Self {
        self.part_name = Some(name.into());
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the patch bytes (renaming, retagging)
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn place(&self) -> ProgramNumber {
        self.place
    }

    pub fn set_place(&mut self, place: ProgramNumber) {
        self.place = place;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn part_name(&self) -> Option<&str> {
        self.part_name.as_deref()
    }

    /// The patch data split into its SysEx messages
    pub fn messages(&self) -> Vec<MidiMessage> {
        split_sysex(&self.data)
    }
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Fingerprint over the complete raw patch bytes
///
/// Used for every device that does not define its own normalization. Such
/// fingerprints are name-sensitive: renaming a patch creates a new identity.
pub fn default_fingerprint(patch: &PatchRecord) -> String {
    sha256_hex(patch.data())
}
