//! Patchbay Core - device-independent building blocks of the patch librarian
//!
//! This crate provides:
//! - The canonical patch record every device adaptation produces and consumes
//! - Capability interfaces a device definition may or may not implement
//! - MIDI message helpers (SysEx splitting, integer-vector views)
//! - Decoders for legacy pre-SysEx bank dump files
//! - YAML configuration loading and default paths
//!
//! # Architecture
//!
//! ```text
//! adaptation (patchbay-adapt) ──▶ Synth + capabilities ──▶ PatchRecord ──▶ host
//!                                                              ▲
//! legacy bank file ──▶ legacy::load_legacy_bank ───────────────┘
//! ```

pub mod capability;
pub mod config;
pub mod legacy;
pub mod midi;
pub mod patch;
pub mod types;

pub use capability::{
    DiscoverableDevice, EditBufferCapability, ProgramDumpCapability, StoredPatchNameCapability,
    StoredTagCapability, Synth,
};
pub use midi::{
    int_vector_to_byte_vector, message_to_vector, split_sysex, vector_to_message, MessageError,
    MessageResult, MidiMessage, MidiSink, SendError,
};
pub use patch::{default_fingerprint, sha256_hex, PatchRecord};
pub use types::{BankNumber, MidiChannel, ProgramNumber};
