//! Device definition contract and optional capabilities
//!
//! A device definition implements [`Synth`] (identity, geometry, ownership of
//! messages) and any subset of the capability traits. Capabilities are queried
//! at runtime: every query returns `None` when the device does not support the
//! capability, which callers must check before using it.
//!
//! Each capability has two query forms, mirroring the two ways hosts hold
//! devices:
//! - `edit_buffer(self: Arc<Self>)` returns a shared handle that can be kept
//!   and moved to other threads
//! - `edit_buffer_ref(&self)` returns a handle borrowing the device

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::midi::{MidiMessage, MidiSink, SendError};
use crate::patch::{default_fingerprint, PatchRecord};
use crate::types::{BankNumber, MidiChannel, ProgramNumber};

/// Transfer of the device's edit buffer (the currently playing sound)
pub trait EditBufferCapability: Send + Sync {
    /// Messages asking the device to send its edit buffer
    fn request_edit_buffer(&self) -> Vec<MidiMessage>;

    /// Whether a received message is an edit buffer dump
    fn is_edit_buffer_dump(&self, message: &MidiMessage) -> bool;

    /// Parse an edit buffer dump
    fn patch_from_sysex(&self, message: &MidiMessage) -> Option<PatchRecord>;

    /// Messages that load the patch into the edit buffer
    fn patch_to_sysex(&self, patch: &PatchRecord) -> Vec<MidiMessage>;
}

/// Transfer of individual stored programs
pub trait ProgramDumpCapability: Send + Sync {
    /// Messages requesting the program stored at `place`
    fn request_patch(&self, place: ProgramNumber) -> Vec<MidiMessage>;

    /// Whether a message is a dump of exactly one program
    fn is_single_program_dump(&self, message: &MidiMessage) -> bool;

    /// Parse a single program dump
    fn patch_from_program_dump_sysex(&self, message: &MidiMessage) -> Option<PatchRecord>;

    /// Messages storing the patch into `place`
    fn patch_to_program_dump_sysex(
        &self,
        patch: &PatchRecord,
        place: ProgramNumber,
    ) -> Vec<MidiMessage>;
}

/// A display name stored inside the patch data
pub trait StoredPatchNameCapability: Send + Sync {
    fn patch_name(&self, patch: &PatchRecord) -> Option<String>;

    /// Write a new name into the patch data; false if the data could not be changed
    fn set_patch_name(&self, patch: &mut PatchRecord, name: &str) -> bool;

    /// Whether the stored name is the device's placeholder for unnamed sounds
    fn is_default_name(&self, patch: &PatchRecord) -> bool;
}

/// A bounded set of tags stored inside the patch data
pub trait StoredTagCapability: Send + Sync {
    fn max_tags(&self) -> usize;

    fn tags(&self, patch: &PatchRecord) -> BTreeSet<String>;

    /// Store the tags; false (and the patch untouched) if they cannot be represented
    fn set_tags(&self, patch: &mut PatchRecord, tags: &BTreeSet<String>) -> bool;
}

/// The device definition contract
pub trait Synth: Send + Sync {
    /// Device name, used as the storage key for all of its patches
    ///
    /// Must never change once patches have been stored under it.
    fn name(&self) -> String;

    /// Durable identity of a patch
    ///
    /// Must be deterministic; once published for a device it must not change,
    /// as it is the primary key of stored patches. `None` means the fingerprint
    /// cannot be computed right now and the patch must not be keyed.
    fn calculate_fingerprint(&self, patch: &PatchRecord) -> Option<String> {
        Some(default_fingerprint(patch))
    }

    fn number_of_banks(&self) -> u32;

    /// Patches per bank
    fn number_of_patches(&self) -> u32;

    fn friendly_bank_name(&self, bank: BankNumber) -> String;

    /// Build a record from raw bytes and a locator
    fn patch_from_patch_data(&self, data: &[u8], place: ProgramNumber) -> PatchRecord {
        PatchRecord::new(self.name(), data.to_vec(), place)
    }

    /// Whether a message from a shared input stream belongs to this device
    fn is_own_sysex(&self, message: &MidiMessage) -> bool;

    /// Deliver a batch of messages
    ///
    /// The default sends everything immediately.
    fn send_block_of_messages_to_synth(
        &self,
        output: &mut dyn MidiSink,
        messages: &[MidiMessage],
    ) -> Result<(), SendError> {
        for message in messages {
            output.send_message(message)?;
        }
        Ok(())
    }

    fn edit_buffer(self: Arc<Self>) -> Option<Arc<dyn EditBufferCapability>> {
        None
    }

    fn edit_buffer_ref(&self) -> Option<Box<dyn EditBufferCapability + '_>> {
        None
    }

    fn program_dump(self: Arc<Self>) -> Option<Arc<dyn ProgramDumpCapability>> {
        None
    }

    fn program_dump_ref(&self) -> Option<Box<dyn ProgramDumpCapability + '_>> {
        None
    }

    fn stored_name(self: Arc<Self>) -> Option<Arc<dyn StoredPatchNameCapability>> {
        None
    }

    fn stored_name_ref(&self) -> Option<Box<dyn StoredPatchNameCapability + '_>> {
        None
    }

    fn stored_tags(self: Arc<Self>) -> Option<Arc<dyn StoredTagCapability>> {
        None
    }

    fn stored_tags_ref(&self) -> Option<Box<dyn StoredTagCapability + '_>> {
        None
    }
}

/// A device that can be found by a probe/response handshake
pub trait DiscoverableDevice: Synth {
    /// Probe messages for one channel
    fn device_detect(&self, channel: MidiChannel) -> Vec<MidiMessage>;

    /// Minimum time the host waits for a response before giving up
    fn device_detect_sleep_ms(&self) -> u64;

    /// The answering channel, if the message is a detection response
    fn channel_if_valid_device_response(&self, message: &MidiMessage) -> Option<MidiChannel>;

    /// True if the probe must be repeated for every channel
    fn needs_channel_specific_detection(&self) -> bool;

    /// Channel the device was last detected on
    fn current_channel(&self) -> Option<MidiChannel>;

    fn set_current_channel(&self, channel: Option<MidiChannel>);
}
