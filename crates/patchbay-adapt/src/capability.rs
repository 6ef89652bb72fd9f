//! Capability adapters for generic adaptations
//!
//! Each adapter wraps a handle to its [`GenericAdaptation`] and forwards every
//! capability method as one runtime call. The handle is either an
//! `Arc<GenericAdaptation>` (shared form, from `edit_buffer()` and friends) or
//! a plain reference (borrowed form, from `edit_buffer_ref()`). Adapters are
//! created on demand and never stored in the adaptation, so the two never own
//! each other.

use std::collections::BTreeSet;
use std::ops::Deref;

use patchbay_core::capability::{
    EditBufferCapability, ProgramDumpCapability, StoredPatchNameCapability, StoredTagCapability,
    Synth,
};
use patchbay_core::{MidiMessage, PatchRecord, ProgramNumber};

use crate::adaptation::GenericAdaptation;
use crate::module::EntryPoint;

/// Edit buffer transfer through the module's `edit_buffer` section
pub struct GenericEditBuffer<A> {
    me: A,
}

impl<A: Deref<Target = GenericAdaptation>> GenericEditBuffer<A> {
    pub fn new(me: A) -> Self {
        Self { me }
    }
}

impl<A> EditBufferCapability for GenericEditBuffer<A>
where
    A: Deref<Target = GenericAdaptation> + Send + Sync,
{
    fn request_edit_buffer(&self) -> Vec<MidiMessage> {
        let channel = self.me.channel_or_default();
        self.me
            .call_or(EntryPoint::CreateEditBufferRequest, Vec::new(), |m| {
                m.create_edit_buffer_request(channel)
            })
    }

    fn is_edit_buffer_dump(&self, message: &MidiMessage) -> bool {
        self.me
            .call_required(EntryPoint::IsEditBufferDump, |m| m.is_edit_buffer_dump(message))
    }

    fn patch_from_sysex(&self, message: &MidiMessage) -> Option<PatchRecord> {
        if !self.is_edit_buffer_dump(message) {
            return None;
        }
        Some(
            self.me
                .patch_from_patch_data(message.as_bytes(), ProgramNumber::default()),
        )
    }

    fn patch_to_sysex(&self, patch: &PatchRecord) -> Vec<MidiMessage> {
        let channel = self.me.channel_or_default();
        self.me.call_required(EntryPoint::ConvertToEditBuffer, |m| {
            m.convert_to_edit_buffer(channel, patch.data())
        })
    }
}

/// Program dump transfer through the module's `program_dump` section
pub struct GenericProgramDump<A> {
    me: A,
}

impl<A: Deref<Target = GenericAdaptation>> GenericProgramDump<A> {
    pub fn new(me: A) -> Self {
        Self { me }
    }
}

impl<A> ProgramDumpCapability for GenericProgramDump<A>
where
    A: Deref<Target = GenericAdaptation> + Send + Sync,
{
    fn request_patch(&self, place: ProgramNumber) -> Vec<MidiMessage> {
        let channel = self.me.channel_or_default();
        self.me
            .call_or(EntryPoint::CreateProgramDumpRequest, Vec::new(), |m| {
                m.create_program_dump_request(channel, place)
            })
    }

    fn is_single_program_dump(&self, message: &MidiMessage) -> bool {
        self.me.call_required(EntryPoint::IsSingleProgramDump, |m| {
            m.is_single_program_dump(message)
        })
    }

    fn patch_from_program_dump_sysex(&self, message: &MidiMessage) -> Option<PatchRecord> {
        if !self.is_single_program_dump(message) {
            return None;
        }
        let place = self
            .me
            .call_or(EntryPoint::NumberFromDump, ProgramNumber::default(), |m| {
                m.number_from_dump(message)
            });
        Some(self.me.patch_from_patch_data(message.as_bytes(), place))
    }

    fn patch_to_program_dump_sysex(
        &self,
        patch: &PatchRecord,
        place: ProgramNumber,
    ) -> Vec<MidiMessage> {
        let channel = self.me.channel_or_default();
        self.me.call_required(EntryPoint::ConvertToProgramDump, |m| {
            m.convert_to_program_dump(channel, patch.data(), place)
        })
    }
}

/// Name field access through the module's `patch_name` section
pub struct GenericStoredName<A> {
    me: A,
}

impl<A: Deref<Target = GenericAdaptation>> GenericStoredName<A> {
    pub fn new(me: A) -> Self {
        Self { me }
    }
}

impl<A> StoredPatchNameCapability for GenericStoredName<A>
where
    A: Deref<Target = GenericAdaptation> + Send + Sync,
{
    fn patch_name(&self, patch: &PatchRecord) -> Option<String> {
        self.me
            .call_logged(EntryPoint::NameFromDump, |m| m.name_from_dump(patch.data()))
    }

    fn set_patch_name(&self, patch: &mut PatchRecord, name: &str) -> bool {
        let renamed = self
            .me
            .call_logged(EntryPoint::RenamePatch, |m| m.rename_patch(patch.data(), name));

        match renamed {
            Some(data) => {
                patch.set_data(data);
                true
            }
            None => false,
        }
    }

    fn is_default_name(&self, patch: &PatchRecord) -> bool {
        self.me
            .call_required(EntryPoint::IsDefaultName, |m| m.is_default_name(patch.data()))
    }
}

/// Category tags through the module's `tags` section
pub struct GenericStoredTags<A> {
    me: A,
}

impl<A: Deref<Target = GenericAdaptation>> GenericStoredTags<A> {
    pub fn new(me: A) -> Self {
        Self { me }
    }
}

impl<A> StoredTagCapability for GenericStoredTags<A>
where
    A: Deref<Target = GenericAdaptation> + Send + Sync,
{
    fn max_tags(&self) -> usize {
        self.me
            .call_required(EntryPoint::NumberOfTags, |m| m.number_of_tags())
    }

    fn tags(&self, patch: &PatchRecord) -> BTreeSet<String> {
        self.me
            .call_required(EntryPoint::TagsFromDump, |m| m.tags_from_dump(patch.data()))
    }

    fn set_tags(&self, patch: &mut PatchRecord, tags: &BTreeSet<String>) -> bool {
        let tagged = self
            .me
            .call_logged(EntryPoint::SetTags, |m| m.set_tags(patch.data(), tags));

        match tagged {
            Some(data) => {
                patch.set_data(data);
                true
            }
            None => false,
        }
    }
}
