//! GenericAdaptation - the bridge between host and adaptation modules
//!
//! Implements the device contract ([`Synth`], [`DiscoverableDevice`]) for any
//! loaded module. Every operation is forwarded to the runtime as one locked
//! call; the host never sees adaptation errors:
//! - optional entry points fall back to a documented default
//! - entry points required by an advertised capability log a fatal
//!   configuration error and return an empty result
//! - an unavailable runtime degrades every call to its neutral value

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use patchbay_core::capability::{
    DiscoverableDevice, EditBufferCapability, ProgramDumpCapability, StoredPatchNameCapability,
    StoredTagCapability, Synth,
};
use patchbay_core::{
    default_fingerprint, BankNumber, MidiChannel, MidiMessage, MidiSink, PatchRecord, SendError,
};

use crate::capability::{GenericEditBuffer, GenericProgramDump, GenericStoredName, GenericStoredTags};
use crate::error::{AdaptationError, AdaptationResult};
use crate::module::{AdaptationModule, EntryPoint, ModuleOrigin};
use crate::runtime::{self, Runtime};

/// Banks assumed when a module does not say
pub const DEFAULT_NUMBER_OF_BANKS: u32 = 1;

/// Patches per bank assumed when a module does not say
pub const DEFAULT_PATCHES_PER_BANK: u32 = 128;

/// Detection wait assumed when a module does not say
pub const DEFAULT_DETECT_WAIT_MS: u64 = 100;

/// Marker for "no channel known" in the atomic channel slot
const NO_CHANNEL: u8 = u8::MAX;

/// A device backed by an adaptation module
pub struct GenericAdaptation {
    runtime: &'static Runtime,

    /// Key of the module in the runtime (file stem or built-in name)
    module_name: String,

    /// Declared device name, fixed for the lifetime of the module
    device_name: String,

    origin: ModuleOrigin,

    /// Channel found by detection
    channel: AtomicU8,
}

impl GenericAdaptation {
    /// Load a module file into the global runtime
    pub fn from_file(path: &Path) -> AdaptationResult<Arc<Self>> {
        let runtime = runtime::global()?;
        Self::install(runtime, AdaptationModule::load_file(path)?)
    }

    /// Load embedded module source into the global runtime
    pub fn from_embedded(module_name: &str, source: &str) -> AdaptationResult<Arc<Self>> {
        let runtime = runtime::global()?;
        Self::install(
            runtime,
            AdaptationModule::parse(module_name, ModuleOrigin::Embedded, source)?,
        )
    }

    /// Install a parsed module into a runtime and bridge to it
    pub fn install(runtime: &'static Runtime, module: AdaptationModule) -> AdaptationResult<Arc<Self>> {
        let adaptation = Self {
            runtime,
            module_name: module.module_name().to_string(),
            device_name: module.name().to_string(),
            origin: module.origin().clone(),
            channel: AtomicU8::new(NO_CHANNEL),
        };

        runtime.install(module)?;
        Ok(Arc::new(adaptation))
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    /// Re-read the module file; built-in modules cannot be reloaded
    pub fn reload(&self) -> AdaptationResult<()> {
        self.runtime.reload(&self.module_name)
    }

    /// Whether the module defines an entry point, checked under the runtime lock
    pub fn has_entry(&self, entry: EntryPoint) -> bool {
        self.runtime
            .has_entry(&self.module_name, entry)
            .unwrap_or_else(|e| {
                log::warn!("Adaptation: {}", e);
                false
            })
    }

    /// Call one entry point of this adaptation
    pub fn call<T>(
        &self,
        entry: EntryPoint,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> AdaptationResult<T> {
        self.runtime.call(&self.module_name, entry, f)
    }

    /// Optional entry point: absent means `default`
    pub(crate) fn call_or<T>(
        &self,
        entry: EntryPoint,
        default: T,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> T {
        match self.call(entry, f) {
            Ok(value) => value,
            Err(e) if e.is_missing_entry() => default,
            Err(e) => {
                log::error!("Adaptation: {}", e);
                default
            }
        }
    }

    /// Entry point required by an advertised capability; every failure is logged
    pub(crate) fn call_logged<T>(
        &self,
        entry: EntryPoint,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> Option<T> {
        match self.call(entry, f) {
            Ok(value) => Some(value),
            Err(e @ AdaptationError::MissingEntryPoint { .. }) => {
                log::error!("Adaptation: {}, fatal configuration error", e);
                None
            }
            Err(e) => {
                log::error!("Adaptation: {}", e);
                None
            }
        }
    }

    pub(crate) fn call_required<T: Default>(
        &self,
        entry: EntryPoint,
        f: impl FnOnce(&AdaptationModule) -> AdaptationResult<T>,
    ) -> T {
        self.call_logged(entry, f).unwrap_or_default()
    }

    /// Channel for outgoing messages; channel 1 until detection found one
    pub(crate) fn channel_or_default(&self) -> MidiChannel {
        self.current_channel().unwrap_or_default()
    }

    // A capability is advertised when the module can recognize its dumps.
    // Requests are optional (some devices cannot be asked), conversions are
    // required once advertised.

    fn supports_edit_buffer(&self) -> bool {
        self.has_entry(EntryPoint::IsEditBufferDump)
    }

    fn supports_program_dump(&self) -> bool {
        self.has_entry(EntryPoint::IsSingleProgramDump)
    }

    fn supports_stored_name(&self) -> bool {
        self.has_entry(EntryPoint::NameFromDump)
    }

    fn supports_stored_tags(&self) -> bool {
        self.has_entry(EntryPoint::NumberOfTags)
    }
}

impl Synth for GenericAdaptation {
    fn name(&self) -> String {
        self.device_name.clone()
    }

    fn calculate_fingerprint(&self, patch: &PatchRecord) -> Option<String> {
        match self.call(EntryPoint::CalculateFingerprint, |m| {
            m.calculate_fingerprint(patch.data())
        }) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) if e.is_missing_entry() => Some(default_fingerprint(patch)),
            // Any other digest would give the patch a second identity
            Err(e) => {
                log::error!("Adaptation: {}, patch left without fingerprint", e);
                None
            }
        }
    }

    fn number_of_banks(&self) -> u32 {
        self.call_or(EntryPoint::NumberOfBanks, DEFAULT_NUMBER_OF_BANKS, |m| {
            m.number_of_banks()
        })
    }

    fn number_of_patches(&self) -> u32 {
        self.call_or(EntryPoint::NumberOfPatchesPerBank, DEFAULT_PATCHES_PER_BANK, |m| {
            m.number_of_patches_per_bank()
        })
    }

    fn friendly_bank_name(&self, bank: BankNumber) -> String {
        self.call_or(
            EntryPoint::FriendlyBankName,
            format!("Bank {}", bank.index() + 1),
            |m| m.friendly_bank_name(bank),
        )
    }

    fn is_own_sysex(&self, message: &MidiMessage) -> bool {
        self.runtime
            .with_module(&self.module_name, |m| Ok(m.matches_own_sysex(message)))
            .unwrap_or(false)
    }

    fn send_block_of_messages_to_synth(
        &self,
        output: &mut dyn MidiSink,
        messages: &[MidiMessage],
    ) -> Result<(), SendError> {
        // Throttle settings are read under the lock; sending happens outside of it
        let throttle = self.call_or(EntryPoint::MessageThrottle, None, |m| m.throttle().map(Some));

        let Some(throttle) = throttle else {
            for message in messages {
                output.send_message(message)?;
            }
            return Ok(());
        };

        let delay = Duration::from_millis(throttle.delay_ms);
        for (i, chunk) in messages.chunks(throttle.chunk_size.max(1)).enumerate() {
            if i > 0 {
                thread::sleep(delay);
            }
            for message in chunk {
                output.send_message(message)?;
            }
        }
        Ok(())
    }

    fn edit_buffer(self: Arc<Self>) -> Option<Arc<dyn EditBufferCapability>> {
        if !self.supports_edit_buffer() {
            return None;
        }
        Some(Arc::new(GenericEditBuffer::new(self)))
    }

    fn edit_buffer_ref(&self) -> Option<Box<dyn EditBufferCapability + '_>> {
        if !self.supports_edit_buffer() {
            return None;
        }
        Some(Box::new(GenericEditBuffer::new(self)))
    }

    fn program_dump(self: Arc<Self>) -> Option<Arc<dyn ProgramDumpCapability>> {
        if !self.supports_program_dump() {
            return None;
        }
        Some(Arc::new(GenericProgramDump::new(self)))
    }

    fn program_dump_ref(&self) -> Option<Box<dyn ProgramDumpCapability + '_>> {
        if !self.supports_program_dump() {
            return None;
        }
        Some(Box::new(GenericProgramDump::new(self)))
    }

    fn stored_name(self: Arc<Self>) -> Option<Arc<dyn StoredPatchNameCapability>> {
        if !self.supports_stored_name() {
            return None;
        }
        Some(Arc::new(GenericStoredName::new(self)))
    }

    fn stored_name_ref(&self) -> Option<Box<dyn StoredPatchNameCapability + '_>> {
        if !self.supports_stored_name() {
            return None;
        }
        Some(Box::new(GenericStoredName::new(self)))
    }

    fn stored_tags(self: Arc<Self>) -> Option<Arc<dyn StoredTagCapability>> {
        if !self.supports_stored_tags() {
            return None;
        }
        Some(Arc::new(GenericStoredTags::new(self)))
    }

    fn stored_tags_ref(&self) -> Option<Box<dyn StoredTagCapability + '_>> {
        if !self.supports_stored_tags() {
            return None;
        }
        Some(Box::new(GenericStoredTags::new(self)))
    }
}

impl DiscoverableDevice for GenericAdaptation {
    fn device_detect(&self, channel: MidiChannel) -> Vec<MidiMessage> {
        self.call_or(EntryPoint::CreateDeviceDetectMessage, Vec::new(), |m| {
            m.create_device_detect_message(channel)
        })
    }

    fn device_detect_sleep_ms(&self) -> u64 {
        self.call_or(
            EntryPoint::DeviceDetectWaitMilliseconds,
            DEFAULT_DETECT_WAIT_MS,
            |m| m.device_detect_wait_ms(),
        )
    }

    fn channel_if_valid_device_response(&self, message: &MidiMessage) -> Option<MidiChannel> {
        self.call_or(EntryPoint::ChannelIfValidDeviceResponse, None, |m| {
            m.channel_if_valid_device_response(message)
        })
    }

    fn needs_channel_specific_detection(&self) -> bool {
        self.call_or(EntryPoint::NeedsChannelSpecificDetection, true, |m| {
            m.needs_channel_specific_detection()
        })
    }

    fn current_channel(&self) -> Option<MidiChannel> {
        MidiChannel::from_zero_based(self.channel.load(Ordering::Relaxed))
    }

    fn set_current_channel(&self, channel: Option<MidiChannel>) {
        let value = channel.map_or(NO_CHANNEL, MidiChannel::zero_based);
        self.channel.store(value, Ordering::Relaxed);
    }
}
