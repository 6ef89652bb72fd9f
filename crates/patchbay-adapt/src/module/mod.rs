//! Adaptation modules - declarative device definitions
//!
//! A module is a YAML document describing one synthesizer: its geometry, how
//! to find it, which dumps it sends and how to turn stored patch bytes back
//! into messages. Every behavior a module can provide is an [`EntryPoint`];
//! a module provides an entry point exactly when the YAML section behind it
//! is present.
//!
//! ```yaml
//! name: Korg MS2000
//! banks: { count: 8, patches_per_bank: 16 }
//! edit_buffer:
//!   request: "F0 42 {channel+30} 58 10 F7"
//!   dump: { pattern: "F0 42 ?? 58 40" }
//!   send: { channel: { byte: 2, base: 0x30 } }
//! ```
//!
//! Modules are plain data. All calls into a loaded module go through the
//! process-wide runtime (see [`crate::runtime`]).

mod rewrite;
mod template;

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use patchbay_core::{
    sha256_hex, split_sysex, BankNumber, MidiChannel, MidiMessage, ProgramNumber,
};
use serde::Deserialize;

use crate::error::{AdaptationError, AdaptationResult};

pub use rewrite::{
    ChannelByte, Checksum, ChecksumKind, MessageWriter, Rewrite, RewriteError, SlotLayout,
};
pub use template::{BytePattern, MessageTemplate, Placeholder, TemplateContext, TemplateError};

/// Highest category index a tag byte can hold
const MAX_CATEGORIES: usize = 0x7F;

/// Named behaviors a module may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Name,
    NumberOfBanks,
    NumberOfPatchesPerBank,
    FriendlyBankName,
    CreateDeviceDetectMessage,
    DeviceDetectWaitMilliseconds,
    ChannelIfValidDeviceResponse,
    NeedsChannelSpecificDetection,
    CreateEditBufferRequest,
    IsEditBufferDump,
    ConvertToEditBuffer,
    CreateProgramDumpRequest,
    IsSingleProgramDump,
    NumberFromDump,
    ConvertToProgramDump,
    NameFromDump,
    RenamePatch,
    IsDefaultName,
    NumberOfTags,
    TagsFromDump,
    SetTags,
    CalculateFingerprint,
    MessageThrottle,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 23] = [
        EntryPoint::Name,
        EntryPoint::NumberOfBanks,
        EntryPoint::NumberOfPatchesPerBank,
        EntryPoint::FriendlyBankName,
        EntryPoint::CreateDeviceDetectMessage,
        EntryPoint::DeviceDetectWaitMilliseconds,
        EntryPoint::ChannelIfValidDeviceResponse,
        EntryPoint::NeedsChannelSpecificDetection,
        EntryPoint::CreateEditBufferRequest,
        EntryPoint::IsEditBufferDump,
        EntryPoint::ConvertToEditBuffer,
        EntryPoint::CreateProgramDumpRequest,
        EntryPoint::IsSingleProgramDump,
        EntryPoint::NumberFromDump,
        EntryPoint::ConvertToProgramDump,
        EntryPoint::NameFromDump,
        EntryPoint::RenamePatch,
        EntryPoint::IsDefaultName,
        EntryPoint::NumberOfTags,
        EntryPoint::TagsFromDump,
        EntryPoint::SetTags,
        EntryPoint::CalculateFingerprint,
        EntryPoint::MessageThrottle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::Name => "name",
            EntryPoint::NumberOfBanks => "numberOfBanks",
            EntryPoint::NumberOfPatchesPerBank => "numberOfPatchesPerBank",
            EntryPoint::FriendlyBankName => "friendlyBankName",
            EntryPoint::CreateDeviceDetectMessage => "createDeviceDetectMessage",
            EntryPoint::DeviceDetectWaitMilliseconds => "deviceDetectWaitMilliseconds",
            EntryPoint::ChannelIfValidDeviceResponse => "channelIfValidDeviceResponse",
            EntryPoint::NeedsChannelSpecificDetection => "needsChannelSpecificDetection",
            EntryPoint::CreateEditBufferRequest => "createEditBufferRequest",
            EntryPoint::IsEditBufferDump => "isEditBufferDump",
            EntryPoint::ConvertToEditBuffer => "convertToEditBuffer",
            EntryPoint::CreateProgramDumpRequest => "createProgramDumpRequest",
            EntryPoint::IsSingleProgramDump => "isSingleProgramDump",
            EntryPoint::NumberFromDump => "numberFromDump",
            EntryPoint::ConvertToProgramDump => "convertToProgramDump",
            EntryPoint::NameFromDump => "nameFromDump",
            EntryPoint::RenamePatch => "renamePatch",
            EntryPoint::IsDefaultName => "isDefaultName",
            EntryPoint::NumberOfTags => "numberOfTags",
            EntryPoint::TagsFromDump => "tagsFromDump",
            EntryPoint::SetTags => "setTags",
            EntryPoint::CalculateFingerprint => "calculateFingerprint",
            EntryPoint::MessageThrottle => "messageThrottle",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Module source format
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankLayout {
    pub count: Option<u32>,
    pub patches_per_bank: Option<u32>,
    pub names: Option<Vec<String>>,
}

/// Detection response: a pattern plus the byte carrying the channel
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseMatcher {
    pub pattern: BytePattern,
    pub channel_byte: usize,
    #[serde(default = "default_channel_mask")]
    pub channel_mask: u8,
}

fn default_channel_mask() -> u8 {
    0x0F
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionSection {
    pub request: Option<MessageTemplate>,
    pub wait_ms: Option<u64>,
    pub response: Option<ResponseMatcher>,
    pub channel_specific: Option<bool>,
}

/// Recognizes a dump by prefix and, optionally, exact length
///
/// A message matching any `exclude` pattern is never a match, for dumps that
/// share a header with another kind of dump.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpMatcher {
    pub pattern: BytePattern,
    pub length: Option<usize>,
    #[serde(default)]
    pub exclude: Vec<BytePattern>,
}

impl DumpMatcher {
    pub fn matches(&self, message: &[u8]) -> bool {
        self.length.map_or(true, |len| message.len() == len)
            && self.pattern.matches(message)
            && !self.exclude.iter().any(|excluded| excluded.matches(message))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditBufferSection {
    pub request: Option<MessageTemplate>,
    pub dump: Option<DumpMatcher>,
    pub send: Option<Rewrite>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramDumpSection {
    pub request: Option<MessageTemplate>,
    pub dump: Option<DumpMatcher>,
    pub slot: Option<SlotLayout>,
    pub send: Option<Rewrite>,
}

/// Fixed-width name field inside the patch data
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameField {
    pub offset: usize,
    pub length: usize,
    #[serde(default = "default_name_pad")]
    pub pad: u8,
    pub default: Option<String>,
}

fn default_name_pad() -> u8 {
    0x20
}

impl NameField {
    /// Byte range of the name, `None` if it does not fit in an address
    pub fn range(&self) -> Option<Range<usize>> {
        self.offset
            .checked_add(self.length)
            .map(|end| self.offset..end)
    }
}

/// Category bytes: a value of k > 0 selects `categories[k - 1]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagField {
    pub offsets: Vec<usize>,
    pub categories: Vec<String>,
}

/// Byte ranges left out of the fingerprint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerprintSection {
    #[serde(default)]
    pub exclude_name: bool,
    #[serde(default)]
    pub ignore: Vec<[usize; 2]>,
}

/// Pacing for devices with small receive buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Throttle {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    pub delay_ms: u64,
}

fn default_chunk_size() -> usize {
    1
}

/// Parsed module document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDefinition {
    pub name: String,
    #[serde(default)]
    pub banks: BankLayout,
    pub detection: Option<DetectionSection>,
    pub edit_buffer: Option<EditBufferSection>,
    pub program_dump: Option<ProgramDumpSection>,
    /// Recomputed on every message this module rewrites
    pub checksum: Option<Checksum>,
    pub patch_name: Option<NameField>,
    pub tags: Option<TagField>,
    pub fingerprint: Option<FingerprintSection>,
    pub throttle: Option<Throttle>,
}

/// Where a module was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    File(PathBuf),
    Embedded,
}

impl fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleOrigin::File(path) => write!(f, "{}", path.display()),
            ModuleOrigin::Embedded => f.write_str("built-in"),
        }
    }
}

/// Module name derived from a file path (the file stem)
pub fn module_name_from_path(path: &Path) -> AdaptationResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AdaptationError::NotAModuleFile(path.to_path_buf()))
}

// ============================================================================
// Loaded module
// ============================================================================

/// A validated module and the operations behind its entry points
///
/// Every operation returns [`AdaptationError::MissingEntryPoint`] when the
/// module does not define it.
#[derive(Debug, Clone)]
pub struct AdaptationModule {
    module_name: String,
    origin: ModuleOrigin,
    source: String,
    def: ModuleDefinition,
}

impl AdaptationModule {
    /// Parse and validate module source
    pub fn parse(module_name: &str, origin: ModuleOrigin, source: &str) -> AdaptationResult<Self> {
        let def: ModuleDefinition =
            serde_yaml::from_str(source).map_err(|e| AdaptationError::InvalidModule {
                module: module_name.to_string(),
                reason: e.to_string(),
            })?;

        let module = Self {
            module_name: module_name.to_string(),
            origin,
            source: source.to_string(),
            def,
        };
        module.validate()?;
        Ok(module)
    }

    /// Read and parse a module file
    pub fn load_file(path: &Path) -> AdaptationResult<Self> {
        let module_name = module_name_from_path(path)?;
        let source = std::fs::read_to_string(path)?;
        Self::parse(&module_name, ModuleOrigin::File(path.to_path_buf()), &source)
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.def
    }

    /// Source text the module was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Same origin and same source text
    pub fn is_same_as(&self, other: &AdaptationModule) -> bool {
        self.origin == other.origin && self.source == other.source
    }

    /// Declared device name
    pub fn name(&self) -> &str {
        &self.def.name
    }

    fn validate(&self) -> AdaptationResult<()> {
        let def = &self.def;
        let mut problems = Vec::new();

        if def.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        if def.banks.count == Some(0) {
            problems.push("banks.count must be at least 1".to_string());
        }
        if def.banks.patches_per_bank == Some(0) {
            problems.push("banks.patches_per_bank must be at least 1".to_string());
        }
        if let Some(program_dump) = &def.program_dump {
            if program_dump.send.is_some() && program_dump.slot.is_none() {
                problems.push("program_dump.send requires program_dump.slot".to_string());
            }
        }
        if let Some(checksum) = &def.checksum {
            if checksum.from > checksum.to {
                problems.push("checksum.from must not exceed checksum.to".to_string());
            }
        }
        if let Some(field) = &def.patch_name {
            if field.length == 0 {
                problems.push("patch_name.length must be at least 1".to_string());
            }
            if field.range().is_none() {
                problems.push("patch_name.offset + length is out of range".to_string());
            }
        }
        if let Some(tags) = &def.tags {
            if tags.offsets.is_empty() {
                problems.push("tags.offsets must not be empty".to_string());
            }
            if tags.categories.is_empty() || tags.categories.len() > MAX_CATEGORIES {
                problems.push(format!("tags.categories must hold 1 to {} entries", MAX_CATEGORIES));
            }
        }
        if let Some(fingerprint) = &def.fingerprint {
            if fingerprint.exclude_name && def.patch_name.is_none() {
                problems.push("fingerprint.exclude_name requires patch_name".to_string());
            }
            if fingerprint.ignore.iter().any(|[start, end]| start > end) {
                problems.push("fingerprint.ignore ranges must be [start, end)".to_string());
            }
        }
        if def.throttle.map_or(false, |t| t.chunk_size == 0) {
            problems.push("throttle.chunk_size must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AdaptationError::InvalidModule {
                module: self.module_name.clone(),
                reason: problems.join("; "),
            })
        }
    }

    /// Whether the module provides an entry point
    pub fn has_entry(&self, entry: EntryPoint) -> bool {
        let def = &self.def;
        let detection = def.detection.as_ref();
        let edit_buffer = def.edit_buffer.as_ref();
        let program_dump = def.program_dump.as_ref();

        match entry {
            EntryPoint::Name => true,
            EntryPoint::NumberOfBanks => def.banks.count.is_some(),
            EntryPoint::NumberOfPatchesPerBank => def.banks.patches_per_bank.is_some(),
            EntryPoint::FriendlyBankName => def.banks.names.is_some(),
            EntryPoint::CreateDeviceDetectMessage => detection.map_or(false, |d| d.request.is_some()),
            EntryPoint::DeviceDetectWaitMilliseconds => {
                detection.map_or(false, |d| d.wait_ms.is_some())
            }
            EntryPoint::ChannelIfValidDeviceResponse => {
                detection.map_or(false, |d| d.response.is_some())
            }
            EntryPoint::NeedsChannelSpecificDetection => {
                detection.map_or(false, |d| d.channel_specific.is_some())
            }
            EntryPoint::CreateEditBufferRequest => edit_buffer.map_or(false, |e| e.request.is_some()),
            EntryPoint::IsEditBufferDump => edit_buffer.map_or(false, |e| e.dump.is_some()),
            EntryPoint::ConvertToEditBuffer => edit_buffer.map_or(false, |e| e.send.is_some()),
            EntryPoint::CreateProgramDumpRequest => {
                program_dump.map_or(false, |p| p.request.is_some())
            }
            EntryPoint::IsSingleProgramDump => program_dump.map_or(false, |p| p.dump.is_some()),
            EntryPoint::NumberFromDump => program_dump.map_or(false, |p| p.slot.is_some()),
            EntryPoint::ConvertToProgramDump => program_dump.map_or(false, |p| p.send.is_some()),
            EntryPoint::NameFromDump | EntryPoint::RenamePatch | EntryPoint::IsDefaultName => {
                def.patch_name.is_some()
            }
            EntryPoint::NumberOfTags | EntryPoint::TagsFromDump | EntryPoint::SetTags => {
                def.tags.is_some()
            }
            EntryPoint::CalculateFingerprint => def.fingerprint.is_some(),
            EntryPoint::MessageThrottle => def.throttle.is_some(),
        }
    }

    /// Entry points this module provides
    pub fn entries(&self) -> Vec<EntryPoint> {
        EntryPoint::ALL
            .into_iter()
            .filter(|&entry| self.has_entry(entry))
            .collect()
    }

    /// Whether a message matches any dump or response pattern of this module
    pub fn matches_own_sysex(&self, message: &MidiMessage) -> bool {
        let bytes = message.as_bytes();
        let def = &self.def;

        let edit_dump = def.edit_buffer.as_ref().and_then(|e| e.dump.as_ref());
        let program_dump = def.program_dump.as_ref().and_then(|p| p.dump.as_ref());
        let response = def.detection.as_ref().and_then(|d| d.response.as_ref());

        edit_dump.map_or(false, |m| m.matches(bytes))
            || program_dump.map_or(false, |m| m.matches(bytes))
            || response.map_or(false, |r| r.pattern.matches(bytes))
    }

    fn missing(&self, entry: EntryPoint) -> AdaptationError {
        AdaptationError::MissingEntryPoint {
            module: self.module_name.clone(),
            entry,
        }
    }

    fn violation(&self, entry: EntryPoint, reason: impl fmt::Display) -> AdaptationError {
        AdaptationError::ContractViolation {
            module: self.module_name.clone(),
            entry,
            reason: reason.to_string(),
        }
    }

    fn render(
        &self,
        entry: EntryPoint,
        template: &MessageTemplate,
        ctx: TemplateContext,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        template.render(&ctx).map_err(|e| self.violation(entry, e))
    }

    /// Apply `edit` to every message of the patch data, then recompute checksums
    fn convert(
        &self,
        entry: EntryPoint,
        data: &[u8],
        edit: impl Fn(&mut MessageWriter) -> Result<(), RewriteError>,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let messages = split_sysex(data);
        if messages.is_empty() {
            return Err(self.violation(entry, "patch data contains no SysEx message"));
        }

        messages
            .iter()
            .map(|message| {
                let mut writer = MessageWriter::new(message);
                edit(&mut writer)?;
                writer.finish(self.def.checksum.as_ref())
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.violation(entry, e))
    }

    /// Recompute checksums after patch data was edited in place
    fn refresh_checksums(&self, entry: EntryPoint, data: Vec<u8>) -> AdaptationResult<Vec<u8>> {
        let Some(checksum) = &self.def.checksum else {
            return Ok(data);
        };

        let mut out = Vec::with_capacity(data.len());
        for message in split_sysex(&data) {
            let mut bytes = message.into_bytes();
            checksum
                .apply(&mut bytes)
                .map_err(|e| self.violation(entry, e))?;
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------------

    pub fn number_of_banks(&self) -> AdaptationResult<u32> {
        self.def
            .banks
            .count
            .ok_or_else(|| self.missing(EntryPoint::NumberOfBanks))
    }

    pub fn number_of_patches_per_bank(&self) -> AdaptationResult<u32> {
        self.def
            .banks
            .patches_per_bank
            .ok_or_else(|| self.missing(EntryPoint::NumberOfPatchesPerBank))
    }

    pub fn friendly_bank_name(&self, bank: BankNumber) -> AdaptationResult<String> {
        let names = self
            .def
            .banks
            .names
            .as_ref()
            .ok_or_else(|| self.missing(EntryPoint::FriendlyBankName))?;

        Ok(names
            .get(bank.index() as usize)
            .cloned()
            .unwrap_or_else(|| format!("Bank {}", bank.index() + 1)))
    }

    // ------------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------------

    fn detection(&self) -> Option<&DetectionSection> {
        self.def.detection.as_ref()
    }

    pub fn create_device_detect_message(
        &self,
        channel: MidiChannel,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let entry = EntryPoint::CreateDeviceDetectMessage;
        let template = self
            .detection()
            .and_then(|d| d.request.as_ref())
            .ok_or_else(|| self.missing(entry))?;

        self.render(
            entry,
            template,
            TemplateContext {
                channel: channel.zero_based(),
                ..Default::default()
            },
        )
    }

    pub fn device_detect_wait_ms(&self) -> AdaptationResult<u64> {
        self.detection()
            .and_then(|d| d.wait_ms)
            .ok_or_else(|| self.missing(EntryPoint::DeviceDetectWaitMilliseconds))
    }

    pub fn channel_if_valid_device_response(
        &self,
        message: &MidiMessage,
    ) -> AdaptationResult<Option<MidiChannel>> {
        let matcher = self
            .detection()
            .and_then(|d| d.response.as_ref())
            .ok_or_else(|| self.missing(EntryPoint::ChannelIfValidDeviceResponse))?;

        let bytes = message.as_bytes();
        if !matcher.pattern.matches(bytes) {
            return Ok(None);
        }
        Ok(bytes
            .get(matcher.channel_byte)
            .and_then(|&b| MidiChannel::from_zero_based(b & matcher.channel_mask)))
    }

    pub fn needs_channel_specific_detection(&self) -> AdaptationResult<bool> {
        self.detection()
            .and_then(|d| d.channel_specific)
            .ok_or_else(|| self.missing(EntryPoint::NeedsChannelSpecificDetection))
    }

    // ------------------------------------------------------------------------
    // Edit buffer
    // ------------------------------------------------------------------------

    fn edit_buffer(&self) -> Option<&EditBufferSection> {
        self.def.edit_buffer.as_ref()
    }

    pub fn create_edit_buffer_request(
        &self,
        channel: MidiChannel,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let entry = EntryPoint::CreateEditBufferRequest;
        let template = self
            .edit_buffer()
            .and_then(|e| e.request.as_ref())
            .ok_or_else(|| self.missing(entry))?;

        self.render(
            entry,
            template,
            TemplateContext {
                channel: channel.zero_based(),
                ..Default::default()
            },
        )
    }

    pub fn is_edit_buffer_dump(&self, message: &MidiMessage) -> AdaptationResult<bool> {
        self.edit_buffer()
            .and_then(|e| e.dump.as_ref())
            .map(|m| m.matches(message.as_bytes()))
            .ok_or_else(|| self.missing(EntryPoint::IsEditBufferDump))
    }

    pub fn convert_to_edit_buffer(
        &self,
        channel: MidiChannel,
        data: &[u8],
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let entry = EntryPoint::ConvertToEditBuffer;
        let rewrite = self
            .edit_buffer()
            .and_then(|e| e.send.as_ref())
            .ok_or_else(|| self.missing(entry))?;

        self.convert(entry, data, |writer| writer.apply_rewrite(rewrite, channel))
    }

    // ------------------------------------------------------------------------
    // Program dump
    // ------------------------------------------------------------------------

    fn program_dump(&self) -> Option<&ProgramDumpSection> {
        self.def.program_dump.as_ref()
    }

    pub fn create_program_dump_request(
        &self,
        channel: MidiChannel,
        place: ProgramNumber,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let entry = EntryPoint::CreateProgramDumpRequest;
        let template = self
            .program_dump()
            .and_then(|p| p.request.as_ref())
            .ok_or_else(|| self.missing(entry))?;

        self.render(
            entry,
            template,
            TemplateContext {
                channel: channel.zero_based(),
                bank: place.bank,
                program: place.slot,
            },
        )
    }

    pub fn is_single_program_dump(&self, message: &MidiMessage) -> AdaptationResult<bool> {
        self.program_dump()
            .and_then(|p| p.dump.as_ref())
            .map(|m| m.matches(message.as_bytes()))
            .ok_or_else(|| self.missing(EntryPoint::IsSingleProgramDump))
    }

    pub fn number_from_dump(&self, message: &MidiMessage) -> AdaptationResult<ProgramNumber> {
        let entry = EntryPoint::NumberFromDump;
        let layout = self
            .program_dump()
            .and_then(|p| p.slot.as_ref())
            .ok_or_else(|| self.missing(entry))?;

        layout
            .read(message.as_bytes())
            .map_err(|e| self.violation(entry, e))
    }

    pub fn convert_to_program_dump(
        &self,
        channel: MidiChannel,
        data: &[u8],
        place: ProgramNumber,
    ) -> AdaptationResult<Vec<MidiMessage>> {
        let entry = EntryPoint::ConvertToProgramDump;
        let section = self.program_dump().ok_or_else(|| self.missing(entry))?;
        let (Some(rewrite), Some(layout)) = (section.send.as_ref(), section.slot.as_ref()) else {
            return Err(self.missing(entry));
        };

        self.convert(entry, data, |writer| {
            writer.apply_rewrite(rewrite, channel)?;
            writer.apply_slot(layout, place)
        })
    }

    // ------------------------------------------------------------------------
    // Stored name
    // ------------------------------------------------------------------------

    fn name_field(&self, entry: EntryPoint) -> AdaptationResult<&NameField> {
        self.def.patch_name.as_ref().ok_or_else(|| self.missing(entry))
    }

    pub fn name_from_dump(&self, data: &[u8]) -> AdaptationResult<String> {
        let entry = EntryPoint::NameFromDump;
        let field = self.name_field(entry)?;
        let raw = field
            .range()
            .and_then(|range| data.get(range))
            .ok_or_else(|| self.violation(entry, "name field lies outside of the patch data"))?;

        let name: String = raw
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { ' ' })
            .collect();
        Ok(name.trim_end().to_string())
    }

    pub fn rename_patch(&self, data: &[u8], name: &str) -> AdaptationResult<Vec<u8>> {
        let entry = EntryPoint::RenamePatch;
        let field = self.name_field(entry)?;

        let mut out = data.to_vec();
        let target = match field.range() {
            Some(range) => out.get_mut(range),
            None => None,
        }
        .ok_or_else(|| self.violation(entry, "name field lies outside of the patch data"))?;

        let mut chars = name.chars().map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            }
        });
        for byte in target.iter_mut() {
            *byte = chars.next().unwrap_or(field.pad);
        }

        self.refresh_checksums(entry, out)
    }

    pub fn is_default_name(&self, data: &[u8]) -> AdaptationResult<bool> {
        let field = self.name_field(EntryPoint::IsDefaultName)?;
        let name = self.name_from_dump(data)?;

        Ok(name.is_empty()
            || field
                .default
                .as_deref()
                .map_or(false, |default| default.trim_end() == name))
    }

    // ------------------------------------------------------------------------
    // Stored tags
    // ------------------------------------------------------------------------

    fn tag_field(&self, entry: EntryPoint) -> AdaptationResult<&TagField> {
        self.def.tags.as_ref().ok_or_else(|| self.missing(entry))
    }

    pub fn number_of_tags(&self) -> AdaptationResult<usize> {
        Ok(self.tag_field(EntryPoint::NumberOfTags)?.offsets.len())
    }

    pub fn tags_from_dump(&self, data: &[u8]) -> AdaptationResult<BTreeSet<String>> {
        let entry = EntryPoint::TagsFromDump;
        let field = self.tag_field(entry)?;

        let mut tags = BTreeSet::new();
        for &offset in &field.offsets {
            let value = *data
                .get(offset)
                .ok_or_else(|| self.violation(entry, "tag byte lies outside of the patch data"))?;
            // Unknown category values are ignored
            if let Some(category) = (value as usize)
                .checked_sub(1)
                .and_then(|index| field.categories.get(index))
            {
                tags.insert(category.clone());
            }
        }
        Ok(tags)
    }

    pub fn set_tags(&self, data: &[u8], tags: &BTreeSet<String>) -> AdaptationResult<Vec<u8>> {
        let entry = EntryPoint::SetTags;
        let field = self.tag_field(entry)?;

        if tags.len() > field.offsets.len() {
            return Err(self.violation(
                entry,
                format!("{} tags given but only {} can be stored", tags.len(), field.offsets.len()),
            ));
        }

        let values = tags
            .iter()
            .map(|tag| {
                field
                    .categories
                    .iter()
                    .position(|category| category == tag)
                    .map(|index| (index + 1) as u8)
                    .ok_or_else(|| self.violation(entry, format!("unknown category '{}'", tag)))
            })
            .collect::<AdaptationResult<Vec<u8>>>()?;

        let mut out = data.to_vec();
        for (i, &offset) in field.offsets.iter().enumerate() {
            let slot = out
                .get_mut(offset)
                .ok_or_else(|| self.violation(entry, "tag byte lies outside of the patch data"))?;
            *slot = values.get(i).copied().unwrap_or(0);
        }

        self.refresh_checksums(entry, out)
    }

    // ------------------------------------------------------------------------
    // Identity and pacing
    // ------------------------------------------------------------------------

    /// SHA-256 over the patch data with ignored ranges removed
    pub fn calculate_fingerprint(&self, data: &[u8]) -> AdaptationResult<String> {
        let section = self
            .def
            .fingerprint
            .as_ref()
            .ok_or_else(|| self.missing(EntryPoint::CalculateFingerprint))?;

        let mut keep = vec![true; data.len()];
        let mut ignore = |start: usize, end: usize| {
            for flag in keep.iter_mut().take(end).skip(start) {
                *flag = false;
            }
        };

        if section.exclude_name {
            if let Some(range) = self.def.patch_name.as_ref().and_then(NameField::range) {
                ignore(range.start, range.end);
            }
        }
        for &[start, end] in &section.ignore {
            ignore(start, end);
        }

        let normalized: Vec<u8> = data
            .iter()
            .zip(&keep)
            .filter(|&(_, &kept)| kept)
            .map(|(&b, _)| b)
            .collect();
        Ok(sha256_hex(&normalized))
    }

    pub fn throttle(&self) -> AdaptationResult<Throttle> {
        self.def
            .throttle
            .ok_or_else(|| self.missing(EntryPoint::MessageThrottle))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_MODULE: &str = r#"
name: Test Synth
banks:
  count: 2
  patches_per_bank: 32
  names: [User, Preset]
detection:
  request: "F0 7E 7F 06 01 F7"
  wait_ms: 250
  response:
    pattern: "F0 7E ?? 06 02 7D"
    channel_byte: 2
  channel_specific: false
edit_buffer:
  request: "F0 7D {channel} 01 F7"
  dump:
    pattern: "F0 7D ?? 02 7F"
    length: 16
  send:
    set: { 4: 0x7F, 5: 0 }
    channel: { byte: 2 }
program_dump:
  request: "F0 7D {channel} 03 {bank} {program} F7"
  dump:
    pattern: "F0 7D ?? 02"
    length: 16
  slot: { bank_byte: 4, program_byte: 5 }
  send:
    channel: { byte: 2 }
checksum: { kind: sum7, from: 4, to: 14, at: 14 }
patch_name: { offset: 6, length: 4, default: "INIT" }
tags:
  offsets: [10, 11]
  categories: [Lead, Bass, Pad]
fingerprint:
  exclude_name: true
  ignore: [[0, 6], [14, 16]]
throttle: { chunk_size: 2, delay_ms: 5 }
"#;

    /// A 16 byte program dump as the test device would send it
    pub(crate) fn test_dump(bank: u8, program: u8, name: &[u8; 4], tags: [u8; 2]) -> Vec<u8> {
        let mut data = vec![0xF0, 0x7D, 0x00, 0x02, bank, program];
        data.extend_from_slice(name);
        data.extend_from_slice(&tags);
        data.extend_from_slice(&[0x11, 0x22]);
        let sum: u32 = data[4..14].iter().map(|&b| u32::from(b)).sum();
        data.push((sum & 0x7F) as u8);
        data.push(0xF7);
        data
    }

    fn test_module() -> AdaptationModule {
        AdaptationModule::parse("test_synth", ModuleOrigin::Embedded, TEST_MODULE).unwrap()
    }

    fn checksum_ok(message: &[u8]) -> bool {
        let sum: u32 = message[4..14].iter().map(|&b| u32::from(b)).sum();
        message[14] == (sum & 0x7F) as u8
    }

    #[test]
    fn test_full_module_provides_every_entry() {
        let module = test_module();
        assert_eq!(module.name(), "Test Synth");
        assert_eq!(module.module_name(), "test_synth");
        assert_eq!(module.entries(), EntryPoint::ALL.to_vec());
    }

    #[test]
    fn test_minimal_module() {
        let module = AdaptationModule::parse("bare", ModuleOrigin::Embedded, "name: Bare").unwrap();

        assert_eq!(module.entries(), vec![EntryPoint::Name]);
        assert!(module.number_of_banks().unwrap_err().is_missing_entry());
        assert!(module
            .convert_to_edit_buffer(MidiChannel::default(), &[0xF0, 0xF7])
            .unwrap_err()
            .is_missing_entry());
        assert!(!module.matches_own_sysex(&MidiMessage::new(vec![0xF0, 0x7D, 0xF7])));
    }

    #[test]
    fn test_invalid_modules_rejected() {
        let cases = [
            "name: [not, a, string",
            "name: \"  \"",
            "name: X\nunknown_section: 1",
            "name: X\nbanks: { count: 0 }",
            "name: X\nprogram_dump: { send: {} }",
            "name: X\nfingerprint: { exclude_name: true }",
            "name: X\nthrottle: { chunk_size: 0, delay_ms: 1 }",
            "name: X\nedit_buffer: { request: \"41 10\" }",
            "name: X\npatch_name: { offset: 18446744073709551615, length: 2 }",
        ];

        for source in cases {
            let result = AdaptationModule::parse("broken", ModuleOrigin::Embedded, source);
            assert!(
                matches!(result, Err(AdaptationError::InvalidModule { .. })),
                "accepted: {}",
                source
            );
        }
    }

    #[test]
    fn test_geometry() {
        let module = test_module();
        assert_eq!(module.number_of_banks().unwrap(), 2);
        assert_eq!(module.number_of_patches_per_bank().unwrap(), 32);
        assert_eq!(module.friendly_bank_name(BankNumber(1)).unwrap(), "Preset");
        assert_eq!(module.friendly_bank_name(BankNumber(4)).unwrap(), "Bank 5");
    }

    #[test]
    fn test_detection() {
        let module = test_module();
        let channel = MidiChannel::from_zero_based(3).unwrap();

        let detect = module.create_device_detect_message(channel).unwrap();
        assert_eq!(detect[0].as_bytes(), &[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]);
        assert_eq!(module.device_detect_wait_ms().unwrap(), 250);
        assert!(!module.needs_channel_specific_detection().unwrap());

        let reply = MidiMessage::new(vec![0xF0, 0x7E, 0x03, 0x06, 0x02, 0x7D, 0xF7]);
        assert_eq!(module.channel_if_valid_device_response(&reply).unwrap(), Some(channel));

        let other = MidiMessage::new(vec![0xF0, 0x7E, 0x03, 0x06, 0x02, 0x41, 0xF7]);
        assert_eq!(module.channel_if_valid_device_response(&other).unwrap(), None);
    }

    #[test]
    fn test_edit_buffer_conversion() {
        let module = test_module();
        let channel = MidiChannel::from_zero_based(5).unwrap();
        let data = test_dump(0, 12, b"Lead", [1, 0]);

        let request = module.create_edit_buffer_request(channel).unwrap();
        assert_eq!(request[0].as_bytes(), &[0xF0, 0x7D, 0x05, 0x01, 0xF7]);

        let out = module.convert_to_edit_buffer(channel, &data).unwrap();
        assert_eq!(out.len(), 1);
        let bytes = out[0].as_bytes();
        assert_eq!(&bytes[2..6], &[0x05, 0x02, 0x7F, 0x00]);
        assert!(checksum_ok(bytes));
        assert!(module.is_edit_buffer_dump(&out[0]).unwrap());
    }

    #[test]
    fn test_program_dump_conversion() {
        let module = test_module();
        let data = test_dump(0, 0, b"Pad1", [0, 0]);
        let place = ProgramNumber::new(1, 30);

        let request = module
            .create_program_dump_request(MidiChannel::default(), place)
            .unwrap();
        assert_eq!(request[0].as_bytes(), &[0xF0, 0x7D, 0x00, 0x03, 0x01, 0x1E, 0xF7]);

        let out = module
            .convert_to_program_dump(MidiChannel::default(), &data, place)
            .unwrap();
        assert!(module.is_single_program_dump(&out[0]).unwrap());
        assert_eq!(module.number_from_dump(&out[0]).unwrap(), place);
        assert!(checksum_ok(out[0].as_bytes()));
    }

    #[test]
    fn test_convert_rejects_non_sysex_data() {
        let module = test_module();
        let result = module.convert_to_edit_buffer(MidiChannel::default(), &[0x01, 0x02]);
        assert!(matches!(result, Err(AdaptationError::ContractViolation { .. })));
    }

    #[test]
    fn test_name_read_and_rename() {
        let module = test_module();
        let data = test_dump(0, 0, b"Ab  ", [0, 0]);

        assert_eq!(module.name_from_dump(&data).unwrap(), "Ab");
        assert!(!module.is_default_name(&data).unwrap());

        let renamed = module.rename_patch(&data, "INITIALIZED").unwrap();
        assert_eq!(module.name_from_dump(&renamed).unwrap(), "INIT");
        assert!(module.is_default_name(&renamed).unwrap());
        assert!(checksum_ok(&renamed));

        let short = module.rename_patch(&data, "é").unwrap();
        assert_eq!(&short[6..10], b"?   ");
    }

    #[test]
    fn test_tags() {
        let module = test_module();
        let data = test_dump(0, 0, b"Tags", [2, 9]);

        assert_eq!(module.number_of_tags().unwrap(), 2);
        let tags = module.tags_from_dump(&data).unwrap();
        assert_eq!(tags, BTreeSet::from(["Bass".to_string()]));

        let wanted = BTreeSet::from(["Pad".to_string(), "Lead".to_string()]);
        let tagged = module.set_tags(&data, &wanted).unwrap();
        assert_eq!(&tagged[10..12], &[1, 3]);
        assert_eq!(module.tags_from_dump(&tagged).unwrap(), wanted);
        assert!(checksum_ok(&tagged));

        let unknown = BTreeSet::from(["Drums".to_string()]);
        assert!(module.set_tags(&data, &unknown).is_err());

        let too_many = BTreeSet::from(["Lead".to_string(), "Bass".to_string(), "Pad".to_string()]);
        assert!(module.set_tags(&data, &too_many).is_err());
    }

    #[test]
    fn test_fingerprint_ignores_header_and_name() {
        let module = test_module();
        let a = test_dump(0, 1, b"Name", [1, 0]);
        let b = test_dump(1, 7, b"Else", [1, 0]);
        let c = test_dump(0, 1, b"Name", [2, 0]);

        let fa = module.calculate_fingerprint(&a).unwrap();
        assert_eq!(fa.len(), 64);
        assert_eq!(fa, module.calculate_fingerprint(&b).unwrap());
        assert_ne!(fa, module.calculate_fingerprint(&c).unwrap());
        assert_eq!(fa, module.calculate_fingerprint(&a).unwrap());
    }

    #[test]
    fn test_dump_matcher_exclusions() {
        let matcher: DumpMatcher = serde_yaml::from_str(
            "{ pattern: \"F0 7D ?? 02\", length: 6, exclude: [\"F0 7D ?? 02 00\"] }",
        )
        .unwrap();

        assert!(matcher.matches(&[0xF0, 0x7D, 0x00, 0x02, 0x05, 0xF7]));
        assert!(!matcher.matches(&[0xF0, 0x7D, 0x00, 0x02, 0x00, 0xF7]));
        assert!(!matcher.matches(&[0xF0, 0x7D, 0x00, 0x02, 0x05, 0x01, 0xF7]));
    }

    #[test]
    fn test_own_sysex() {
        let module = test_module();
        assert!(module.matches_own_sysex(&MidiMessage::new(test_dump(0, 0, b"    ", [0, 0]))));
        assert!(!module.matches_own_sysex(&MidiMessage::new(vec![0xF0, 0x41, 0xF7])));
    }

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(
            module_name_from_path(Path::new("/tmp/Korg_MS2000.yaml")).unwrap(),
            "Korg_MS2000"
        );
        assert!(module_name_from_path(Path::new("/")).is_err());
    }
}
