//! Legacy bank dump decoders
//!
//! Decodes flat bank files from before SysEx librarians existed into canonical
//! [`PatchRecord`]s. Two containers exist, both holding [`BANK_SLOTS`] paired
//! patch and tone blocks:
//!
//! - **Variable-length** (`.m80`): per slot, a length-prefixed patch name, the
//!   patch block, a length-prefixed tone name, the tone block
//! - **Fixed-length** (`.mks80`): exactly [`FIXED_FILE_LENGTH`] bytes of
//!   back-to-back patch+tone rows, no names
//!
//! A bank is imported completely or not at all. The `decode_*` functions
//! report why a file was rejected; the `load_*` functions log that reason and
//! return an empty vector, which is what file-import flows use.

mod error;
pub mod mks80;
mod reader;

pub use error::{LegacyBankError, LegacyResult};
pub use mks80::{PATCH_BLOCK_SIZE, TONE_BLOCK_SIZE};
pub use reader::{ByteReader, NAME_PADDING_MAX};

use crate::patch::PatchRecord;

/// Slots in every legacy bank
pub const BANK_SLOTS: usize = 64;

/// Size of one patch+tone row in the fixed-length container
pub const ROW_SIZE: usize = PATCH_BLOCK_SIZE + TONE_BLOCK_SIZE;

/// Exact size of a fixed-length container
pub const FIXED_FILE_LENGTH: usize = BANK_SLOTS * ROW_SIZE;

/// Container flavour of a legacy bank file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    /// Named records of varying length
    VariableLength,
    /// Unnamed fixed-size rows
    FixedLength,
}

/// Guess the container from the file size
///
/// Only a file of exactly [`FIXED_FILE_LENGTH`] bytes is taken as fixed-length.
pub fn detect_format(data: &[u8]) -> LegacyFormat {
    if data.len() == FIXED_FILE_LENGTH {
        LegacyFormat::FixedLength
    } else {
        LegacyFormat::VariableLength
    }
}

/// One slot of a variable-length bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSlot {
    pub patch_name: String,
    pub patch_block: Vec<u8>,
    pub tone_name: String,
    pub tone_block: Vec<u8>,
}

/// Read all slots of a variable-length container
///
/// Reads named patch/tone quadruples until the buffer is exhausted. Running
/// out of bytes inside a block fails the whole read.
pub fn read_named_slots(data: &[u8]) -> LegacyResult<Vec<NamedSlot>> {
    let mut reader = ByteReader::new(data);
    let mut slots = Vec::with_capacity(BANK_SLOTS);

    while !reader.is_exhausted() {
        let slot = slots.len();
        let truncated = |reader: &ByteReader| LegacyBankError::Truncated {
            slot,
            offset: reader.position(),
        };

        let patch_name = reader.read_pascal_string();
        let patch_block = reader
            .read_block(PATCH_BLOCK_SIZE)
            .ok_or_else(|| truncated(&reader))?
            .to_vec();
        let tone_name = reader.read_pascal_string();
        let tone_block = reader
            .read_block(TONE_BLOCK_SIZE)
            .ok_or_else(|| truncated(&reader))?
            .to_vec();

        slots.push(NamedSlot {
            patch_name,
            patch_block,
            tone_name,
            tone_block,
        });
    }

    Ok(slots)
}

/// Decode a variable-length (`.m80`) bank
pub fn decode_m80(data: &[u8]) -> LegacyResult<Vec<PatchRecord>> {
    let slots = read_named_slots(data)?;
    if slots.len() != BANK_SLOTS {
        return Err(LegacyBankError::WrongRecordCount {
            expected: BANK_SLOTS,
            found: slots.len(),
        });
    }

    let patches: Vec<Vec<u8>> = slots.iter().map(|s| mks80::patch_from_dat(&s.patch_block)).collect();
    let tones: Vec<Vec<u8>> = slots.iter().map(|s| mks80::tone_from_dat(&s.tone_block)).collect();

    let records = mks80::patches_from_aprs(&tones, &patches)
        .into_iter()
        .zip(&slots)
        .map(|(mut record, slot)| {
            let patch_name = slot.patch_name.trim();
            if !patch_name.is_empty() {
                record = record.with_name(patch_name);
            }
            let tone_name = slot.tone_name.trim();
            if !tone_name.is_empty() {
                record = record.with_part_name(tone_name);
            }
            record
        })
        .collect();

    Ok(records)
}

/// Decode a fixed-length (`.mks80`) bank
pub fn decode_mks80(data: &[u8]) -> LegacyResult<Vec<PatchRecord>> {
    if data.len() != FIXED_FILE_LENGTH {
        return Err(LegacyBankError::WrongLength {
            expected: FIXED_FILE_LENGTH,
            found: data.len(),
        });
    }

    let mut reader = ByteReader::new(data);
    let mut patches = Vec::with_capacity(BANK_SLOTS);
    let mut tones = Vec::with_capacity(BANK_SLOTS);

    for slot in 0..BANK_SLOTS {
        let row = reader.read_block(ROW_SIZE).ok_or(LegacyBankError::Truncated {
            slot,
            offset: reader.position(),
        })?;
        patches.push(mks80::patch_from_dat(&row[..PATCH_BLOCK_SIZE]));
        tones.push(mks80::tone_from_dat(&row[PATCH_BLOCK_SIZE..]));
    }

    Ok(mks80::patches_from_aprs(&tones, &patches))
}

/// Load a variable-length bank, logging and returning nothing on failure
pub fn load_m80_file(data: &[u8]) -> Vec<PatchRecord> {
    log_failure("m80", decode_m80(data))
}

/// Load a fixed-length bank, logging and returning nothing on failure
pub fn load_mks80_file(data: &[u8]) -> Vec<PatchRecord> {
    log_failure("mks80", decode_mks80(data))
}

/// Load a legacy bank of either container format
pub fn load_legacy_bank(data: &[u8]) -> Vec<PatchRecord> {
    match detect_format(data) {
        LegacyFormat::FixedLength => load_mks80_file(data),
        LegacyFormat::VariableLength => load_m80_file(data),
    }
}

fn log_failure(format: &str, result: LegacyResult<Vec<PatchRecord>>) -> Vec<PatchRecord> {
    match result {
        Ok(records) => {
            log::info!("Legacy bank: Loaded {} patches from {} file", records.len(), format);
            records
        }
        Err(e) => {
            log::warn!("Legacy bank: Aborting load of {} file: {}", format, e);
            Vec::new()
        }
    }
}
