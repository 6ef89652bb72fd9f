//! Roland MKS-80 conversion from DAT blocks to APR SysEx
//!
//! The legacy bank formats store the MKS-80's parameter memory as raw DAT
//! blocks: one patch block and one tone block per slot. The rest of the system
//! works with "All Parameters" (APR) messages, so each block is framed as one
//! APR message and a slot's record carries its patch APR followed by its tone
//! APR.
//!
//! ```text
//! F0 41 35 0n 20 20 gg <data...> F7
//!    │  │  │  │  │  └─ group (patch / tone)
//!    │  │  │  │  └──── level
//!    │  │  │  └─────── format (MKS-80)
//!    │  │  └────────── channel
//!    │  └───────────── APR operation
//!    └──────────────── Roland
//! ```

use crate::midi::{SYSEX_END, SYSEX_START};
use crate::patch::PatchRecord;
use crate::types::ProgramNumber;

/// Device name of records produced from legacy banks
pub const DEVICE_NAME: &str = "Roland MKS-80";

/// Bytes of one patch in the DAT format
pub const PATCH_BLOCK_SIZE: usize = 0x17;

/// Bytes of one tone in the DAT format
pub const TONE_BLOCK_SIZE: usize = 0x27;

const ROLAND_ID: u8 = 0x41;
const OP_APR: u8 = 0x35;
const FORMAT_MKS80: u8 = 0x20;
const LEVEL_1: u8 = 0x20;

/// APR group carrying patch parameters
pub const GROUP_PATCH: u8 = 0x30;

/// APR group carrying tone parameters
pub const GROUP_TONE: u8 = 0x20;

/// Length of the APR framing around the data bytes
pub const APR_OVERHEAD: usize = 8;

/// Patch parameters from a DAT row (7-bit values)
///
/// Only the first [`PATCH_BLOCK_SIZE`] bytes are used.
pub fn patch_from_dat(block: &[u8]) -> Vec<u8> {
    block.iter().take(PATCH_BLOCK_SIZE).map(|b| b & 0x7F).collect()
}

/// Tone parameters from a DAT tone block (7-bit values)
pub fn tone_from_dat(block: &[u8]) -> Vec<u8> {
    block.iter().take(TONE_BLOCK_SIZE).map(|b| b & 0x7F).collect()
}

/// Frame parameter data as an APR message
pub fn apr_message(channel: u8, group: u8, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(data.len() + APR_OVERHEAD);
    message.extend_from_slice(&[
        SYSEX_START,
        ROLAND_ID,
        OP_APR,
        channel & 0x0F,
        FORMAT_MKS80,
        LEVEL_1,
        group,
    ]);
    message.extend_from_slice(data);
    message.push(SYSEX_END);
    message
}

/// Combine per-slot patch and tone parameters into canonical records
///
/// Slot `i` pairs `patches[i]` with `tones[i]`; records are placed in bank 0.
pub fn patches_from_aprs(tones: &[Vec<u8>], patches: &[Vec<u8>]) -> Vec<PatchRecord> {
    patches
        .iter()
        .zip(tones)
        .enumerate()
        .map(|(slot, (patch, tone))| {
            let mut data = apr_message(0, GROUP_PATCH, patch);
            data.extend(apr_message(0, GROUP_TONE, tone));
            PatchRecord::new(DEVICE_NAME, data, ProgramNumber::new(0, slot as u32))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dat_blocks_are_seven_bit() {
        let row: Vec<u8> = (0..PATCH_BLOCK_SIZE + TONE_BLOCK_SIZE).map(|i| 0x80 | i as u8).collect();

        let patch = patch_from_dat(&row);
        assert_eq!(patch.len(), PATCH_BLOCK_SIZE);
        assert!(patch.iter().all(|&b| b < 0x80));

        let tone = tone_from_dat(&row[PATCH_BLOCK_SIZE..]);
        assert_eq!(tone.len(), TONE_BLOCK_SIZE);
        assert_eq!(tone[0], PATCH_BLOCK_SIZE as u8);
    }

    #[test]
    fn test_apr_framing() {
        let msg = apr_message(0x12, GROUP_TONE, &[1, 2, 3]);
        assert_eq!(msg, vec![0xF0, 0x41, 0x35, 0x02, 0x20, 0x20, 0x20, 1, 2, 3, 0xF7]);
    }

    #[test]
    fn test_patches_from_aprs() {
        let tones = vec![vec![0u8; TONE_BLOCK_SIZE]; 2];
        let patches = vec![vec![1u8; PATCH_BLOCK_SIZE]; 2];

        let records = patches_from_aprs(&tones, &patches);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].place(), ProgramNumber::new(0, 1));
        assert_eq!(records[1].device(), DEVICE_NAME);

        let messages = records[0].messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].len(), PATCH_BLOCK_SIZE + APR_OVERHEAD);
        assert_eq!(messages[1].len(), TONE_BLOCK_SIZE + APR_OVERHEAD);
        assert_eq!(messages[0].as_bytes()[6], GROUP_PATCH);
    }
}
