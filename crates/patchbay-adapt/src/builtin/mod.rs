//! Built-in adaptations
//!
//! Module sources compiled into the binary. They are always loaded, even when
//! the adaptation directory is empty, unreadable or missing.

/// Module name and source of every built-in adaptation
pub const BUILTIN_ADAPTATIONS: &[(&str, &str)] = &[
    ("Access_Virus_B", include_str!("access_virus_b.yaml")),
    ("Korg_MS2000", include_str!("korg_ms2000.yaml")),
    ("Roland_MKS80", include_str!("roland_mks80.yaml")),
];

/// Source of a built-in adaptation by module name
pub fn builtin_source(module_name: &str) -> Option<&'static str> {
    BUILTIN_ADAPTATIONS
        .iter()
        .find(|(name, _)| *name == module_name)
        .map(|(_, source)| *source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{AdaptationModule, EntryPoint, ModuleOrigin};
    use patchbay_core::legacy::mks80;
    use patchbay_core::{MidiChannel, MidiMessage, ProgramNumber};
    use std::collections::BTreeSet;

    fn builtin(module_name: &str) -> AdaptationModule {
        let source = builtin_source(module_name).unwrap();
        AdaptationModule::parse(module_name, ModuleOrigin::Embedded, source).unwrap()
    }

    /// A single dump as a Virus B sends it
    fn virus_dump(bank: u8, program: u8, name: &[u8; 10]) -> Vec<u8> {
        let mut data = vec![0xF0, 0x00, 0x20, 0x33, 0x01, 0x10, 0x10, bank, program];
        let mut params: Vec<u8> = (0..256u32).map(|i| (i % 0x60) as u8).collect();
        params[240..250].copy_from_slice(name);
        params[251] = 3;
        params[252] = 0;
        data.extend_from_slice(&params);
        let sum: u32 = data[5..].iter().map(|&b| u32::from(b)).sum();
        data.push((sum & 0x7F) as u8);
        data.push(0xF7);
        data
    }

    fn virus_checksum_ok(message: &[u8]) -> bool {
        let sum: u32 = message[5..265].iter().map(|&b| u32::from(b)).sum();
        message[265] == (sum & 0x7F) as u8
    }

    #[test]
    fn test_all_builtins_load() {
        for (module_name, source) in BUILTIN_ADAPTATIONS {
            let module = AdaptationModule::parse(module_name, ModuleOrigin::Embedded, source)
                .unwrap_or_else(|e| panic!("{}: {}", module_name, e));
            assert!(module.has_entry(EntryPoint::NumberOfBanks));
            assert!(module.has_entry(EntryPoint::IsEditBufferDump));
        }
        assert!(builtin_source("Unknown").is_none());
    }

    #[test]
    fn test_virus_program_dump_round_trip() {
        let module = builtin("Access_Virus_B");
        assert_eq!(module.name(), "Access Virus B");

        for program in [0u8, 17, 127] {
            let response = MidiMessage::new(virus_dump(0x02, program, b"Wobble Bas"));
            assert_eq!(response.len(), 267);
            assert!(module.is_single_program_dump(&response).unwrap());

            let place = module.number_from_dump(&response).unwrap();
            assert_eq!(place, ProgramNumber::new(1, u32::from(program)));

            let sent = module
                .convert_to_program_dump(MidiChannel::default(), response.as_bytes(), place)
                .unwrap();
            assert_eq!(sent.len(), 1);
            assert!(module.is_single_program_dump(&sent[0]).unwrap());
            assert_eq!(module.number_from_dump(&sent[0]).unwrap(), place);
            assert!(virus_checksum_ok(sent[0].as_bytes()));
        }
    }

    #[test]
    fn test_virus_edit_buffer_is_not_a_program_dump() {
        let module = builtin("Access_Virus_B");
        let edit_buffer = MidiMessage::new(virus_dump(0x00, 0x40, b"Current   "));

        assert!(module.is_edit_buffer_dump(&edit_buffer).unwrap());
        assert!(!module.is_single_program_dump(&edit_buffer).unwrap());
        assert!(module.number_from_dump(&edit_buffer).is_err());
    }

    #[test]
    fn test_virus_request_addresses_bank() {
        let module = builtin("Access_Virus_B");
        let request = module
            .create_program_dump_request(MidiChannel::default(), ProgramNumber::new(0, 5))
            .unwrap();
        assert_eq!(
            request[0].as_bytes(),
            &[0xF0, 0x00, 0x20, 0x33, 0x01, 0x10, 0x30, 0x01, 0x05, 0xF7]
        );
    }

    #[test]
    fn test_virus_name_tags_and_fingerprint() {
        let module = builtin("Access_Virus_B");
        let data = virus_dump(0x01, 3, b"Hoover    ");

        assert_eq!(module.name_from_dump(&data).unwrap(), "Hoover");
        assert_eq!(
            module.tags_from_dump(&data).unwrap(),
            BTreeSet::from(["Pad".to_string()])
        );

        let renamed = module.rename_patch(&data, "Screamer").unwrap();
        assert!(virus_checksum_ok(&renamed));
        assert_eq!(
            module.calculate_fingerprint(&renamed).unwrap(),
            module.calculate_fingerprint(&data).unwrap()
        );

        let tagged = module
            .set_tags(&data, &BTreeSet::from(["Lead".to_string(), "Acid".to_string()]))
            .unwrap();
        assert!(virus_checksum_ok(&tagged));
        assert_eq!(&tagged[260..262], &[6, 1]);

        let moved = virus_dump(0x04, 99, b"Hoover    ");
        assert_eq!(
            module.calculate_fingerprint(&moved).unwrap(),
            module.calculate_fingerprint(&data).unwrap()
        );
    }

    #[test]
    fn test_ms2000_is_edit_buffer_only() {
        let module = builtin("Korg_MS2000");
        assert!(!module.has_entry(EntryPoint::IsSingleProgramDump));
        assert!(module.has_entry(EntryPoint::MessageThrottle));

        let channel = MidiChannel::from_zero_based(2).unwrap();
        let request = module.create_edit_buffer_request(channel).unwrap();
        assert_eq!(request[0].as_bytes(), &[0xF0, 0x42, 0x32, 0x58, 0x10, 0xF7]);

        let dump = vec![0xF0, 0x42, 0x30, 0x58, 0x40, 0x01, 0x02, 0xF7];
        let sent = module.convert_to_edit_buffer(channel, &dump).unwrap();
        assert_eq!(sent[0].as_bytes()[2], 0x32);
        assert!(module.is_edit_buffer_dump(&sent[0]).unwrap());
    }

    #[test]
    fn test_mks80_accepts_legacy_records() {
        let module = builtin("Roland_MKS80");
        let patch = vec![0x11; mks80::PATCH_BLOCK_SIZE];
        let tone = vec![0x22; mks80::TONE_BLOCK_SIZE];
        let records = mks80::patches_from_aprs(&[tone], &[patch]);
        let record = &records[0];

        assert_eq!(module.name(), mks80::DEVICE_NAME);
        for message in record.messages() {
            assert!(module.is_edit_buffer_dump(&message).unwrap());
        }

        let channel = MidiChannel::from_zero_based(9).unwrap();
        let sent = module.convert_to_edit_buffer(channel, record.data()).unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.as_bytes()[3] == 0x09));

        let resent: Vec<u8> = sent.into_iter().flat_map(|m| m.into_bytes()).collect();
        assert_eq!(
            module.calculate_fingerprint(&resent).unwrap(),
            module.calculate_fingerprint(record.data()).unwrap()
        );
    }
}
