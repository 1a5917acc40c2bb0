//! Provisioning and NDEF read/write against simulated cards

use std::sync::Arc;

use mifare_core::{
    driver::{Aid, codes},
    prelude::*,
    sim::{SimCard, SimField, SimOp, SimTransport},
};

fn arrive(sim: &SimCard) -> (Arc<ReaderHandle<SimTransport>>, DesfireCard<SimTransport>) {
    let field = SimField::new();
    field.insert(sim);
    let reader = ReaderHandle::new(SimTransport::new("sim0", field), MifareConfig::default());
    reader.open().unwrap();
    let card = reader.tick().into_iter().find_map(PresenceEvent::into_card).unwrap();
    (reader, card)
}

fn provisioned(sim: &SimCard) -> DesfireCard<SimTransport> {
    let (_reader, card) = arrive(sim);
    card.format(FormatOptions::default()).unwrap();
    card.create_ndef().unwrap();
    card
}

#[test]
fn format_create_write_read() {
    let sim = SimCard::desfire("04a1b2c3d4e5f6");
    let (reader, card) = arrive(&sim);

    card.format(FormatOptions::default()).unwrap();
    assert_eq!(card.create_ndef().unwrap(), MappingVersion::V2);
    assert_eq!(card.write_ndef(b"hello").unwrap(), 0x1000);

    let message = card.read_ndef().unwrap();
    assert_eq!(message.payload, b"hello");
    assert_eq!(message.max_length, 0x1000);

    assert_eq!(sim.applications(), vec![Aid::NDEF_V2]);
    let ndef = sim.file_contents(Aid::NDEF_V2, 2).unwrap();
    assert_eq!(&ndef[..7], &[0x00, 0x05, b'h', b'e', b'l', b'l', b'o']);
    assert!(!sim.is_connected());
    assert!(!reader.is_busy());
}

#[test]
fn capability_container_v2_layout() {
    let sim = SimCard::desfire_with_version("04a1b2c3d4e5f7", 1, 0x1A);
    provisioned(&sim);

    let cc = sim.file_contents(Aid::NDEF_V2, 1).unwrap();
    assert_eq!(cc, vec![
        0x00, 0x0F, 0x20, 0x00, 0x3B, 0x00, 0x34, 0x04, 0x06, 0xE1, 0x04, 0x1E, 0x00, 0x00, 0x00
    ]);
    assert_eq!(sim.file_contents(Aid::NDEF_V2, 2).unwrap().len(), 0x1E00);
}

#[test]
fn legacy_mapping_v1() {
    let sim = SimCard::desfire_with_version("04a1b2c3d4e5f8", 0, 0x18);
    let (_reader, card) = arrive(&sim);

    card.format(FormatOptions::default()).unwrap();
    assert_eq!(card.create_ndef().unwrap(), MappingVersion::V1);
    assert_eq!(sim.picc_key_settings(), 0x09);
    assert_eq!(sim.applications(), vec![Aid::NDEF_V1]);
    assert_eq!(sim.file_contents(Aid::NDEF_V1, 3).unwrap(), vec![
        0x00, 0x0F, 0x10, 0x00, 0x3B, 0x00, 0x34, 0x04, 0x06, 0xE1, 0x04, 0x0E, 0xE0, 0x00, 0x00
    ]);

    card.write_ndef(&[0xD1, 0x01, 0x01, 0x54]).unwrap();
    let message = card.read_ndef().unwrap();
    assert_eq!(message.payload, vec![0xD1, 0x01, 0x01, 0x54]);
    assert_eq!(message.max_length, 0x0EE0);
}

#[test]
fn create_ndef_twice_fails_at_create_application() {
    let sim = SimCard::desfire("04a1b2c3d4e5f9");
    let card = provisioned(&sim);

    let err = card.create_ndef().unwrap_err();
    assert_eq!(err.code(), 0x12314);
    assert_eq!(err.driver_error(), Some(codes::DUPLICATE_ERROR));
}

#[test]
fn iso_layout_failures_report_their_own_codes() {
    let cases = [
        (SimOp::CreateStdDataFile, 0, 0x12316),
        (SimOp::WriteData, 0, 0x12317),
        (SimOp::CreateStdDataFile, 1, 0x12318),
    ];
    for (i, (op, skip, code)) in cases.into_iter().enumerate() {
        let sim = SimCard::desfire(&format!("04a1b2c3d4e61{i}"));
        let (_reader, card) = arrive(&sim);
        card.format(FormatOptions::default()).unwrap();

        sim.inject_fault_after(op, skip, codes::PERMISSION_DENIED, 1);
        let err = card.create_ndef().unwrap_err();
        assert_eq!(err.code(), code, "{op:?} after {skip}");
        assert_eq!(err.driver_error(), Some(codes::PERMISSION_DENIED));
    }
}

#[test]
fn legacy_layout_failures_keep_their_codes() {
    let sim = SimCard::desfire_with_version("04a1b2c3d4e620", 0, 0x18);
    let (_reader, card) = arrive(&sim);
    card.format(FormatOptions::default()).unwrap();

    sim.inject_fault(SimOp::CreateStdDataFile, codes::PERMISSION_DENIED, 1);
    assert_eq!(card.create_ndef().unwrap_err().code(), 0x12315);
}

#[test]
fn read_before_any_write_reports_zero_length() {
    let sim = SimCard::desfire("04a1b2c3d4e5fa");
    let card = provisioned(&sim);

    let err = card.read_ndef().unwrap_err();
    assert!(matches!(err, Error::ZeroLength));
    assert_eq!(err.code(), 0x12332);
}

#[test]
fn declared_length_beyond_capacity() {
    let sim = SimCard::desfire("04a1b2c3d4e5fb");
    let card = provisioned(&sim);

    // 0x0FFF + 2 exceeds the 0x1000 capacity
    assert!(sim.poke(Aid::NDEF_V2, 2, 0, &[0x0F, 0xFF]));
    let err = card.read_ndef().unwrap_err();
    assert!(matches!(err, Error::DeclaredTooLarge { declared: 0x0FFF, max_length: 0x1000 }));

    assert!(sim.poke(Aid::NDEF_V2, 2, 0, &[0x0F, 0xFE]));
    assert_eq!(card.read_ndef().unwrap().payload.len(), 0x0FFE);
}

#[test]
fn payload_larger_than_capacity_is_rejected() {
    let sim = SimCard::desfire("04a1b2c3d4e5fc");
    let card = provisioned(&sim);
    let writes = sim.journal().len();

    let err = card.write_ndef(&vec![0xAA; 0x1001]).unwrap_err();
    assert!(matches!(err, Error::TooLarge { len: 0x1001, max_length: 0x1000 }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(sim.journal().len(), writes);
}

#[test]
fn payload_filling_the_file_round_trips() {
    let sim = SimCard::desfire("04a1b2c3d4e604");
    let card = provisioned(&sim);

    let payload: Vec<u8> = (0..0x0FFE).map(|i| i as u8).collect();
    assert_eq!(card.write_ndef(&payload).unwrap(), 0x1000);
    assert_eq!(card.read_ndef().unwrap().payload, payload);
}

#[test]
fn payload_without_room_for_length_keeps_previous_message() {
    let sim = SimCard::desfire("04a1b2c3d4e605");
    let card = provisioned(&sim);
    card.write_ndef(b"keep me").unwrap();
    let writes = sim.calls(SimOp::WriteData);

    for len in [0x0FFF, 0x1000] {
        let err = card.write_ndef(&vec![0u8; len]).unwrap_err();
        assert!(matches!(err, Error::TooLarge { max_length: 0x1000, .. }));
        assert_eq!(err.code(), 0x12327);
    }
    assert_eq!(sim.calls(SimOp::WriteData), writes);
    assert_eq!(card.read_ndef().unwrap().payload, b"keep me");
}

#[test]
fn length_is_cleared_first_and_set_last() {
    let sim = SimCard::desfire("04a1b2c3d4e5fd");
    let card = provisioned(&sim);
    let before = sim.journal().len();

    card.write_ndef(b"abc").unwrap();
    let writes: Vec<_> = sim.journal().into_iter().skip(before).collect();
    assert_eq!(writes.len(), 3);
    assert_eq!((writes[0].offset, writes[0].data.as_slice()), (0, &[0u8, 0][..]));
    assert_eq!((writes[1].offset, writes[1].data.as_slice()), (2, &b"abc"[..]));
    assert_eq!((writes[2].offset, writes[2].data.as_slice()), (0, &[0u8, 3][..]));
}

#[test]
fn interrupted_write_leaves_zero_length() {
    let sim = SimCard::desfire("04a1b2c3d4e5fe");
    let card = provisioned(&sim);
    card.write_ndef(b"first").unwrap();

    // clear and payload go through, the final length write fails
    sim.inject_fault_after(SimOp::WriteData, 2, codes::BOUNDARY_ERROR, 1);
    let err = card.write_ndef(b"second").unwrap_err();
    assert_eq!(err.code(), 0x12331);

    assert!(matches!(card.read_ndef(), Err(Error::ZeroLength)));
}

#[test]
fn rewrite_with_same_payload_is_stable() {
    let sim = SimCard::desfire("04a1b2c3d4e5ff");
    let card = provisioned(&sim);

    card.write_ndef(b"same").unwrap();
    let first = sim.file_contents(Aid::NDEF_V2, 2).unwrap();
    card.write_ndef(b"same").unwrap();
    assert_eq!(sim.file_contents(Aid::NDEF_V2, 2).unwrap(), first);
    assert_eq!(card.read_ndef().unwrap().payload, b"same");
}

#[test]
fn transient_failures_are_retried() {
    let sim = SimCard::desfire("04a1b2c3d4e600");
    let card = provisioned(&sim);
    card.write_ndef(b"retry").unwrap();

    sim.inject_fault(SimOp::GetVersion, codes::ILLEGAL_COMMAND_CODE, 2);
    assert_eq!(card.read_ndef().unwrap().payload, b"retry");

    let calls = sim.calls(SimOp::GetVersion);
    sim.inject_fault(SimOp::GetVersion, codes::SCARD_E_NOT_READY, 3);
    let err = card.read_ndef().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DriverTransient);
    assert_eq!(err.code(), 0x12304);
    assert_eq!(sim.calls(SimOp::GetVersion) - calls, 3);
}

#[test]
fn format_with_wrong_master_key_fails() {
    let sim = SimCard::desfire("04a1b2c3d4e601");
    sim.set_key(&[0x11; 8]);
    let (_reader, card) = arrive(&sim);

    let err = card.format(FormatOptions::default()).unwrap_err();
    assert_eq!(err.code(), 0x12310);
    assert_eq!(err.kind(), ErrorKind::DriverFatal);
    assert_eq!(sim.calls(SimOp::Authenticate), 1);
}

#[test]
fn read_without_ndef_application() {
    let sim = SimCard::desfire("04a1b2c3d4e602");
    let (_reader, card) = arrive(&sim);

    let err = card.read_ndef().unwrap_err();
    assert_eq!(err.code(), 0x12313);
    assert_eq!(err.driver_error(), Some(codes::APPLICATION_NOT_FOUND));
}

#[test]
fn error_report_serializes() {
    let sim = SimCard::desfire("04a1b2c3d4e603");
    let card = provisioned(&sim);

    let report = card.read_ndef().unwrap_err().report();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["code"], 0x12332);
    assert_eq!(json["kind"], "protocol_malformed");

    let info = serde_json::to_value(card.info().unwrap()).unwrap();
    assert_eq!(info["uid"], "04a1b2c3d4e603");
    assert_eq!(info["software"]["versionMajor"], 1);
}
