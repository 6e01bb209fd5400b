mod common;

use std::io::Cursor;

use fluxrescue::{
    file_parsers::scp::{ScpDisk, ScpFormat},
    FluxCapture,
    NATIVE_SAMPLE_HZ,
};

use common::init;

/// The capture from the byte-exact round-trip scenario: 2T/3T/4T intervals
/// at 72MHz over two index-delimited revolutions.
fn e3_capture() -> FluxCapture {
    let intervals: Vec<i64> = [288i64, 432, 576, 288, 288].repeat(20_000);
    FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[0, 50_000, 100_000]).unwrap()
}

#[test]
fn test_scp_round_trip_is_exact() {
    init();
    let capture = e3_capture();

    let mut disk = ScpDisk::new();
    disk.set_track(0, capture.clone());

    let mut buffer = Vec::new();
    ScpFormat::save(&disk, &mut buffer).unwrap();

    let reloaded = ScpFormat::load(Cursor::new(buffer)).unwrap();
    let track = reloaded.track(0).expect("track 0 present");

    assert_eq!(track, &capture, "SCP round trip must preserve ticks and index positions");
}

#[test]
fn test_scp_header_checksum_matches_independent_sum() {
    init();
    let mut disk = ScpDisk::new();
    disk.set_track(0, e3_capture());

    let mut buffer = Vec::new();
    ScpFormat::save(&disk, &mut buffer).unwrap();

    let stored = u32::from_le_bytes([buffer[0x0C], buffer[0x0D], buffer[0x0E], buffer[0x0F]]);
    let computed = buffer[0x10..].iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32));
    assert_eq!(stored, computed);
}

#[test]
fn test_scp_detect() {
    init();
    let mut disk = ScpDisk::new();
    disk.set_track(4, e3_capture());

    let mut buffer = Vec::new();
    ScpFormat::save(&disk, &mut buffer).unwrap();

    assert!(ScpFormat::detect(Cursor::new(buffer)));
    assert!(!ScpFormat::detect(Cursor::new(vec![0u8; 64])));
}

#[test]
fn test_scp_long_interval_extension() {
    init();
    // An interval beyond the 16-bit word range must survive via the
    // zero-word + 32-bit extension encoding. 180_000 engine ticks is
    // 100_000 SCP ticks.
    let intervals: Vec<i64> = vec![288, 180_000, 288, 288];
    let capture = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[0, 4]).unwrap();

    let mut disk = ScpDisk::new();
    disk.set_track(0, capture.clone());

    let mut buffer = Vec::new();
    ScpFormat::save(&disk, &mut buffer).unwrap();
    let reloaded = ScpFormat::load(Cursor::new(buffer)).unwrap();

    assert_eq!(reloaded.track(0).unwrap(), &capture);
}

#[test]
fn test_corrupted_checksum_is_rejected() {
    init();
    let mut disk = ScpDisk::new();
    disk.set_track(0, e3_capture());

    let mut buffer = Vec::new();
    ScpFormat::save(&disk, &mut buffer).unwrap();
    // Damage one flux byte past the header.
    let len = buffer.len();
    buffer[len - 3] ^= 0xFF;

    assert!(ScpFormat::load(Cursor::new(buffer)).is_err());
}
