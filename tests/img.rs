mod common;

use std::io::Cursor;

use fluxrescue::{
    file_parsers::raw::{FillPolicy, RawFormat},
    ImageError,
    SectorStatus,
};

use common::*;

/// Property: the serialized image length is exactly
/// `total_sectors × sector_size`.
#[test]
fn test_img_size_law() {
    init();
    for geometry in [dd_geometry(), hd_geometry()] {
        let table = pattern_table(geometry);
        let mut buffer = Cursor::new(Vec::new());
        RawFormat::save_image(&table, &mut buffer, None).unwrap();
        assert_eq!(buffer.get_ref().len(), geometry.total_bytes());
    }
}

#[test]
fn test_img_round_trip_bit_exact() {
    init();
    let table = pattern_table(hd_geometry());
    let mut buffer = Cursor::new(Vec::new());
    RawFormat::save_image(&table, &mut buffer, None).unwrap();

    let reloaded = RawFormat::load_image(Cursor::new(buffer.into_inner())).unwrap();
    assert_eq!(reloaded.geometry(), table.geometry());
    assert_pattern_payloads(&reloaded);
}

#[test]
fn test_img_geometry_inference() {
    init();
    // 1.44M image infers (80, 2, 18, 512).
    let reloaded = RawFormat::load_image(Cursor::new(vec![0u8; 1_474_560])).unwrap();
    let geometry = reloaded.geometry();
    assert_eq!(geometry.cylinders, 80);
    assert_eq!(geometry.heads, 2);
    assert_eq!(geometry.sectors_per_track, 18);
    assert_eq!(geometry.sector_size, 512);
}

#[test]
fn test_img_unknown_size_fails_without_guessing() {
    init();
    assert!(matches!(
        RawFormat::load_image(Cursor::new(vec![0u8; 1_000_000])),
        Err(ImageError::UnknownGeometry)
    ));
}

#[test]
fn test_img_fill_policies() {
    init();
    let mut table = pattern_table(dd_geometry());
    table.update(7, |s| s.status = SectorStatus::Bad);
    table.update(8, |s| {
        s.status = SectorStatus::Missing;
        s.payload = None;
    });

    assert!(matches!(
        RawFormat::save_image(&table, &mut Cursor::new(Vec::new()), None),
        Err(ImageError::MissingSectors)
    ));

    for (policy, byte) in [
        (FillPolicy::Zero, 0x00),
        (FillPolicy::DosE5, 0xE5),
        (FillPolicy::Custom(0x5A), 0x5A),
    ] {
        let mut buffer = Cursor::new(Vec::new());
        RawFormat::save_image(&table, &mut buffer, Some(policy)).unwrap();
        let data = buffer.into_inner();
        assert!(data[7 * 512..8 * 512].iter().all(|b| *b == byte));
        assert!(data[8 * 512..9 * 512].iter().all(|b| *b == byte));
        // Readable sectors are untouched by the fill.
        assert!(data[0..512].iter().all(|b| *b == 0));
        assert!(data[9 * 512..10 * 512].iter().all(|b| *b == 9));
    }
}
