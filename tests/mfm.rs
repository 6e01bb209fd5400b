mod common;

use fluxrescue::{
    codec::TrackCodec,
    random::XorShift,
    util::crc_ibm_3740,
    DiskCh,
    DiskChs,
    SectorStatus,
    TrackEncoding,
};

use common::*;

/// Bitwise reference CRC, written independently of the library routine.
fn reference_crc(data: &[u8]) -> u16 {
    let mut crc: u32 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u32) << 8;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x1_0000 != 0 {
                crc ^= 0x1021;
            }
            crc &= 0xFFFF;
        }
    }
    crc as u16
}

#[test]
fn test_crc_against_reference() {
    init();
    let mut rng = XorShift::new(0xC0FFEE);
    for _ in 0..100 {
        let payload: Vec<u8> = (0..512).map(|_| (rng.next_u64() & 0xFF) as u8).collect();
        assert_eq!(crc_ibm_3740(&payload, None), reference_crc(&payload));
    }
}

/// Property: for a table whose sectors are all Good,
/// decode(encode(table)) == table bitwise.
#[test]
fn test_mfm_codec_round_trip() {
    init();
    let geometry = dd_geometry();
    let table = pattern_table(geometry);
    let codec = TrackCodec::new(TrackEncoding::Mfm);

    for c in 0..geometry.cylinders {
        for h in 0..geometry.heads {
            let ch = DiskCh::new(c, h);
            let sectors: Vec<_> = (1..=geometry.sectors_per_track)
                .map(|s| table.get_chs(DiskChs::new(c, h, s)).unwrap().clone())
                .collect();

            let bits = codec.encode_track(&sectors, &geometry, ch).unwrap();
            let decoded = codec.decode_track(&bits, &geometry, ch).unwrap();

            assert_eq!(decoded.len(), sectors.len(), "{}", ch);
            for (original, decoded) in sectors.iter().zip(decoded.iter()) {
                assert_eq!(decoded.status, SectorStatus::Good, "{}", original.id);
                assert_eq!(decoded.id, original.id);
                assert_eq!(decoded.payload, original.payload, "{}", original.id);
            }
        }
    }
}

#[test]
fn test_fm_codec_round_trip() {
    init();
    // BBC DFS-style geometry: 10 sectors of 256 bytes, single density.
    let geometry = fluxrescue::DiskGeometry::new(
        40,
        1,
        10,
        256,
        fluxrescue::DiskRpm::Rpm300,
        fluxrescue::DiskDataRate::Rate125Kbps,
    )
    .unwrap();
    let table = pattern_table(geometry);
    let codec = TrackCodec::new(TrackEncoding::Fm);

    for c in 0..geometry.cylinders {
        let ch = DiskCh::new(c, 0);
        let sectors: Vec<_> = (1..=geometry.sectors_per_track)
            .map(|s| table.get_chs(DiskChs::new(c, 0, s)).unwrap().clone())
            .collect();

        let bits = codec.encode_track(&sectors, &geometry, ch).unwrap();
        let decoded = codec.decode_track(&bits, &geometry, ch).unwrap();

        assert_eq!(decoded.len(), sectors.len(), "{}", ch);
        for (original, decoded) in sectors.iter().zip(decoded.iter()) {
            assert_eq!(decoded.status, SectorStatus::Good, "{}", original.id);
            assert_eq!(decoded.payload, original.payload, "{}", original.id);
        }
    }
}

#[test]
fn test_deleted_data_mark_round_trip() {
    init();
    let geometry = dd_geometry();
    let table = pattern_table(geometry);
    let codec = TrackCodec::new(TrackEncoding::Mfm);
    let ch = DiskCh::new(0, 0);

    let mut sectors: Vec<_> = (1..=geometry.sectors_per_track)
        .map(|s| table.get_chs(DiskChs::new(0, 0, s)).unwrap().clone())
        .collect();
    sectors[4].status = SectorStatus::Deleted;

    let bits = codec.encode_track(&sectors, &geometry, ch).unwrap();
    let decoded = codec.decode_track(&bits, &geometry, ch).unwrap();

    assert_eq!(decoded[4].status, SectorStatus::Deleted);
    assert_eq!(decoded[4].payload, sectors[4].payload);
    assert!(decoded.iter().enumerate().all(|(i, s)| i == 4 || s.status == SectorStatus::Good));
}

#[test]
fn test_corrupt_data_field_is_bad_not_fatal() {
    init();
    let geometry = dd_geometry();
    let table = pattern_table(geometry);
    let codec = TrackCodec::new(TrackEncoding::Mfm);
    let ch = DiskCh::new(0, 0);

    let sectors: Vec<_> = (1..=geometry.sectors_per_track)
        .map(|s| table.get_chs(DiskChs::new(0, 0, s)).unwrap().clone())
        .collect();
    let bits = codec.encode_track(&sectors, &geometry, ch).unwrap();

    // Flip a run of data cells mid-track; exactly one sector degrades, the
    // track keeps decoding.
    let mut cells = bits.bits().clone();
    let target = cells.len() / 2;
    for i in target..target + 4 {
        let bit = cells[i];
        cells.set(i, !bit);
    }
    let corrupted = fluxrescue::BitStream::from_bits(cells);

    let decoded = codec.decode_track(&corrupted, &geometry, ch).unwrap();
    let bad = decoded.iter().filter(|s| s.status == SectorStatus::Bad).count();
    let good = decoded.iter().filter(|s| s.status == SectorStatus::Good).count();
    assert!(bad >= 1, "corruption must surface as a Bad sector");
    assert!(good >= geometry.sectors_per_track as usize - 2);
}
