mod common;

use std::io::Cursor;

use fluxrescue::{
    codec::TrackCodec,
    file_parsers::hfe::{HfeDisk, HfeFormat},
    BitStream,
    DiskCh,
    DiskChs,
    SectorStatus,
    TrackEncoding,
};

use common::*;

/// Full pipeline: encode a sector table to track bitstreams, container them
/// as HFE, reload, and decode the bits back into identical sectors.
#[test]
fn test_hfe_container_preserves_bitstreams() {
    init();
    let geometry = dd_geometry();
    let table = pattern_table(geometry);
    let codec = TrackCodec::new(TrackEncoding::Mfm);

    let mut disk = HfeDisk::new(
        TrackEncoding::Mfm,
        (geometry.data_rate.bps() / 1000) as u16,
        geometry.rpm.rpm() as u16,
        geometry.heads,
    );

    for c in 0..geometry.cylinders {
        let mut sides = Vec::new();
        for h in 0..geometry.heads {
            let sectors: Vec<_> = (1..=geometry.sectors_per_track)
                .map(|s| table.get_chs(DiskChs::new(c, h, s)).unwrap().clone())
                .collect();
            let bits = codec.encode_track(&sectors, &geometry, DiskCh::new(c, h)).unwrap();
            sides.push(bits.to_bytes());
        }
        disk.tracks.push((sides[0].clone(), sides[1].clone()));
    }

    let mut buffer = Vec::new();
    HfeFormat::save(&disk, &mut buffer).unwrap();
    let reloaded = HfeFormat::load(Cursor::new(buffer)).unwrap();

    assert_eq!(reloaded.encoding, TrackEncoding::Mfm);
    assert_eq!(reloaded.bit_rate_kbps, 250);
    assert_eq!(reloaded.cylinders(), geometry.cylinders as usize);

    for (c, (side0, side1)) in reloaded.tracks.iter().enumerate() {
        for (h, side) in [side0, side1].into_iter().enumerate() {
            let ch = DiskCh::new(c as u16, h as u8);
            let decoded = codec
                .decode_track(&BitStream::from(side.as_slice()), &geometry, ch)
                .unwrap();
            assert_eq!(decoded.len(), geometry.sectors_per_track as usize, "{}", ch);
            for sector in decoded {
                assert_eq!(sector.status, SectorStatus::Good, "{}", sector.id);
                let linear = geometry.linear(sector.chs()).unwrap();
                let expected = (linear % 256) as u8;
                assert!(sector.payload.unwrap().iter().all(|b| *b == expected), "{}", sector.id);
            }
        }
    }
}

#[test]
fn test_hfe_detect() {
    init();
    let mut disk = HfeDisk::new(TrackEncoding::Fm, 125, 300, 1);
    disk.tracks.push((vec![0xAA; 3125], vec![0u8; 3125]));

    let mut buffer = Vec::new();
    HfeFormat::save(&disk, &mut buffer).unwrap();
    assert!(HfeFormat::detect(Cursor::new(buffer)));
    assert!(!HfeFormat::detect(Cursor::new(vec![0u8; 1024])));
}
