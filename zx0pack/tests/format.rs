//! Exact wire-format tests.

mod common;

use common::{EMPTY_STREAM_CLASSIC, EMPTY_STREAM_V2, decompress};
use zx0pack::{Zx0Config, compress, compress_with, max_compressed_size};

#[test]
fn test_empty_stream_bytes() {
    // Token bit '1' followed by elias(256): eight (0, mantissa) pairs and a
    // terminating 1. V2 complements the mantissa bits.
    assert_eq!(compress(b"").unwrap(), EMPTY_STREAM_V2);
    assert_eq!(
        compress_with(b"", Zx0Config::CLASSIC).unwrap(),
        EMPTY_STREAM_CLASSIC
    );
}

#[test]
fn test_single_literal_stream_bytes() {
    // elias(1) run length with no leading token, the literal byte, then the
    // end-of-data sentinel.
    assert_eq!(compress(b"A").unwrap(), vec![0xD5, 0x41, 0x55, 0x60]);
    assert_eq!(
        compress_with(b"A", Zx0Config::CLASSIC).unwrap(),
        vec![0xC0, 0x41, 0x00, 0x20]
    );
}

#[test]
fn test_variants_share_length_codes() {
    // Inversion applies to offset Elias codes and the sentinel, never to
    // length codes, so both variants of a literal-only stream differ only
    // in the sentinel's mantissa bits.
    let input: Vec<u8> = (0..50).map(|i| (i * 7 + 3) as u8).collect();
    let v2 = compress(&input).unwrap();
    let classic = compress_with(&input, Zx0Config::CLASSIC).unwrap();
    assert_eq!(v2.len(), classic.len());
    assert_ne!(v2, classic);
    assert_eq!(decompress(&v2, true).unwrap().0, input);
    assert_eq!(decompress(&classic, false).unwrap().0, input);
}

#[test]
fn test_offset_byte_encoding() {
    // Drive a match at a known offset through the stream; the reference
    // decoder recovers it with the documented formula
    // offset = high * 128 - (byte >> 1), exercising both Elias boundaries
    // of the high part and the raw low byte.
    for offset in [4usize, 127, 128, 129, 255, 256, 1000, 32640] {
        let marker = [0xA0u8, 0xA7, 0xB3, 0xC9];
        let mut data = marker.to_vec();
        data.extend(std::iter::repeat_n(0x11u8, offset - marker.len()));
        data.extend_from_slice(&marker);

        let packed = compress(&data).unwrap();
        let (unpacked, cmds) = decompress(&packed, true).unwrap();
        assert_eq!(unpacked, data, "offset {} failed", offset);
        assert!(
            cmds.iter()
                .any(|c| matches!(c, common::Cmd::Match { offset: o, .. } if *o == offset)),
            "no match at offset {} in {:?}",
            offset,
            cmds
        );
    }
}

#[test]
fn test_max_compressed_size_formula() {
    assert_eq!(max_compressed_size(0), 128);
    assert_eq!(max_compressed_size(1), 129);
    assert_eq!(max_compressed_size(65_536), 128 + 65_536);
    assert_eq!(max_compressed_size(65_537), 256 + 65_537);
}

#[test]
fn test_streams_are_deterministic() {
    let input = b"determinism determinism determinism".repeat(10);
    assert_eq!(compress(&input).unwrap(), compress(&input).unwrap());
}
