//! End-to-end integration tests for lzpipe.
//!
//! Streams are produced by reference encoders (flate2, libdeflater, zstd,
//! lz4_flex) or built by hand (Snappy) and decompressed through every path.

use std::io::Write;
use std::process::Command;

use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;
use proptest::prelude::*;

use lzpipe::bits::BitReader;
use lzpipe::checksum::{crc32c, mask_crc32c};
use lzpipe::fse::FseTable;
use lzpipe::huffman::tables::canonical_codes;
use lzpipe::huffman::HuffmanDecoder;
use lzpipe::source::{MemberInfo, Trailer};
use lzpipe::{
    decompress, decompress_with, BatchDecompressor, Codec, DecompressConfig, Error, MatchEngine,
    ParallelBytes, Token, TokenBlock,
};

const ALL_WIDTHS: [ParallelBytes; 4] =
    [ParallelBytes::One, ParallelBytes::Four, ParallelBytes::Eight, ParallelBytes::Sixteen];

// ============================================================================
// Test Data Generators
// ============================================================================

/// Generate random data using a simple PRNG
fn generate_random_data(size: usize, seed: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        // Simple xorshift PRNG
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        data.push((state & 0xFF) as u8);
    }
    data
}

/// Generate highly repetitive data (good compression, short offsets)
fn generate_repetitive_data(size: usize) -> Vec<u8> {
    let pattern = b"AAAAAAAAAAAAAAAB";
    pattern.iter().cycle().take(size).copied().collect()
}

/// Generate data with mixed patterns (moderate compression)
fn generate_mixed_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let patterns = [
        b"ACGTACGTACGTACGT".as_slice(),
        b"NNNNNNNNNNNNNNNN".as_slice(),
        b"ATATATATATATATAT".as_slice(),
        b"the quick brown fox jumps".as_slice(),
    ];

    let mut pattern_idx = 0;
    let noise = generate_random_data(size / 8 + 1, 99);
    while data.len() < size {
        let pattern = patterns[pattern_idx % patterns.len()];
        let remaining = size - data.len();
        let chunk_size = remaining.min(pattern.len());
        data.extend_from_slice(&pattern[..chunk_size]);
        if data.len() < size && pattern_idx % 5 == 0 {
            data.push(noise[pattern_idx % noise.len()]);
        }
        pattern_idx += 1;
    }
    data
}

/// Generate FASTQ-formatted data
fn generate_fastq_data(num_reads: usize, read_length: usize) -> Vec<u8> {
    let mut data = Vec::new();
    let bases = [b'A', b'C', b'G', b'T'];

    for i in 0..num_reads {
        writeln!(data, "@read_{}", i).unwrap();
        for j in 0..read_length {
            data.push(bases[(i * 7 + j * j) % 4]);
        }
        data.push(b'\n');
        data.extend_from_slice(b"+\n");
        data.resize(data.len() + read_length, b'I');
        data.push(b'\n');
    }
    data
}

fn corpus() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("empty", Vec::new()),
        ("single byte", vec![b'x']),
        ("random", generate_random_data(70_000, 12345)),
        ("repetitive", generate_repetitive_data(200_000)),
        ("mixed", generate_mixed_data(150_000)),
        ("fastq", generate_fastq_data(500, 100)),
    ]
}

// ============================================================================
// Encoders
// ============================================================================

fn gzip(data: &[u8], level: Compression) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), level);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn raw_deflate(data: &[u8], level: Compression) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), level);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn zstd_frame(data: &[u8], level: i32, checksum: bool) -> Vec<u8> {
    let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), level).unwrap();
    encoder.include_checksum(checksum).unwrap();
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn lz4_frame(data: &[u8], info: lz4_flex::frame::FrameInfo) -> Vec<u8> {
    let mut encoder = lz4_flex::frame::FrameEncoder::with_frame_info(info, Vec::new());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn snappy_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    let n = bytes.len() - 1;
    if n < 60 {
        out.push((n as u8) << 2);
    } else if n < 256 {
        out.push(60 << 2);
        out.push(n as u8);
    } else {
        out.push(61 << 2);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    }
    out.extend_from_slice(bytes);
}

/// Greedy Snappy block encoder: 2-byte-offset copies, searched over a short
/// window
fn snappy_block(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut n = data.len() as u32;
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }

    let mut pos = 0;
    let mut literal_start = 0;
    while pos < data.len() {
        let mut best = (0usize, 0usize);
        for offset in 1..=pos.min(256) {
            let len = (0..64.min(data.len() - pos))
                .take_while(|&i| data[pos + i] == data[pos + i - offset])
                .count();
            if len > best.0 {
                best = (len, offset);
            }
        }
        if best.0 >= 4 {
            if literal_start < pos {
                for chunk in data[literal_start..pos].chunks(60_000) {
                    snappy_literal(&mut out, chunk);
                }
            }
            out.push((((best.0 - 1) as u8) << 2) | 2);
            out.extend_from_slice(&(best.1 as u16).to_le_bytes());
            pos += best.0;
            literal_start = pos;
        } else {
            pos += 1;
        }
    }
    if literal_start < data.len() {
        for chunk in data[literal_start..].chunks(60_000) {
            snappy_literal(&mut out, chunk);
        }
    }
    out
}

fn snappy_chunk(out: &mut Vec<u8>, chunk_type: u8, body: &[u8]) {
    out.push(chunk_type);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes()[..3]);
    out.extend_from_slice(body);
}

/// Snappy framing format, alternating compressed and uncompressed chunks
fn snappy_framed(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    snappy_chunk(&mut out, 0xff, b"sNaPpY");
    for (i, chunk) in data.chunks(65_536).enumerate() {
        let mut body = mask_crc32c(crc32c(chunk)).to_le_bytes().to_vec();
        if i % 2 == 0 {
            body.extend_from_slice(&snappy_block(chunk));
            snappy_chunk(&mut out, 0x00, &body);
        } else {
            body.extend_from_slice(chunk);
            snappy_chunk(&mut out, 0x01, &body);
        }
    }
    out
}

fn config(codec: Codec) -> DecompressConfig {
    DecompressConfig { codec, ..Default::default() }
}

/// Decompress through every engine width, single-threaded and pipelined,
/// and check every path agrees with `expected`
fn assert_all_paths(codec: Codec, compressed: &[u8], expected: &[u8], label: &str) {
    let reference = decompress(codec, compressed).unwrap();
    assert_eq!(reference.data, expected, "{}: single-threaded output differs", label);
    assert!(!reference.stats.checksum_mismatch, "{}: unexpected checksum mismatch", label);
    assert_eq!(reference.stats.output_bytes, expected.len() as u64);

    for width in ALL_WIDTHS {
        for pipelined in [false, true] {
            let config = DecompressConfig { parallel_bytes: width, pipelined, ..config(codec) };
            let result = decompress_with(&config, compressed).unwrap();
            assert_eq!(
                result.data, expected,
                "{}: output differs at width {:?}, pipelined {}",
                label, width, pipelined
            );
            assert_eq!(result.stats, reference.stats, "{}: stats differ", label);
        }
    }
}

// ============================================================================
// gzip / zlib / DEFLATE
// ============================================================================

#[test]
fn test_gzip_corpus() {
    for (label, data) in corpus() {
        assert_all_paths(Codec::Gzip, &gzip(&data, Compression::default()), &data, label);
    }
}

#[test]
fn test_gzip_levels() {
    let data = generate_mixed_data(100_000);
    for level in [Compression::none(), Compression::fast(), Compression::best()] {
        let compressed = gzip(&data, level);
        assert_eq!(decompress(Codec::Auto, &compressed).unwrap().data, data);
    }
}

#[test]
fn test_gzip_multi_member() {
    let first = generate_fastq_data(100, 50);
    let second = generate_random_data(5_000, 7);
    let mut compressed = gzip(&first, Compression::default());
    compressed.extend(gzip(&second, Compression::best()));

    let mut expected = first.clone();
    expected.extend_from_slice(&second);

    let result = decompress(Codec::Gzip, &compressed).unwrap();
    assert_eq!(result.data, expected);
    assert_eq!(result.stats.members, 2);
    assert_all_paths(Codec::Gzip, &compressed, &expected, "multi-member");
}

#[test]
fn test_gzip_libdeflater() {
    let data = generate_fastq_data(1_000, 150);
    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::best());
    let mut compressed = vec![0u8; compressor.gzip_compress_bound(data.len())];
    let len = compressor.gzip_compress(&data, &mut compressed).unwrap();
    compressed.truncate(len);

    assert_all_paths(Codec::Gzip, &compressed, &data, "libdeflater gzip");
}

#[test]
fn test_zlib() {
    for (label, data) in corpus() {
        let compressed = zlib(&data);
        let result = decompress(Codec::Auto, &compressed).unwrap();
        assert_eq!(result.data, data, "{}", label);
        assert_eq!(result.stats.members, 1);
    }

    let data = generate_mixed_data(60_000);
    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::default());
    let mut compressed = vec![0u8; compressor.zlib_compress_bound(data.len())];
    let len = compressor.zlib_compress(&data, &mut compressed).unwrap();
    compressed.truncate(len);
    assert_all_paths(Codec::Zlib, &compressed, &data, "libdeflater zlib");
}

#[test]
fn test_raw_deflate() {
    let data = generate_mixed_data(80_000);
    for level in [Compression::none(), Compression::fast(), Compression::best()] {
        let compressed = raw_deflate(&data, level);
        assert_all_paths(Codec::Deflate, &compressed, &data, "raw deflate");
    }

    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::fastest());
    let mut compressed = vec![0u8; compressor.deflate_compress_bound(data.len())];
    let len = compressor.deflate_compress(&data, &mut compressed).unwrap();
    compressed.truncate(len);
    assert_eq!(decompress(Codec::Deflate, &compressed).unwrap().data, data);
}

#[test]
fn test_gzip_crc_mismatch_is_flagged() {
    let data = generate_mixed_data(10_000);
    let mut compressed = gzip(&data, Compression::default());
    let crc_pos = compressed.len() - 8;
    compressed[crc_pos] ^= 0x01;

    let result = decompress(Codec::Gzip, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);

    let unchecked = DecompressConfig { verify_checksums: false, ..config(Codec::Gzip) };
    assert!(!decompress_with(&unchecked, &compressed).unwrap().stats.checksum_mismatch);
}

#[test]
fn test_gzip_isize_mismatch_is_flagged() {
    let data = generate_random_data(1_000, 3);
    let mut compressed = gzip(&data, Compression::default());
    let last = compressed.len() - 1;
    compressed[last] ^= 0x80;

    let result = decompress(Codec::Gzip, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);
}

#[test]
fn test_zlib_adler_mismatch_is_flagged() {
    let data = generate_fastq_data(20, 40);
    let mut compressed = zlib(&data);
    let last = compressed.len() - 1;
    compressed[last] ^= 0xFF;

    let result = decompress(Codec::Zlib, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);
}

#[test]
fn test_truncated_gzip_fails() {
    let data = generate_mixed_data(50_000);
    let compressed = gzip(&data, Compression::default());
    for cut in [5, 20, compressed.len() / 2, compressed.len() - 3] {
        assert!(
            decompress(Codec::Gzip, &compressed[..cut]).is_err(),
            "truncation at {} accepted",
            cut
        );
    }
}

#[test]
fn test_invalid_block_type_fails() {
    // BFINAL=1, BTYPE=11
    let result = decompress(Codec::Deflate, &[0x07, 0x00]);
    assert!(matches!(result, Err(Error::InvalidBlockType(3))));
}

// ============================================================================
// Zstandard
// ============================================================================

#[test]
fn test_zstd_corpus() {
    for (label, data) in corpus() {
        assert_all_paths(Codec::Zstd, &zstd_frame(&data, 3, true), &data, label);
    }
}

#[test]
fn test_zstd_levels() {
    let data = generate_fastq_data(2_000, 100);
    for level in [1, 5, 12, 19] {
        let compressed = zstd::encode_all(&data[..], level).unwrap();
        let result = decompress(Codec::Auto, &compressed).unwrap();
        assert_eq!(result.data, data, "level {}", level);
    }
}

#[test]
fn test_zstd_large_mixed() {
    let data = generate_mixed_data(1_500_000);
    assert_all_paths(Codec::Zstd, &zstd_frame(&data, 7, true), &data, "zstd large");
}

#[test]
fn test_zstd_multi_frame() {
    let first = generate_repetitive_data(40_000);
    let second = generate_mixed_data(60_000);
    let mut compressed = zstd_frame(&first, 3, true);
    compressed.extend(zstd_frame(&second, 9, false));

    let mut expected = first.clone();
    expected.extend_from_slice(&second);

    let result = decompress(Codec::Zstd, &compressed).unwrap();
    assert_eq!(result.data, expected);
    assert_eq!(result.stats.members, 2);
}

#[test]
fn test_zstd_skippable_frame() {
    let data = generate_fastq_data(50, 30);
    let mut compressed = vec![0x50, 0x2A, 0x4D, 0x18, 3, 0, 0, 0, 1, 2, 3];
    compressed.extend(zstd_frame(&data, 3, false));

    assert_eq!(decompress(Codec::Auto, &compressed).unwrap().data, data);
}

#[test]
fn test_zstd_checksum_mismatch_is_flagged() {
    let data = generate_mixed_data(30_000);
    let mut compressed = zstd_frame(&data, 3, true);
    let last = compressed.len() - 1;
    compressed[last] ^= 0x55;

    let result = decompress(Codec::Zstd, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);
}

#[test]
fn test_zstd_dictionary_rejected() {
    // FHD: 1-byte dictionary id; window descriptor; dictionary id 5
    let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x01, 0x00, 0x05];
    assert!(matches!(decompress(Codec::Zstd, &frame), Err(Error::DictionaryUnsupported(5))));
}

#[test]
fn test_zstd_window_too_large() {
    // Window descriptor exponent 20: a 1 GiB window
    let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x00, 20 << 3];
    assert!(matches!(decompress(Codec::Zstd, &frame), Err(Error::WindowTooLarge { .. })));
}

#[test]
fn test_zstd_corruption_never_panics() {
    let data = generate_mixed_data(20_000);
    let compressed = zstd_frame(&data, 3, true);
    for pos in (6..compressed.len()).step_by(37) {
        let mut corrupt = compressed.clone();
        corrupt[pos] ^= 0xA5;
        // Either an error or a flagged/altered result; never a panic
        let _ = decompress(Codec::Zstd, &corrupt);
    }
}

// ============================================================================
// LZ4
// ============================================================================

#[test]
fn test_lz4_corpus() {
    for (label, data) in corpus() {
        let compressed = lz4_frame(&data, lz4_flex::frame::FrameInfo::new());
        assert_all_paths(Codec::Lz4, &compressed, &data, label);
    }
}

#[test]
fn test_lz4_linked_blocks_with_checksums() {
    use lz4_flex::frame::{BlockMode, BlockSize, FrameInfo};

    let data = generate_fastq_data(3_000, 100);
    let info = FrameInfo::new()
        .block_size(BlockSize::Max64KB)
        .block_mode(BlockMode::Linked)
        .block_checksums(true)
        .content_checksum(true)
        .content_size(Some(data.len() as u64));
    let compressed = lz4_frame(&data, info);

    assert_all_paths(Codec::Lz4, &compressed, &data, "lz4 linked");
}

#[test]
fn test_lz4_multi_frame() {
    let first = generate_random_data(10_000, 1);
    let second = generate_repetitive_data(30_000);
    let mut compressed = lz4_frame(&first, lz4_flex::frame::FrameInfo::new());
    compressed.extend(lz4_frame(&second, lz4_flex::frame::FrameInfo::new()));

    let result = decompress(Codec::Auto, &compressed).unwrap();
    assert_eq!(result.data.len(), first.len() + second.len());
    assert_eq!(&result.data[..first.len()], &first[..]);
    assert_eq!(&result.data[first.len()..], &second[..]);
    assert_eq!(result.stats.members, 2);
}

#[test]
fn test_lz4_content_checksum_mismatch_is_flagged() {
    let data = generate_mixed_data(20_000);
    let info = lz4_flex::frame::FrameInfo::new().content_checksum(true);
    let mut compressed = lz4_frame(&data, info);
    let last = compressed.len() - 1;
    compressed[last] ^= 0x01;

    let result = decompress(Codec::Lz4, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);
}

#[test]
fn test_lz4_header_checksum_is_fatal() {
    let data = generate_mixed_data(1_000);
    let mut compressed = lz4_frame(&data, lz4_flex::frame::FrameInfo::new());
    // Magic (4), FLG, BD, HC
    compressed[6] ^= 0xFF;

    assert!(matches!(
        decompress(Codec::Lz4, &compressed),
        Err(Error::HeaderChecksumMismatch { .. })
    ));
}

#[test]
fn test_lz4_after_large_skippable_frame_is_detected() {
    let data = generate_mixed_data(5_000);
    let mut compressed = 0x184D_2A50u32.to_le_bytes().to_vec();
    compressed.extend_from_slice(&32u32.to_le_bytes());
    compressed.extend_from_slice(&[0u8; 32]);
    compressed.extend(lz4_frame(&data, lz4_flex::frame::FrameInfo::new()));

    for pipelined in [false, true] {
        let config = DecompressConfig { pipelined, ..Default::default() };
        let result = decompress_with(&config, &compressed).unwrap();
        assert_eq!(result.data, data);
        assert_eq!(result.stats.members, 1);
        assert_eq!(result.stats.input_bytes, compressed.len() as u64);
    }
}

// ============================================================================
// Snappy
// ============================================================================

#[test]
fn test_snappy_framed_corpus() {
    for (label, data) in corpus() {
        assert_all_paths(Codec::Snappy, &snappy_framed(&data), &data, label);
    }
}

#[test]
fn test_snappy_framed_chunks_are_members() {
    let data = generate_repetitive_data(150_000);
    let result = decompress(Codec::Auto, &snappy_framed(&data)).unwrap();
    assert_eq!(result.data, data);
    assert_eq!(result.stats.members, 3);
}

#[test]
fn test_snappy_raw_block() {
    let data = generate_mixed_data(30_000);
    let block = snappy_block(&data);
    assert_all_paths(Codec::SnappyRaw, &block, &data, "snappy raw");
}

#[test]
fn test_snappy_overlapping_copy() {
    // "ab" then copy 10 at offset 2
    let block = [12, 0x04, b'a', b'b', (9 << 2) | 2, 2, 0];
    for width in ALL_WIDTHS {
        let config = DecompressConfig { parallel_bytes: width, ..config(Codec::SnappyRaw) };
        assert_eq!(decompress_with(&config, &block).unwrap().data, b"abababababab");
    }
}

#[test]
fn test_snappy_crc_mismatch_is_flagged() {
    let data = generate_fastq_data(10, 20);
    let mut compressed = snappy_framed(&data);
    // First data chunk: identifier chunk (10 bytes), chunk header (4), CRC
    compressed[14] ^= 0x01;

    let result = decompress(Codec::Snappy, &compressed).unwrap();
    assert_eq!(result.data, data);
    assert!(result.stats.checksum_mismatch);
}

#[test]
fn test_snappy_offset_beyond_output_fails() {
    let block = [5, 0x00, b'a', (3 << 2) | 2, 5, 0];
    assert!(matches!(
        decompress(Codec::SnappyRaw, &block),
        Err(Error::OffsetBeyondOutput { .. })
    ));
}

#[test]
fn test_snappy_raw_oversized_length_fails() {
    let block = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
    for pipelined in [false, true] {
        let config = DecompressConfig { codec: Codec::SnappyRaw, pipelined, ..Default::default() };
        assert!(matches!(decompress_with(&config, &block), Err(Error::WindowTooLarge { .. })));
    }
}

// ============================================================================
// Detection / Batch
// ============================================================================

#[test]
fn test_auto_detection() {
    let data = generate_fastq_data(10, 10);
    assert_eq!(Codec::detect(&gzip(&data, Compression::default())), Some(Codec::Gzip));
    assert_eq!(Codec::detect(&zlib(&data)), Some(Codec::Zlib));
    assert_eq!(Codec::detect(&zstd_frame(&data, 1, false)), Some(Codec::Zstd));
    assert_eq!(
        Codec::detect(&lz4_frame(&data, lz4_flex::frame::FrameInfo::new())),
        Some(Codec::Lz4)
    );
    assert_eq!(Codec::detect(&snappy_framed(&data)), Some(Codec::Snappy));
}

#[test]
fn test_unknown_format() {
    assert!(matches!(decompress(Codec::Auto, b"plain text"), Err(Error::UnknownFormat)));
}

#[test]
fn test_batch_mixed_formats() {
    let data = generate_mixed_data(25_000);
    let mut corrupt = zstd_frame(&data, 3, true);
    corrupt.truncate(corrupt.len() / 2);

    let inputs = vec![
        gzip(&data, Compression::default()),
        zstd_frame(&data, 3, true),
        corrupt,
        lz4_frame(&data, lz4_flex::frame::FrameInfo::new()),
        snappy_framed(&data),
        zlib(&data),
    ];

    for threads in [1, 3, 0] {
        let batch = BatchDecompressor::new(DecompressConfig { num_threads: threads, ..Default::default() });
        let results = batch.decompress_all(inputs.clone());
        assert_eq!(results.len(), inputs.len());
        for (i, result) in results.iter().enumerate() {
            if i == 2 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().data, data, "input {}", i);
            }
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

fn engine_config(width: ParallelBytes) -> DecompressConfig {
    DecompressConfig { parallel_bytes: width, ..Default::default() }
}

/// Resolve tokens one byte at a time
fn reference_resolve(block: &TokenBlock) -> Vec<u8> {
    let mut out = Vec::new();
    let mut literal_pos = 0;
    for token in &block.tokens {
        let n = token.literal_length as usize;
        out.extend_from_slice(&block.literals[literal_pos..literal_pos + n]);
        literal_pos += n;
        for _ in 0..token.match_length {
            out.push(out[out.len() - token.match_offset as usize]);
        }
    }
    out
}

fn run_engine(block: &TokenBlock, width: ParallelBytes) -> Vec<u8> {
    let mut engine = MatchEngine::new(Vec::new(), &engine_config(width));
    engine.start_member(&MemberInfo { window_size: 1 << 16, checksum: None }).unwrap();
    engine.process_block(block).unwrap();
    engine.end_member(&Trailer::default()).unwrap();
    engine.process_block(&TokenBlock::end_of_stream()).unwrap();
    engine.finish().unwrap().0
}

fn write_code(bits: &mut Vec<bool>, code: u32, len: u8) {
    for i in (0..len).rev() {
        bits.push((code >> i) & 1 == 1);
    }
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len() / 8 + 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Code lengths of a full binary tree grown by splitting leaves, with unused
/// symbols mixed in
fn complete_code_lengths(splits: &[prop::sample::Index], gaps: &[bool]) -> Vec<u8> {
    let mut leaves = vec![1u8, 1];
    for split in splits {
        let i = split.index(leaves.len());
        if leaves[i] < 12 {
            leaves[i] += 1;
            leaves.push(leaves[i]);
        }
    }

    let mut lengths = Vec::with_capacity(leaves.len() + gaps.len());
    let mut leaves = leaves.into_iter();
    for &gap in gaps {
        if gap {
            lengths.push(0);
        } else if let Some(len) = leaves.next() {
            lengths.push(len);
        }
    }
    lengths.extend(leaves);
    lengths
}

proptest! {
    #[test]
    fn prop_engine_matches_bytewise_copy(
        seed in prop::collection::vec(any::<u8>(), 1..32),
        ops in prop::collection::vec((0u32..20, 1u32..100, any::<u32>()), 0..40),
    ) {
        let mut block = TokenBlock::new(vec![Token::literals(seed.len() as u32)], seed.clone());
        let mut produced = seed.len() as u32;
        for (i, &(literal_length, match_length, selector)) in ops.iter().enumerate() {
            for j in 0..literal_length {
                block.push_literal((i as u32 * 31 + j * 7) as u8);
            }
            produced += literal_length;
            let offset = 1 + selector % produced.min(64);
            block.tokens.push(Token::new(literal_length, match_length, offset));
            produced += match_length;
        }

        let expected = reference_resolve(&block);
        for width in ALL_WIDTHS {
            prop_assert_eq!(&run_engine(&block, width), &expected);
        }
    }

    #[test]
    fn prop_fse_states_cover_table(
        log in 5u8..=9,
        symbols in 1usize..24,
        picks in prop::collection::vec(any::<u16>(), 512),
        low in prop::collection::vec(any::<bool>(), 24),
    ) {
        let size = 1usize << log;
        let mut counts = vec![1i16; symbols];
        for &pick in &picks[..size - symbols] {
            counts[pick as usize % symbols] += 1;
        }
        for (count, &flag) in counts.iter_mut().zip(&low) {
            if *count == 1 && flag {
                *count = -1;
            }
        }

        let table = FseTable::build(&counts, log).unwrap();
        prop_assert_eq!(table.len(), size);

        for (symbol, &count) in counts.iter().enumerate() {
            prop_assert_eq!(table.occurrences(symbol as u8), count.max(1) as usize);

            // The next-state ranges of a symbol's states tile the table
            let mut ranges: Vec<(usize, usize)> = (0..size)
                .map(|state| table.entry(state))
                .filter(|e| e.symbol as usize == symbol)
                .map(|e| (e.baseline as usize, e.baseline as usize + (1 << e.num_bits)))
                .collect();
            ranges.sort_unstable();
            let mut next = 0;
            for (start, end) in ranges {
                prop_assert_eq!(start, next);
                next = end;
            }
            prop_assert_eq!(next, size);
        }
    }

    #[test]
    fn prop_huffman_codes_are_prefix_free_and_decodable(
        splits in prop::collection::vec(any::<prop::sample::Index>(), 0..38),
        gaps in prop::collection::vec(any::<bool>(), 0..40),
    ) {
        let lengths = complete_code_lengths(&splits, &gaps);
        let decoder = HuffmanDecoder::from_code_lengths(&lengths).unwrap();
        let codes = canonical_codes(&lengths);
        let used: Vec<(usize, u32, u8)> = codes
            .iter()
            .enumerate()
            .filter(|(_, &(_, len))| len > 0)
            .map(|(symbol, &(code, len))| (symbol, code, len))
            .collect();

        for &(a, code_a, len_a) in &used {
            for &(b, code_b, len_b) in &used {
                if a != b && len_a <= len_b {
                    prop_assert_ne!(code_b >> (len_b - len_a), code_a, "{} prefixes {}", a, b);
                }
            }
        }

        let mut bits = Vec::new();
        for &(_, code, len) in &used {
            write_code(&mut bits, code, len);
        }
        let bytes = pack_bits(&bits);
        let mut reader = BitReader::new(&bytes[..]);
        for &(symbol, _, _) in &used {
            prop_assert_eq!(decoder.decode(&mut reader).unwrap() as usize, symbol);
        }
    }
}

// ============================================================================
// Binary CLI Tests
// ============================================================================

fn lzpipe_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lzpipe"))
}

#[test]
fn test_cli_decompress_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = generate_fastq_data(200, 80);
    let input = dir.path().join("reads.fastq.zst");
    let output = dir.path().join("reads.fastq");
    std::fs::write(&input, zstd_frame(&data, 3, true)).unwrap();

    let status = lzpipe_bin().arg("-i").arg(&input).arg("-o").arg(&output).status().unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[test]
fn test_cli_stdout_pipelined() {
    let dir = tempfile::tempdir().unwrap();
    let data = generate_mixed_data(40_000);
    let input = dir.path().join("data.gz");
    std::fs::write(&input, gzip(&data, Compression::default())).unwrap();

    let output = lzpipe_bin()
        .args(["--pipelined", "--parallel-bytes", "4", "-i"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, data);
}

#[test]
fn test_cli_detect() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.lz4");
    std::fs::write(&input, lz4_frame(b"hello", lz4_flex::frame::FrameInfo::new())).unwrap();

    let output = lzpipe_bin().arg("--detect").arg("-i").arg(&input).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).trim_end().ends_with("lz4"));
}

#[test]
fn test_cli_checksum_mismatch_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let data = generate_random_data(2_000, 5);
    let mut compressed = gzip(&data, Compression::default());
    let crc_pos = compressed.len() - 8;
    compressed[crc_pos] ^= 0x01;
    let input = dir.path().join("bad.gz");
    std::fs::write(&input, compressed).unwrap();

    let output = lzpipe_bin().args(["-q", "-i"]).arg(&input).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stdout, data);

    let output = lzpipe_bin().args(["-q", "--no-verify", "-i"]).arg(&input).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_cli_error_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("garbage.bin");
    std::fs::write(&input, b"not compressed at all").unwrap();

    let output = lzpipe_bin().arg("-i").arg(&input).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_batch() {
    let dir = tempfile::tempdir().unwrap();
    let data = generate_mixed_data(10_000);
    let first = dir.path().join("one.txt.gz");
    let second = dir.path().join("two.txt.zst");
    std::fs::write(&first, gzip(&data, Compression::default())).unwrap();
    std::fs::write(&second, zstd_frame(&data, 3, true)).unwrap();
    let out_dir = dir.path().join("out");

    let status = lzpipe_bin()
        .args(["-t", "2", "-i"])
        .arg(&first)
        .arg("-i")
        .arg(&second)
        .arg("-o")
        .arg(&out_dir)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read(out_dir.join("one.txt")).unwrap(), data);
    assert_eq!(std::fs::read(out_dir.join("two.txt")).unwrap(), data);
}
