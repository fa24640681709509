#![no_main]

use libfuzzer_sys::fuzz_target;
use lzpipe::{decompress_with, Codec, DecompressConfig, ParallelBytes};

const CODECS: [Codec; 7] = [
    Codec::Gzip,
    Codec::Zlib,
    Codec::Deflate,
    Codec::Lz4,
    Codec::Snappy,
    Codec::SnappyRaw,
    Codec::Zstd,
];

fuzz_target!(|data: &[u8]| {
    // First byte picks the codec and engine width, the rest is the stream
    let Some((&selector, stream)) = data.split_first() else {
        return;
    };
    let codec = CODECS[selector as usize % CODECS.len()];
    let parallel_bytes = match (selector >> 4) & 0x03 {
        0 => ParallelBytes::One,
        1 => ParallelBytes::Four,
        2 => ParallelBytes::Eight,
        _ => ParallelBytes::Sixteen,
    };
    let config = DecompressConfig {
        codec,
        parallel_bytes,
        max_window_size: 8 << 20,
        ..Default::default()
    };

    // Errors are expected on arbitrary input; panics are not
    let _ = decompress_with(&config, stream);
});
