#![no_main]

use libfuzzer_sys::fuzz_target;
use lzpipe::{decompress_with, Codec, DecompressConfig};

fuzz_target!(|data: &[u8]| {
    let config = DecompressConfig { codec: Codec::Auto, max_window_size: 8 << 20, ..Default::default() };
    let single = decompress_with(&config, data);
    let piped = decompress_with(&DecompressConfig { pipelined: true, queue_depth: 1, ..config }, data);

    // Both paths agree on success and on the bytes produced
    match (single, piped) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a.data, b.data);
            assert_eq!(a.stats, b.stats);
        }
        (Err(_), Err(_)) => {}
        (a, b) => panic!("paths disagree: {:?} vs {:?}", a.map(|d| d.stats), b.map(|d| d.stats)),
    }
});
