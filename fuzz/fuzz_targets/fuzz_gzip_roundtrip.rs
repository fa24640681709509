#![no_main]

use flate2::write::GzEncoder;
use flate2::Compression;
use libfuzzer_sys::fuzz_target;
use lzpipe::{decompress, Codec};
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    // Valid gzip from arbitrary content exercises every DEFLATE block type
    let data = if data.len() > 64 * 1024 { &data[..64 * 1024] } else { data };
    let level = Compression::new(data.first().map_or(6, |b| (b % 10) as u32));

    let mut encoder = GzEncoder::new(Vec::new(), level);
    if encoder.write_all(data).is_err() {
        return;
    }
    let gzip_data = match encoder.finish() {
        Ok(d) => d,
        Err(_) => return,
    };

    let result = decompress(Codec::Gzip, &gzip_data).expect("valid gzip rejected");
    assert_eq!(result.data, data, "Round-trip mismatch");
    assert!(!result.stats.checksum_mismatch);
});
