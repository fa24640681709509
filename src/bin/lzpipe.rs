use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use lzpipe::{
    BatchDecompressor, Codec, DecompressConfig, DecompressStats, Decompressor, ParallelBytes,
    PipelinedDecompressor, SingleThreadedDecompressor,
};
use lzpipe::source::resolve_codec;
use memmap2::Mmap;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lzpipe")]
#[command(about = "Decompress gzip, zlib, DEFLATE, LZ4, Snappy and Zstandard streams")]
#[command(version)]
struct Args {
    /// Input file(s) (use - for stdin). Several inputs are decompressed as a batch.
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// Output file (use - for stdout); with several inputs, an output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Input format: auto, gzip, zlib, deflate, lz4, snappy, snappy-raw, zstd
    #[arg(short, long, default_value = "auto", value_parser = parse_codec)]
    format: Codec,

    /// Bytes moved per match-engine step (1, 4, 8 or 16)
    #[arg(long, default_value = "8", value_parser = parse_parallel_bytes)]
    parallel_bytes: ParallelBytes,

    /// Run parsing and block decoding on their own threads
    #[arg(long)]
    pipelined: bool,

    /// Queue capacity between pipelined stages
    #[arg(long, default_value = "4")]
    queue_depth: usize,

    /// Skip checksum and content size verification
    #[arg(long)]
    no_verify: bool,

    /// Largest accepted Zstd window, in MiB
    #[arg(long, default_value = "128")]
    max_window: usize,

    /// Number of threads for batch mode (0 = auto)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,

    /// Print the detected format and exit
    #[arg(long)]
    detect: bool,

    /// Print statistics to stderr
    #[arg(long)]
    stats: bool,

    /// More logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Exit codes
const EXIT_OK: u8 = 0;
const EXIT_CHECKSUM_MISMATCH: u8 = 1;
const EXIT_ERROR: u8 = 2;

/// Suffixes stripped from input names to form batch output names
const SUFFIXES: [&str; 9] = [".gz", ".gzip", ".zz", ".z", ".deflate", ".lz4", ".sz", ".snappy", ".zst"];

fn parse_codec(name: &str) -> Result<Codec, String> {
    Codec::from_name(name).ok_or_else(|| format!("unknown format '{}'", name))
}

fn parse_parallel_bytes(value: &str) -> Result<ParallelBytes, String> {
    value
        .parse::<usize>()
        .ok()
        .and_then(ParallelBytes::from_bytes)
        .ok_or_else(|| format!("parallel bytes must be 1, 4, 8 or 16, got '{}'", value))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging(args: &Args) {
    let default = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = if args.quiet || args.verbose > 0 {
        EnvFilter::new(format!("lzpipe={}", default))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn run(args: &Args) -> Result<u8, Box<dyn std::error::Error>> {
    let config = DecompressConfig {
        codec: args.format,
        parallel_bytes: args.parallel_bytes,
        pipelined: args.pipelined,
        queue_depth: args.queue_depth,
        verify_checksums: !args.no_verify,
        max_window_size: args.max_window << 20,
        num_threads: args.threads,
        ..Default::default()
    };

    if args.detect {
        return run_detect_mode(args);
    }
    if args.input.len() > 1 {
        return run_batch_mode(args, config);
    }

    let input_path = &args.input[0];
    let output_path = args.output.clone().unwrap_or_else(|| PathBuf::from("-"));
    let output: Box<dyn Write> = if is_std(&output_path) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(&output_path)?))
    };

    let start = std::time::Instant::now();
    let stats = if is_std(input_path) {
        decompress_one(config, io::stdin(), output)?
    } else {
        let file = File::open(input_path)?;
        let map = map_file(&file)?;
        decompress_one(config, map.as_deref().unwrap_or(&[]), output)?
    };

    if args.stats {
        print_stats(&stats, start.elapsed());
    }
    Ok(exit_code(&stats))
}

fn decompress_one<R: io::Read + Send>(
    config: DecompressConfig,
    input: R,
    output: Box<dyn Write>,
) -> lzpipe::Result<DecompressStats> {
    if config.pipelined {
        PipelinedDecompressor::new(config).decompress(input, output)
    } else {
        SingleThreadedDecompressor::new(config).decompress(input, output)
    }
}

fn run_detect_mode(args: &Args) -> Result<u8, Box<dyn std::error::Error>> {
    let mut code = EXIT_OK;
    for path in &args.input {
        let resolved = if is_std(path) {
            resolve_codec(Codec::Auto, io::stdin().lock()).map(|(codec, _)| codec)
        } else {
            resolve_codec(Codec::Auto, File::open(path)?).map(|(codec, _)| codec)
        };
        match resolved {
            Ok(codec) => println!("{}: {}", path.display(), codec.name()),
            Err(lzpipe::Error::UnknownFormat) => {
                println!("{}: unknown", path.display());
                code = EXIT_ERROR;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(code)
}

fn run_batch_mode(args: &Args, config: DecompressConfig) -> Result<u8, Box<dyn std::error::Error>> {
    let out_dir = args.output.clone().ok_or("batch mode needs -o/--output naming a directory")?;
    std::fs::create_dir_all(&out_dir)?;

    let mut inputs = Vec::with_capacity(args.input.len());
    for path in &args.input {
        if is_std(path) {
            return Err("stdin cannot be part of a batch".into());
        }
        let file = File::open(path)?;
        inputs.push(map_file(&file)?.map(|m| m.to_vec()).unwrap_or_default());
    }

    let start = std::time::Instant::now();
    let results = BatchDecompressor::new(config).decompress_all(inputs);

    let mut code = EXIT_OK;
    let mut total = DecompressStats::default();
    for (path, result) in args.input.iter().zip(results) {
        match result {
            Ok(decompressed) => {
                let target = out_dir.join(output_name(path));
                std::fs::write(&target, &decompressed.data)?;
                if decompressed.stats.checksum_mismatch {
                    eprintln!("Warning: checksum mismatch in {}", path.display());
                    code = code.max(EXIT_CHECKSUM_MISMATCH);
                }
                accumulate(&mut total, &decompressed.stats);
            }
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                code = EXIT_ERROR;
            }
        }
    }

    if args.stats {
        print_stats(&total, start.elapsed());
    }
    Ok(code)
}

fn map_file(file: &File) -> io::Result<Option<Mmap>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // The mapping is read-only and dropped before the process exits
    let map = unsafe { Mmap::map(file)? };
    Ok(Some(map))
}

fn is_std(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn output_name(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("output");
    let lower = name.to_lowercase();
    for suffix in SUFFIXES {
        if lower.ends_with(suffix) && lower.len() > suffix.len() {
            return PathBuf::from(&name[..name.len() - suffix.len()]);
        }
    }
    PathBuf::from(format!("{}.out", name))
}

fn exit_code(stats: &DecompressStats) -> u8 {
    if stats.checksum_mismatch {
        eprintln!("Warning: checksum mismatch, output may be corrupt");
        EXIT_CHECKSUM_MISMATCH
    } else {
        EXIT_OK
    }
}

fn accumulate(total: &mut DecompressStats, stats: &DecompressStats) {
    total.input_bytes += stats.input_bytes;
    total.output_bytes += stats.output_bytes;
    total.members += stats.members;
    total.blocks += stats.blocks;
    total.tokens += stats.tokens;
    total.matches += stats.matches;
    total.literal_bytes += stats.literal_bytes;
    total.checksum_mismatch |= stats.checksum_mismatch;
}

fn print_stats(stats: &DecompressStats, elapsed: std::time::Duration) {
    eprintln!("Decompression complete:");
    eprintln!("  Input bytes:      {}", stats.input_bytes);
    eprintln!("  Output bytes:     {}", stats.output_bytes);
    eprintln!("  Members:          {}", stats.members);
    eprintln!("  Blocks:           {}", stats.blocks);
    eprintln!("  Tokens:           {}", stats.tokens);
    eprintln!("  Matches:          {}", stats.matches);
    eprintln!("  Literal bytes:    {}", stats.literal_bytes);
    eprintln!("  Checksum ok:      {}", !stats.checksum_mismatch);
    eprintln!("  Time:             {:.2?}", elapsed);
    eprintln!(
        "  Throughput:       {:.1} MB/s",
        stats.output_bytes as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
}
