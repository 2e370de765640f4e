//! End-to-end demo harness over a binary word2vec file.
//!
//! Loads `word2vec.bin` from the working directory (classic binary
//! word2vec layout: an ASCII `"<words> <dims>\n"` header, then each word
//! followed by a space and `dims` little-endian f32 components), builds an
//! index, and runs sample searches. Optional stress modes exercise
//! quantization, multi-threaded optimistic insertion, mass deletion, and
//! the recall self-test.
//!
//! Exits 0 on success, 1 on an unknown option or a missing input file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use quiver::{GraphError, HnswConfig, HnswIndex, Quantization};

#[derive(Parser, Debug)]
#[command(name = "w2v-demo", version, about = "HNSW demo over binary word2vec data")]
struct Args {
    /// Store vectors with 8-bit scalar quantization.
    #[arg(long)]
    quant: bool,

    /// Store vectors as 1-bit sign bitmaps.
    #[arg(long)]
    bin: bool,

    /// Insert with N threads through the optimistic commit path.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Cap the number of words loaded.
    #[arg(long)]
    numele: Option<usize>,

    /// Delete 95% of the nodes, then re-validate and re-search.
    #[arg(long)]
    mass_del: bool,

    /// Run the recall self-test after the build.
    #[arg(long)]
    recall: bool,

    /// Neighbors to request in sample searches.
    #[arg(long, default_value_t = 10)]
    k: usize,

    /// Search exploration factor.
    #[arg(long, default_value_t = 200)]
    ef: usize,

    /// Input file, binary word2vec format.
    #[arg(long, default_value = "word2vec.bin")]
    input: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            };
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("w2v-demo: {message}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    if args.quant && args.bin {
        return Err("--quant and --bin are mutually exclusive".to_string());
    }
    let quantization = if args.bin {
        Quantization::Binary
    } else if args.quant {
        Quantization::Q8
    } else {
        Quantization::F32
    };

    let (dims, entries) = load_word2vec(&args.input, args.numele)?;
    println!(
        "loaded {} vectors of dimension {dims} from {}",
        entries.len(),
        args.input.display()
    );

    let config = HnswConfig::new(dims as u32, quantization);
    let index: HnswIndex<String> =
        HnswIndex::new(config).map_err(|e| format!("bad config: {e}"))?;

    let started = std::time::Instant::now();
    let conflicts = build(&index, &entries, args.threads.max(1));
    println!(
        "built {} nodes ({}) in {:.2?}, {conflicts} optimistic conflicts",
        index.len(),
        quantization.name(),
        started.elapsed()
    );
    index.log_stats();

    sample_searches(&index, args.k, args.ef);

    if args.recall {
        let recall = index.recall_self_test(100, args.k);
        println!("recall@{} over 100 samples: {recall:.3}", args.k);
    }

    if args.mass_del {
        mass_delete(&index)?;
        sample_searches(&index, args.k, args.ef);
    }

    let report = index.validate();
    println!(
        "validation: {}/{} connected, reciprocal={}, caps={}",
        report.connected_nodes, report.live_nodes, report.reciprocal, report.within_caps
    );
    if !report.is_healthy() {
        return Err("graph validation failed".to_string());
    }
    Ok(())
}

/// Inserts every entry, optimistically when running multi-threaded.
/// Returns the number of commit conflicts that fell back to the locked
/// path.
fn build(index: &HnswIndex<String>, entries: &[(String, Vec<f32>)], threads: usize) -> usize {
    if threads <= 1 {
        for (i, (word, vector)) in entries.iter().enumerate() {
            if let Err(e) = index.insert(i as u64, vector, None, word.clone()) {
                log::warn!("skipping '{word}': {e}");
            }
        }
        return 0;
    }

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for t in 0..threads {
            handles.push(scope.spawn(move || {
                let mut conflicts = 0usize;
                for (i, (word, vector)) in
                    entries.iter().enumerate().skip(t).step_by(threads)
                {
                    let id = i as u64;
                    let prep = match index.prepare_insert(id, vector, None) {
                        Ok(prep) => prep,
                        Err(e) => {
                            log::warn!("skipping '{word}': {e}");
                            continue;
                        }
                    };
                    match index.try_commit_insert(prep, word.clone()) {
                        Ok(_) => {}
                        Err(GraphError::Conflict) => {
                            conflicts += 1;
                            if let Err(e) = index.insert(id, vector, None, word.clone()) {
                                log::warn!("skipping '{word}': {e}");
                            }
                        }
                        Err(e) => log::warn!("skipping '{word}': {e}"),
                    }
                }
                conflicts
            }));
        }
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    })
}

/// Deletes 95% of the nodes in a non-contiguous pattern (every id not
/// divisible by 20) and re-validates.
fn mass_delete(index: &HnswIndex<String>) -> Result<(), String> {
    let before = index.len();
    let victims: Vec<u64> = index
        .random_ids(before)
        .into_iter()
        .filter(|id| id % 20 != 0)
        .collect();
    let started = std::time::Instant::now();
    for id in &victims {
        index.remove(*id);
    }
    println!(
        "mass-delete: removed {} of {before} nodes in {:.2?}",
        victims.len(),
        started.elapsed()
    );

    let report = index.validate();
    if !report.is_healthy() {
        return Err(format!("graph unhealthy after mass-delete: {report:?}"));
    }
    Ok(())
}

/// Searches the neighborhood of a few random words and prints them.
fn sample_searches(index: &HnswIndex<String>, k: usize, ef: usize) {
    let slot = index.read_slot();
    for id in index.random_ids(3) {
        let Some(vector) = index.get_vector(id) else {
            continue;
        };
        let word = index.get_value(id).unwrap_or_default();
        match index.search_with_ef(&vector, k, ef, &slot) {
            Ok(hits) => {
                println!("nearest to '{word}':");
                for hit in hits {
                    let neighbor = index.get_value(hit.id).unwrap_or_default();
                    println!("  {neighbor:<24} {:.4}", hit.distance);
                }
            }
            Err(e) => eprintln!("search for '{word}' failed: {e}"),
        }
    }
}

/// Reads the binary word2vec layout.
#[allow(clippy::type_complexity)]
fn load_word2vec(
    path: &Path,
    cap: Option<usize>,
) -> Result<(usize, Vec<(String, Vec<f32>)>), String> {
    let file =
        File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);

    let header = read_line(&mut reader)?;
    let mut parts = header.split_whitespace();
    let count: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or("malformed header: word count")?;
    let dims: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or("malformed header: dimensions")?;
    if dims == 0 {
        return Err("malformed header: zero dimensions".to_string());
    }

    let take = cap.map_or(count, |c| c.min(count));
    let mut entries = Vec::with_capacity(take);
    let mut raw = vec![0u8; dims * 4];
    for _ in 0..take {
        let word = read_token(&mut reader)?;
        reader
            .read_exact(&mut raw)
            .map_err(|e| format!("truncated vector data: {e}"))?;
        // The file stores little-endian f32; word2vec predates caring
        // about anything else.
        let vector: Vec<f32> = bytemuck::pod_collect_to_vec(&raw);
        entries.push((word, vector));
    }
    Ok((dims, entries))
}

fn read_byte(reader: &mut impl Read) -> Result<Option<u8>, String> {
    let mut byte = [0u8; 1];
    match reader.read(&mut byte) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(byte[0])),
        Err(e) => Err(format!("read error: {e}")),
    }
}

fn read_line(reader: &mut impl Read) -> Result<String, String> {
    let mut line = Vec::new();
    while let Some(b) = read_byte(reader)? {
        if b == b'\n' {
            break;
        }
        line.push(b);
    }
    String::from_utf8(line).map_err(|_| "header is not UTF-8".to_string())
}

/// Reads one whitespace-delimited token, skipping leading separators left
/// over from the previous record.
fn read_token(reader: &mut impl Read) -> Result<String, String> {
    let mut token = Vec::new();
    loop {
        match read_byte(reader)? {
            None => {
                if token.is_empty() {
                    return Err("unexpected end of file".to_string());
                }
                break;
            }
            Some(b) if (b == b' ' || b == b'\n' || b == b'\r') && token.is_empty() => {}
            Some(b' ') => break,
            Some(b) => token.push(b),
        }
    }
    String::from_utf8(token).map_err(|_| "word is not UTF-8".to_string())
}
