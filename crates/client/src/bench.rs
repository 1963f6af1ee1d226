use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;

use hashforge_search::{Nonce, SearchConfig, SearchEngine, SearchOutcome};
use hashforge_sha256d::{HeaderEvaluator, Sha2, Target};

use crate::constants::BENCH_HEADER_HEX;
use crate::format::{format_duration, format_hashrate, format_number};

/// Highest nonce for a benchmark over `2^log2_nonces` nonces.
fn bench_max_nonce(log2_nonces: u32) -> Nonce {
    let count = 1u64 << log2_nonces.min(32);
    Nonce::try_from(count - 1).unwrap_or(Nonce::MAX)
}

fn hashes_per_sec(hashes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (hashes as f64 / secs).round() as u64
}

pub fn run_benchmark(log2_nonces: u32, threads: usize) -> anyhow::Result<()> {
    let header = hex::decode(BENCH_HEADER_HEX).context("decode BENCH_HEADER_HEX")?;
    let max_nonce = bench_max_nonce(log2_nonces);
    let progress = Arc::new(AtomicU64::new(0));

    // An all-zero target is never met, so every nonce in range is hashed.
    let mut engine = SearchEngine::new(
        header,
        HeaderEvaluator::<Sha2>::new(),
        Target::from_le_bytes([0u8; 32]),
    )
    .with_config(SearchConfig {
        max_nonce,
        workers: Some(threads.max(1)),
        ..SearchConfig::default()
    })
    .with_progress(progress.clone());

    println!("Threads: {}", format_number(engine.worker_count() as u64));
    println!(
        "Nonces: {}",
        format_number(u64::from(engine.config().max_nonce) + 1)
    );

    let started_at = Instant::now();
    let outcome = engine.do_work().context("benchmark search")?;
    let duration = started_at.elapsed();

    if let SearchOutcome::Found(nonce) = outcome {
        anyhow::bail!("benchmark target unexpectedly met at nonce {nonce}");
    }

    let hashes = progress.load(Ordering::Relaxed);
    println!("Hashes: {}", format_number(hashes));
    println!("Duration: {}", format_duration(duration));
    println!(
        "Hashrate: {}",
        format_hashrate(hashes_per_sec(hashes, duration))
    );
    Ok(())
}
