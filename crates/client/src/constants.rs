use std::time::Duration;

pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:8332/";

pub const STATUS_REFRESH_HZ: u64 = 4;
pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_millis(1_000 / STATUS_REFRESH_HZ);

/// Bitcoin genesis block header; the benchmark hashes it with every nonce in range.
pub const BENCH_HEADER_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
