use clap::Parser;
use reqwest::Url;

use hashforge_client_engine::RetryPolicy;
use hashforge_search::Nonce;

use crate::constants::DEFAULT_NODE_URL;

pub fn default_node_url() -> Url {
    Url::parse(DEFAULT_NODE_URL).expect("DEFAULT_NODE_URL must be a valid URL")
}

pub fn default_threads() -> u16 {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(1024) as u16
}

#[derive(Debug, Clone, Parser)]
#[command(name = "hashforge", version, about = "hashforge getwork CPU miner")]
pub struct Cli {
    /// Node JSON-RPC URL (overrides the saved config; default `http://127.0.0.1:8332/`).
    #[arg(long, env = "HASHFORGE_NODE_URL")]
    pub node_url: Option<Url>,

    /// RPC user for HTTP basic auth.
    #[arg(long, env = "HASHFORGE_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password for HTTP basic auth.
    #[arg(long, env = "HASHFORGE_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    /// Search threads per job.
    #[arg(
        short = 't',
        long,
        env = "HASHFORGE_THREADS",
        default_value_t = default_threads(),
        value_parser = clap::value_parser!(u16).range(1..=1024)
    )]
    pub threads: u16,

    /// Highest nonce tried per job.
    #[arg(long, env = "HASHFORGE_MAX_NONCE", default_value_t = Nonce::MAX)]
    pub max_nonce: Nonce,

    /// Attempts per fetch/submit before giving up.
    #[arg(
        long,
        env = "HASHFORGE_RETRIES",
        default_value_t = RetryPolicy::DEFAULT_MAX_FAILURES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub retries: u32,

    /// Seconds between attempts.
    #[arg(
        long,
        value_name = "SECS",
        env = "HASHFORGE_RETRY_DELAY",
        default_value_t = RetryPolicy::DEFAULT_DELAY.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub retry_delay: u64,

    /// Stop after this many jobs.
    #[arg(long, env = "HASHFORGE_JOBS")]
    pub jobs: Option<u64>,

    #[arg(long, env = "HASHFORGE_NO_STATUS", default_value_t = false)]
    pub no_status: bool,

    /// Run a local benchmark over 2^LOG2_NONCES nonces and exit.
    #[arg(
        long,
        value_name = "LOG2_NONCES",
        value_parser = clap::value_parser!(u32).range(0..=32)
    )]
    pub bench: Option<u32>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_mining_options() {
        let cli = Cli::try_parse_from([
            "hashforge",
            "--node-url",
            "http://node:8332/",
            "--rpc-user",
            "alice",
            "-t",
            "3",
            "--max-nonce",
            "1000",
            "--jobs",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.node_url.unwrap().as_str(), "http://node:8332/");
        assert_eq!(cli.rpc_user.as_deref(), Some("alice"));
        assert_eq!(cli.threads, 3);
        assert_eq!(cli.max_nonce, 1000);
        assert_eq!(cli.jobs, Some(2));
        assert!(cli.bench.is_none());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Cli::try_parse_from(["hashforge", "-t", "0"]).is_err());
        assert!(Cli::try_parse_from(["hashforge", "--retries", "0"]).is_err());
        assert!(Cli::try_parse_from(["hashforge", "--bench", "33"]).is_err());
    }

    #[test]
    fn default_url_parses() {
        assert_eq!(default_node_url().port(), Some(8332));
    }
}
