mod bench;
mod cli;
mod constants;
mod format;
mod shutdown;
mod ui;

use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use tracing_subscriber::EnvFilter;

use hashforge_client_core::node::{NodeConfig, ensure_node_config};
use hashforge_client_engine::{EngineConfig, EngineEvent, RetryPolicy, start_engine};

use crate::bench::run_benchmark;
use crate::cli::{Cli, default_node_url};
use crate::constants::STATUS_REFRESH_INTERVAL;
use crate::format::format_job_done_line;
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_ctrl_c_handler};
use crate::ui::Ui;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Saved node config overlaid with whatever was given on the command line.
fn resolve_node(cli: &Cli, saved: NodeConfig) -> anyhow::Result<(Url, NodeConfig)> {
    let node = saved.merged_with(NodeConfig {
        url: cli.node_url.as_ref().map(Url::to_string),
        user: cli.rpc_user.clone(),
        password: cli.rpc_password.clone(),
    });
    let url = match node.url.as_deref() {
        Some(raw) => Url::parse(raw).with_context(|| format!("invalid node URL {raw:?}"))?,
        None => default_node_url(),
    };
    Ok((url, node))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    if let Some(log2_nonces) = cli.bench {
        run_benchmark(log2_nonces, usize::from(cli.threads))?;
        return Ok(());
    }

    let interactive = std::io::stdin().is_terminal() && cli.node_url.is_none();
    let saved = match ensure_node_config(interactive) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => NodeConfig::default(),
        Err(err) => {
            eprintln!("warning: failed to read/write node config: {err:#}");
            NodeConfig::default()
        }
    };
    let (node_url, node) = resolve_node(&cli, saved)?;

    let status_enabled = !cli.no_status && std::io::stdout().is_terminal();
    let threads = usize::from(cli.threads);

    let engine = start_engine(EngineConfig {
        node_url: node_url.clone(),
        rpc_user: node.user,
        rpc_password: node.password,
        threads: Some(threads),
        max_nonce: cli.max_nonce,
        retry: RetryPolicy {
            max_failures: cli.retries,
            delay: Duration::from_secs(cli.retry_delay),
        },
        idle_sleep: Duration::ZERO,
        progress_tick: Duration::ZERO,
        recent_jobs_max: 0,
        max_jobs: cli.jobs,
    });

    let mut events = engine.subscribe();

    let shutdown = std::sync::Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown, shutdown_tx);

    let startup = format!(
        "hashforge {} node={} threads={}",
        env!("CARGO_PKG_VERSION"),
        node_url,
        threads
    );

    let mut ui = status_enabled.then(Ui::new);
    if let Some(ui) = &ui {
        ui.println(&startup);
    } else {
        println!("{startup}");
    }

    let mut ticker = tokio::time::interval(STATUS_REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut immediate_exit = false;

    loop {
        tokio::select! {
            ev_opt = shutdown_rx.recv() => {
                match ev_opt {
                    Some(ShutdownEvent::Graceful) => {
                        let msg = "Stop requested: cancelling the current search (press CTRL+C again to exit immediately).";
                        if let Some(ui) = &mut ui {
                            ui.set_stop_message(msg);
                        } else {
                            eprintln!("{msg}");
                        }
                        engine.request_stop();
                    }
                    Some(ShutdownEvent::Immediate) => {
                        let msg = "Stop requested again: exiting immediately.";
                        if let Some(ui) = &mut ui {
                            ui.set_stop_message(msg);
                        } else {
                            eprintln!("{msg}");
                        }
                        immediate_exit = true;
                        break;
                    }
                    None => {}
                }
            }
            _ = ticker.tick(), if status_enabled => {
                if let Some(ui) = &mut ui {
                    let snap = engine.snapshot();
                    ui.set_totals(snap.accepted, snap.rejected);
                    ui.tick();
                }
            }
            evt = events.recv() => {
                let evt = match evt {
                    Ok(v) => v,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                match evt {
                    EngineEvent::Started | EngineEvent::StopRequested => {}
                    EngineEvent::JobStarted { job } => {
                        tracing::debug!(job_id = job.job_id, target = %job.target, "job started");
                        if let Some(ui) = &mut ui {
                            ui.set_job(&job);
                        }
                    }
                    EngineEvent::Progress { hashes_done, hashes_per_sec } => {
                        if let Some(ui) = &mut ui {
                            ui.set_progress(hashes_done, hashes_per_sec);
                        }
                    }
                    EngineEvent::JobFinished { outcome } => {
                        if let Some(ui) = &mut ui {
                            ui.set_idle();
                        }
                        let line = format_job_done_line(&outcome);
                        if let Some(ui) = &ui {
                            ui.println(&line);
                        } else {
                            println!("{line}");
                        }
                    }
                    EngineEvent::Warning { message } | EngineEvent::Error { message } => {
                        if let Some(ui) = &ui {
                            ui.println(&message);
                        } else {
                            eprintln!("{message}");
                        }
                    }
                    EngineEvent::Stopped => break,
                }
            }
        }
    }

    if let Some(ui) = &ui {
        ui.freeze();
    }

    if immediate_exit {
        std::process::exit(130);
    }

    engine.wait().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_saved_node() {
        let cli = Cli::try_parse_from(["hashforge", "--rpc-user", "bob"]).unwrap();
        let saved = NodeConfig {
            url: Some("http://saved:8332/".to_string()),
            user: Some("alice".to_string()),
            password: Some("pw".to_string()),
        };

        let (url, node) = resolve_node(&cli, saved).unwrap();
        assert_eq!(url.as_str(), "http://saved:8332/");
        assert_eq!(node.user.as_deref(), Some("bob"));
        assert_eq!(node.password.as_deref(), Some("pw"));
    }

    #[test]
    fn falls_back_to_default_url() {
        let cli = Cli::try_parse_from(["hashforge"]).unwrap();
        let (url, _) = resolve_node(&cli, NodeConfig::default()).unwrap();
        assert_eq!(url, default_node_url());
    }

    #[test]
    fn bad_saved_url_is_an_error() {
        let cli = Cli::try_parse_from(["hashforge"]).unwrap();
        let saved = NodeConfig {
            url: Some("not a url".to_string()),
            ..NodeConfig::default()
        };
        assert!(resolve_node(&cli, saved).is_err());
    }
}
