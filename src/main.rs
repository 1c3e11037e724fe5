mod actions;
mod collectors;
mod config;
mod snapshot;

use actions::PurgeAction;
use clap::Parser;
use collectors::collect_snapshot;
use collectors::command::ShellRunner;
use config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const PURGE_WAIT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "macjet")]
#[command(version)]
#[command(about = "Samples macOS host telemetry and prints it as JSON snapshots")]
struct Cli {
    /// YAML configuration; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Refresh interval for loop mode, e.g. `2s` or `500ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Print a single snapshot and exit.
    #[arg(long, conflicts_with = "purge")]
    once: bool,
    /// Pretty-print JSON.
    #[arg(long)]
    pretty: bool,
    /// Start a privileged purge in the background and exit.
    #[arg(long, value_enum)]
    purge: Option<PurgeAction>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Some(action) = cli.purge {
        match actions::trigger(action, &cfg.helpers) {
            Ok(handle) => {
                if !actions::wait_bounded(handle, PURGE_WAIT).await {
                    info!(?action, "purge action still running, leaving it in the background");
                }
            }
            Err(err) => {
                error!(error = %err, "failed to start purge action");
                std::process::exit(1);
            }
        }
        return;
    }

    let runner = ShellRunner::new(cfg.command_timeout());

    if cli.once {
        let snapshot = collect_snapshot(&runner, &cfg).await;
        match snapshot.to_json(cli.pretty) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(error = %err, "failed to serialize snapshot");
                std::process::exit(1);
            }
        }
        return;
    }

    let interval = cli
        .interval
        .unwrap_or_else(|| Duration::from_secs(cfg.interval_secs));
    if interval.is_zero() {
        error!("interval must be greater than zero");
        std::process::exit(1);
    }

    info!(
        interval = %humantime::format_duration(interval),
        command_timeout_ms = cfg.command_timeout_ms,
        "starting macjet"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut collector_task = {
        let mut shutdown = shutdown_rx.clone();
        let pretty = cli.pretty;
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("collector loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        // the next tick is not polled until this collection finishes
                        let snapshot = collect_snapshot(&runner, &cfg).await;
                        let mut line = match snapshot.to_json(pretty) {
                            Ok(json) => json,
                            Err(err) => {
                                error!(error = %err, "failed to serialize snapshot");
                                continue;
                            }
                        };
                        line.push('\n');
                        if let Err(err) = write_line(&mut stdout, &line).await {
                            debug!(error = %err, "stdout closed");
                            break;
                        }
                    }
                }
            }
        })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                error!(error = %err, "failed to wait for Ctrl+C");
            }
            info!("received Ctrl+C, shutting down");
            let _ = shutdown_tx.send(true);
            let _ = collector_task.await;
        }
        _ = &mut collector_task => {
            info!("output closed, shutting down");
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
