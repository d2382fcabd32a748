#![forbid(unsafe_code)]

//! `operator-relay`: terminal operator relay binary.
//!
//! Bootstraps configuration, connects to Slack over Socket Mode, starts the
//! operator input reader on stdin, and runs the relay worker until a
//! shutdown signal arrives or operator input ends.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use operator_relay::config::GlobalConfig;
use operator_relay::input::reader::InputLineSource;
use operator_relay::input::terminal::CrlfWriter;
use operator_relay::input::InputGranularity;
use operator_relay::relay::console::OperatorConsole;
use operator_relay::relay::ingress::EventIngress;
use operator_relay::relay::queue::DeliveryQueue;
use operator_relay::relay::worker::RelayWorker;
use operator_relay::slack::client::SlackService;
use operator_relay::{AppError, Result};

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "operator-relay", about = "Relay Slack messages to a terminal operator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the reply inactivity window from the config file.
    #[arg(long)]
    deadline_seconds: Option<u64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("operator-relay bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(seconds) = args.deadline_seconds {
        config.set_deadline_seconds(seconds)?;
    }
    config.load_credentials().await?;
    info!(
        deadline_secs = config.capture.deadline_seconds,
        granularity = ?config.capture.granularity,
        "configuration loaded"
    );

    // ── Start Slack ─────────────────────────────────────
    let queue = DeliveryQueue::new();
    let ingress = EventIngress::new(queue.clone());
    let (slack, slack_runtime) = SlackService::start(&config.slack, ingress)
        .await
        .map_err(|err| {
            error!(%err, "slack service start failed");
            err
        })?;

    // ── Start operator input and the worker ─────────────
    let ct = CancellationToken::new();
    let (input_source, units) = if std::io::stdin().is_terminal()
        && config.capture.granularity == InputGranularity::Keystroke
    {
        InputLineSource::spawn_terminal(ct.clone())?
    } else {
        InputLineSource::spawn(std::io::stdin(), config.capture.granularity)?
    };
    let mut console = if input_source.is_raw() {
        OperatorConsole::raw_terminal()
    } else {
        OperatorConsole::stdout()
    };
    console.banner(config.capture_deadline());

    let worker = RelayWorker::new(
        queue.clone(),
        units,
        Arc::new(slack),
        console,
        config.worker_settings(),
    );
    let mut worker_handle =
        tokio::spawn(worker.run(ct.clone()).instrument(info_span!("relay_worker")));

    info!("operator relay ready");

    // ── Wait for shutdown signal or end of input ────────
    let worker_finished = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            false
        }
        () = ct.cancelled() => {
            info!("operator interrupt received");
            false
        }
        joined = &mut worker_handle => {
            if let Err(err) = joined {
                error!(%err, "relay worker task failed");
            }
            true
        }
    };
    ct.cancel();

    if !worker_finished {
        if let Err(err) = worker_handle.await {
            error!(%err, "relay worker task failed");
        }
    }
    slack_runtime.socket_task.abort();
    let input_finished = input_source.is_finished();
    drop(input_source);

    info!(
        pending = queue.len(),
        input_finished,
        "operator-relay shut down"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs go to stderr so they never interleave with the operator prompt on
/// stdout. On a terminal the operator input may switch it to raw mode, so
/// line endings are written as `\r\n` there.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let crlf = std::io::stdin().is_terminal();
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(move || CrlfWriter::new(std::io::stderr(), crlf));

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
