mod api;
mod cli;
mod control;
mod convert;
mod executor;
mod expression;
mod schedule;
mod scheduler;
mod tracker;

use std::sync::Arc;

use anyhow::Context;
use chronod_domain::{ConfigSeverity, DaemonConfig};
use clap::Parser;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use schedule::Schedule;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,chronod=debug")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server().await,
        Command::Validate => run_validate(),
        Command::Convert { input, output } => {
            let count = convert::convert(&input, &output)?;
            println!("converted {count} crontab entries into {}", output.display());
            Ok(())
        }
    }
}

fn load_and_check_config() -> anyhow::Result<DaemonConfig> {
    let config = DaemonConfig::load(&cli::config_path()).context("failed to load configuration")?;
    let issues = config.validate();
    let mut has_error = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => {
                has_error = true;
                tracing::error!("{issue}");
            }
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if has_error {
        anyhow::bail!("configuration has {} error(s); refusing to start", issues.len());
    }
    Ok(config)
}

fn run_validate() -> anyhow::Result<()> {
    let config = load_and_check_config()?;
    match Schedule::load(&config.job_config_path) {
        Ok(schedule) => {
            println!("job table OK: {} job(s)", schedule.len());
            Ok(())
        }
        Err(err) => {
            eprintln!("job table invalid: {err}");
            std::process::exit(1);
        }
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = load_and_check_config()?;

    tracing::info!(path = %config.job_config_path.display(), "reading job configuration file");
    let initial_schedule = Schedule::load(&config.job_config_path)
        .with_context(|| format!("cannot read job configuration at {}", config.job_config_path.display()))?;

    let (control_handle, control_rx) = control::channel(32);
    let loop_ = scheduler::SchedulerLoop::new(
        initial_schedule,
        config.logs_root.clone(),
        config.job_config_path.clone(),
        control_rx,
    );
    tracing::info!("starting scheduling loop");
    tokio::spawn(loop_.run());

    let api_token_hash = api::auth::hash_token_env(&config.api_token_env);
    let shutdown_notify = Arc::new(Notify::new());
    let state = api::AppState {
        control: control_handle.clone(),
        api_token_hash,
        shutdown_notify: shutdown_notify.clone(),
    };

    let router = api::build_router(state, &config.server.cors.allowed_origins, 256);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "starting HTTP control plane");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_notify, control_handle))
        .await?;

    Ok(())
}

/// Wait for either a ctrl-c or an HTTP-triggered `/shutdown` request. On
/// ctrl-c, also tell the scheduler loop to exit.
async fn shutdown_signal(notify: Arc<Notify>, control: control::ControlHandle) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            let _ = control.send(control::ControlRequest::Shutdown).await;
        }
        _ = notify.notified() => {
            tracing::info!("received shutdown request over HTTP");
        }
    }
}
