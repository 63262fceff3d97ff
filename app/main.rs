mod cli;
mod config;
mod errors;
mod util;

use clap::Parser;
use cli::AppCli;
use config::AppConfig;
use time::macros::format_description;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level};
use tracing_subscriber::{EnvFilter, fmt::time::LocalTime};

use crate::util::parse_log_level;

#[tokio::main]
async fn main() {
    let cli_args = AppCli::parse();

    let mut app_config = match AppConfig::load(cli_args.config.as_ref().map(|p| p.display().to_string())) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    app_config.apply(cli_args);
    if let Err(err) = app_config.validate() {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    }

    let log_level = parse_log_level(&app_config.logger.level).unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_timer(LocalTime::new(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] [unix_timestamp precision:nanosecond]"
        )))
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_target(true)
        .with_env_filter(EnvFilter::from_env("LOG_LEVEL"))
        .finish();
    tracing::dispatcher::set_global_default(Dispatch::new(subscriber)).unwrap();

    tracing::info!("starting rtmp server");

    let rtmp_server_config = app_config.rtmp_server_config();
    let server = rtmp_server::server::RtmpServer::new(
        rtmp_server_config,
        rtmp_server::callbacks::ServerCallbacks::default(),
    );

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        if let Err(err) = server.serve(server_shutdown).await {
            tracing::error!(%err, "rtmp server exited with an error");
        }
    });

    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received, stopping server");
    shutdown.cancel();
    let _ = server_task.await;
}
