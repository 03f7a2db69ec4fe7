mod config;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use archive_engine::{run_archive, system_clock, RunError, VkHttpClient};
use archive_logging::{archive_error, archive_info, archive_warn};
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

use crate::config::ArchiveConfig;

const LOG_FILE: &str = "vk_archive.log";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Ignoring unreadable .env file: {err}");
        }
    }

    let config = match ArchiveConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    archive_logging::initialize(config.log_destination, LevelFilter::Info, Path::new(LOG_FILE));

    match run(config).await {
        Ok(code) => code,
        Err(err) => {
            archive_error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ArchiveConfig) -> anyhow::Result<ExitCode> {
    for line in config.describe() {
        archive_info!("{line}");
    }

    let client = VkHttpClient::new(&config.token, config.client_settings())
        .context("failed to build the HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                archive_warn!("Interrupted, finishing in-flight requests");
                cancel.cancel();
            }
        }
    });

    let summary = match run_archive(config.run_config(), Arc::new(client), cancel, system_clock()).await {
        Ok(summary) => summary,
        Err(err @ (RunError::Auth(_) | RunError::Quota | RunError::Cancelled)) => {
            archive_error!("{err}");
            eprintln!("{err}");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).context("archive run failed"),
    };

    println!("{}", summary.render());
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
