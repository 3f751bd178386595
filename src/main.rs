mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use podtail_k8s::KubeClient;
use podtail_logs::Output;
use tokio_util::sync::CancellationToken;

use crate::cli::Args;
use crate::settings::{FileConfig, build_config};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_app(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(mut args: Args) -> Result<()> {
    let file = FileConfig::load(args.config.as_deref())?;
    args.merge(file);

    let config = build_config(&args, Output::stdio())?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, shutting down");
                cancel.cancel();
            }
        }
    });

    if config.stdin {
        return podtail_engine::tail_stdin(&config, &cancel)
            .await
            .context("failed to tail stdin");
    }

    let client = KubeClient::connect(args.kubeconfig.as_deref(), args.context.as_deref())
        .await
        .context("failed to connect to the cluster")?;

    podtail_engine::run(Arc::new(client), config, cancel).await?;
    Ok(())
}
