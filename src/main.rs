//! the ingestion driver: resolve config, run the pipeline, map exit codes
use {
    booru_sync::{
        config::SyncConfig, error::SyncError, interrupt::InterruptHandler, logging,
        net::Session, pipeline::ImportPipeline, plugins::Registry,
    },
    std::{process::ExitCode, sync::Arc},
    tracing::{error, info},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match SyncConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to resolve configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::setup(&cfg.logging) {
        eprintln!("failed to set up logging: {err}");
        return ExitCode::FAILURE;
    }

    if cfg.urls.is_empty() {
        error!("no source urls configured, nothing to do");
        return ExitCode::FAILURE;
    }

    let session = match Session::new(cfg.limit_per_host, cfg.cookies_file.as_deref()) {
        Ok(session) => Arc::new(session),
        Err(err) => {
            error!(%err, "failed to build the http session");
            return ExitCode::FAILURE;
        }
    };

    let interrupt = InterruptHandler::new();
    interrupt.listen();

    let registry = Arc::new(Registry::new(&cfg, session));
    let urls = cfg.urls.clone();

    let mut pipeline = match ImportPipeline::new(cfg, registry, interrupt) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(%err, "failed to build the pipeline");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run(&urls).await {
        Ok(()) => {
            info!("synchronization complete");
            ExitCode::SUCCESS
        }
        Err(SyncError::Interrupted) => {
            error!("interrupted, scratch folders removed");
            ExitCode::from(130)
        }
        Err(err) => {
            error!(%err, "synchronization failed");
            ExitCode::FAILURE
        }
    }
}
