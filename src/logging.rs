//! logging stuff
use {
    crate::{
        config::{LoggingFormat, LoggingOptions},
        error::Result,
        utils::string_to_log_level,
    },
    tracing::{info, subscriber},
    tracing_subscriber::FmtSubscriber,
};

/// setup logging
pub fn setup(options: &LoggingOptions) -> Result<()> {
    if !options.enable {
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(string_to_log_level(&options.level))
        .with_ansi(options.ansi)
        .with_target(false);

    let installed = match options.format {
        LoggingFormat::Pretty => subscriber::set_global_default(subscriber.pretty().finish()),
        LoggingFormat::Compact => subscriber::set_global_default(subscriber.compact().finish()),
    };

    installed.map_err(|e| crate::error::SyncError::Other(e.to_string()))?;

    info!("logging setup successfully");
    Ok(())
}
