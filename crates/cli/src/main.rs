use spreadsheet_session_core::adapters::config::app_config::AppConfig;
use spreadsheet_session_core::prettyprint::prettyprint::PrettyFormatter;
use std::env;
use std::sync::Arc;
use tracing::{error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

mod backend_factory;
mod cli_adapter;

use backend_factory::BackendFactory;
use cli_adapter::CliAdapter;

const LOG_FILE: &str = "spreadsheet_session.log";

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing()?;
    setup_panic_hook();

    let args: Vec<String> = env::args().collect();

    info!("Starting spreadsheet-session CLI");

    let config = AppConfig::from_env().map_err(|report| {
        error!("Failed to load configuration: {:?}", report);
        format!("Failed to load configuration: {:?}", report)
    })?;

    let (backend, default_lookup) = BackendFactory::create(&config).await?;
    let cli_adapter = Arc::new(CliAdapter::new(backend, default_lookup));

    match cli_adapter.run(args).await {
        Ok(_) => {
            info!("CLI execution completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("CLI execution failed: {:?}", e);
            Err(e)
        }
    }
}

fn setup_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .event_format(PrettyFormatter::new(true))
        .with_writer(std::io::stderr);

    let log_file_layer = tracing_subscriber::fmt::layer()
        .event_format(PrettyFormatter::new(false))
        .with_writer(std::fs::File::create(LOG_FILE)?)
        .with_ansi(false);

    Registry::default()
        .with(
            tracing_subscriber::filter::Targets::new()
                .with_target("spreadsheet_session", tracing::Level::TRACE)
                .with_target("spreadsheet_session_core", tracing::Level::TRACE),
        )
        .with(log_file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

fn setup_panic_hook() {
    tracing::trace!("Setting panic hook");
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("panic: {info}");
    }));
}
