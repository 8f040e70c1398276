use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fastls::config::ServerArgs;
use fastls::FetchExecutor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fastls=info".parse()?))
        .with_target(false)
        .init();

    let args = ServerArgs::parse();
    let config = args.engine_config();
    info!(
        max_redirects = config.max_redirects,
        max_in_flight = ?config.max_in_flight,
        max_body_size = config.max_body_size,
        verify_certificates = config.verify_certificates,
        "starting fastls"
    );

    let executor = FetchExecutor::new(config);
    tokio::select! {
        result = fastls::server::run(&args, executor) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
