use amqproxy::config::load_env_file;
use amqproxy::{AmqpError, AmqpServer, Config, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env values must be in the environment before clap reads its env fallbacks
    let env_file = load_env_file();
    let config = Config::parse();
    init_logging(&config.log_level)?;

    match env_file? {
        Some(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
        None => tracing::debug!("no .env file found"),
    }

    let settings = config.to_handshake_settings()?;
    let server = AmqpServer::bind("amqproxy".to_string(), config.bind_address(), settings).await?;

    tracing::info!(
        addr = %server.local_addr()?,
        channel_max = config.channel_max,
        frame_max = config.frame_max,
        heartbeat = config.heartbeat,
        "starting AMQP handshake endpoint"
    );

    server.run().await
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| AmqpError::Configuration(format!("invalid log level '{level}': {e}")))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
