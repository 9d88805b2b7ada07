use crate::connection::{ConnectionParams, HandshakeSettings, default_server_properties};
use crate::constants::FRAME_MIN_SIZE;
use crate::error::{AmqpError, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

// === COMMAND LINE INTERFACE ===
#[derive(Parser, Debug, Clone)]
#[command(name = "amqproxy")]
#[command(about = "AMQP 0.9.1 connection handshake endpoint")]
#[command(version)]
pub struct Config {
    #[arg(
        short = 'H',
        long,
        env = "PROXY_CONNECTION_HOST",
        default_value = "127.0.0.1",
        help = "Address to listen on"
    )]
    pub host: String,

    #[arg(
        short,
        long,
        env = "PROXY_CONNECTION_PORT",
        default_value = "5672",
        help = "Port to listen on"
    )]
    pub port: u16,

    #[arg(
        long,
        env = "LOG_LEVEL",
        default_value = "error",
        help = "Log filter, e.g. debug or amqproxy=trace"
    )]
    pub log_level: String,

    #[arg(long, default_value = "2047", help = "channel-max proposed in connection.tune")]
    pub channel_max: u16,

    #[arg(long, default_value = "131072", help = "frame-max proposed in connection.tune")]
    pub frame_max: u32,

    #[arg(long, default_value = "60", help = "Heartbeat proposed in connection.tune, in seconds")]
    pub heartbeat: u16,

    #[arg(
        long,
        default_value = "30",
        help = "Deadline for each handshake read or write, in seconds"
    )]
    pub handshake_timeout_secs: u64,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            channel_max: self.channel_max,
            frame_max: self.frame_max,
            heartbeat: self.heartbeat,
        }
    }

    pub fn to_handshake_settings(&self) -> Result<HandshakeSettings> {
        if self.frame_max != 0 && self.frame_max < FRAME_MIN_SIZE {
            return Err(AmqpError::Configuration(format!(
                "frame-max {} is below the protocol minimum of {FRAME_MIN_SIZE}",
                self.frame_max
            )));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(AmqpError::Configuration(
                "handshake timeout must be at least one second".into(),
            ));
        }

        Ok(HandshakeSettings {
            params: self.to_connection_params(),
            io_timeout: Duration::from_secs(self.handshake_timeout_secs),
            server_properties: default_server_properties(),
        })
    }
}

// === ENVIRONMENT FILE ===

/// Loads `.env` from the working directory or one of its parents into the
/// process environment. Variables already set are left alone.
pub fn load_env_file() -> Result<Option<PathBuf>> {
    env_file_outcome(dotenvy::dotenv())
}

pub fn load_env_file_from(path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let path = path.as_ref();
    env_file_outcome(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

/// A missing file is `None`; a file that exists but cannot be parsed is an error.
fn env_file_outcome(
    result: std::result::Result<PathBuf, dotenvy::Error>,
) -> Result<Option<PathBuf>> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(AmqpError::Configuration(format!("invalid .env file: {e}"))),
    }
}
