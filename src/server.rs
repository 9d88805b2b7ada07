use crate::connection::{Connection, HandshakeSettings};
use crate::error::{AmqpError, Result};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use uuid::Uuid;

/// Accepts TCP clients and runs the connection handshake for each one on its
/// own task. Connections are closed once the handshake has finished.
pub struct AmqpServer {
    server_id: String,
    listener: TcpListener,
    settings: HandshakeSettings,
}

impl AmqpServer {
    pub async fn bind(
        server_id: String,
        addr: impl ToSocketAddrs,
        settings: HandshakeSettings,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AmqpError::Connection(format!("Failed to bind listener: {}", e)))?;

        Ok(Self {
            server_id,
            listener,
            settings,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| AmqpError::Connection(format!("Failed to get local address: {}", e)))
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!(server = %self.server_id, addr = %self.local_addr()?, "listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = format!("conn-{}-{}", addr, Uuid::new_v4().simple());
                    let settings = self.settings.clone();
                    tokio::spawn(handle_connection(conn_id, stream, addr, settings));
                }
                Err(e) => {
                    tracing::warn!(server = %self.server_id, error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    conn_id: String,
    stream: TcpStream,
    addr: SocketAddr,
    settings: HandshakeSettings,
) {
    tracing::debug!(conn = %conn_id, peer = %addr, "start connection");

    let mut connection = Connection::new(conn_id.clone(), stream, settings);
    match connection.open().await {
        Ok(outcome) => {
            tracing::info!(
                conn = %conn_id,
                peer = %addr,
                vhost = %outcome.virtual_host,
                mechanism = %outcome.mechanism,
                "connection opened"
            );
        }
        Err(e) => {
            tracing::warn!(
                conn = %conn_id,
                peer = %addr,
                state = ?connection.failed_during(),
                error = %e,
                "handshake failed"
            );
        }
    }

    tracing::debug!(conn = %conn_id, "stop connection");
}
