//! Server-side AMQP 0-9-1 endpoint: the frame and field-value codec plus the
//! connection-opening handshake.

pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod field;
pub mod frame;
pub mod method;
pub mod server;

pub use config::Config;
pub use connection::{
    Connection, ConnectionParams, HandshakeOutcome, HandshakeSettings, HandshakeState,
};
pub use error::{AmqpError, Result};
pub use field::{Decimal, FieldTable, FieldValue};
pub use frame::{Frame, FrameTransport, FrameType};
pub use method::{Method, MethodArg};
pub use server::AmqpServer;
