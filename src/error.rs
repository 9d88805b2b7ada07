use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmqpError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Framing: {0}")]
    Framing(String),
    #[error("Protocol mismatch: unsupported protocol header {0:?}")]
    ProtocolMismatch(Vec<u8>),
    #[error("Decode: unsupported field type '{}' (0x{:02x})", tag_char(.0), .0)]
    UnsupportedFieldType(u8),
    #[error("Decode: unsupported method {method_id} for class {class_id} ({})", class_label(.class_id))]
    UnsupportedMethod { class_id: u16, method_id: u16 },
    #[error("Decode: {0}")]
    Decode(String),
    #[error("Encode: {0}")]
    Encode(String),
    #[error("Sequence: expected {expected}, received {received}")]
    UnexpectedMethod {
        expected: &'static str,
        received: String,
    },
    #[error("Connection: {0}")]
    Connection(String),
    #[error("Configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, AmqpError>;

fn tag_char(tag: &u8) -> char {
    char::from(*tag)
}

fn class_label(class_id: &u16) -> &'static str {
    crate::constants::class_name(*class_id).unwrap_or("unknown class")
}
