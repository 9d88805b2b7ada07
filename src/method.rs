use crate::connection::ConnectionParams;
use crate::constants::{self, ProtocolVersion};
use crate::error::{AmqpError, Result};
use crate::field::{
    self, FieldTable, decode_long_string, decode_short_string, decode_table, read_array,
};
use crate::frame::Frame;
use std::io::Cursor;

// === METHOD ARGUMENTS ===

/// One positional argument of an outgoing method.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArg {
    Octet(u8),
    Short(u16),
    Long(u32),
    LongLong(u64),
    ShortString(String),
    LongString(Vec<u8>),
    /// Consecutive bits, packed eight to an octet starting at bit 0.
    Bits(Vec<bool>),
    Table(FieldTable),
}

impl MethodArg {
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            MethodArg::Octet(v) => buf.push(*v),
            MethodArg::Short(v) => buf.extend_from_slice(&v.to_be_bytes()),
            MethodArg::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            MethodArg::LongLong(v) => buf.extend_from_slice(&v.to_be_bytes()),
            MethodArg::ShortString(s) => field::encode_short_string(buf, s)?,
            MethodArg::LongString(data) => field::encode_long_string(buf, data)?,
            MethodArg::Bits(flags) => buf.extend(flags.chunks(8).map(|octet| {
                octet
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &flag)| acc | (u8::from(flag) << i))
            })),
            MethodArg::Table(table) => field::encode_table(buf, table)?,
        }
        Ok(())
    }
}

pub fn build_method_payload(class_id: u16, method_id: u16, args: &[MethodArg]) -> Result<Vec<u8>> {
    let mut payload = [class_id.to_be_bytes(), method_id.to_be_bytes()].concat();
    for arg in args {
        arg.encode(&mut payload)?;
    }
    Ok(payload)
}

pub fn build_method_frame(
    channel: u16,
    class_id: u16,
    method_id: u16,
    args: &[MethodArg],
) -> Result<Frame> {
    Ok(Frame::method(
        channel,
        build_method_payload(class_id, method_id, args)?,
    ))
}

// === CONNECTION FRAMES ===

pub fn build_connection_start_frame(
    version: ProtocolVersion,
    server_properties: &FieldTable,
) -> Result<Frame> {
    build_method_frame(
        constants::CONNECTION_CHANNEL,
        constants::CONNECTION_CLASS,
        constants::CONNECTION_START,
        &[
            MethodArg::Octet(version.major),
            MethodArg::Octet(version.minor),
            MethodArg::Table(server_properties.clone()),
            MethodArg::LongString(constants::MECHANISMS.as_bytes().to_vec()),
            MethodArg::LongString(constants::LOCALES.as_bytes().to_vec()),
        ],
    )
}

pub fn build_connection_tune_frame(params: &ConnectionParams) -> Result<Frame> {
    build_method_frame(
        constants::CONNECTION_CHANNEL,
        constants::CONNECTION_CLASS,
        constants::CONNECTION_TUNE,
        &[
            MethodArg::Short(params.channel_max),
            MethodArg::Long(params.frame_max),
            MethodArg::Short(params.heartbeat),
        ],
    )
}

pub fn build_connection_open_ok_frame() -> Result<Frame> {
    build_method_frame(
        constants::CONNECTION_CHANNEL,
        constants::CONNECTION_CLASS,
        constants::CONNECTION_OPEN_OK,
        &[MethodArg::ShortString(String::new())], // reserved
    )
}

// === INCOMING METHODS ===

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStartOk {
    pub client_properties: FieldTable,
    pub mechanism: String,
    pub response: Vec<u8>,
    pub locale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTuneOk {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOpen {
    pub virtual_host: String,
    pub reserved1: String,
    pub reserved2: bool,
}

/// The client methods this endpoint understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    StartOk(ConnectionStartOk),
    TuneOk(ConnectionTuneOk),
    Open(ConnectionOpen),
}

pub fn parse_method_header(payload: &[u8]) -> Result<(u16, u16, &[u8])> {
    match payload {
        [class_hi, class_lo, method_hi, method_lo, args @ ..] => Ok((
            u16::from_be_bytes([*class_hi, *class_lo]),
            u16::from_be_bytes([*method_hi, *method_lo]),
            args,
        )),
        _ => Err(AmqpError::Decode(format!(
            "method payload of {} bytes has no class/method header",
            payload.len()
        ))),
    }
}

impl Method {
    /// Decodes a method frame payload. The argument list must use up the
    /// payload exactly.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (class_id, method_id, args) = parse_method_header(payload)?;
        let mut reader = Cursor::new(args);

        let method = match (class_id, method_id) {
            (constants::CONNECTION_CLASS, constants::CONNECTION_START_OK) => {
                Method::StartOk(ConnectionStartOk {
                    client_properties: decode_table(&mut reader)?,
                    mechanism: decode_short_string(&mut reader)?,
                    response: decode_long_string(&mut reader)?,
                    locale: decode_short_string(&mut reader)?,
                })
            }
            (constants::CONNECTION_CLASS, constants::CONNECTION_TUNE_OK) => {
                Method::TuneOk(ConnectionTuneOk {
                    channel_max: u16::from_be_bytes(read_array(&mut reader)?),
                    frame_max: u32::from_be_bytes(read_array(&mut reader)?),
                    heartbeat: u16::from_be_bytes(read_array(&mut reader)?),
                })
            }
            (constants::CONNECTION_CLASS, constants::CONNECTION_OPEN) => {
                let virtual_host = decode_short_string(&mut reader)?;
                let reserved1 = decode_short_string(&mut reader)?;
                let [bits] = read_array::<1>(&mut reader)?;
                Method::Open(ConnectionOpen {
                    virtual_host,
                    reserved1,
                    reserved2: bits & 1 != 0,
                })
            }
            _ => {
                return Err(AmqpError::UnsupportedMethod {
                    class_id,
                    method_id,
                });
            }
        };

        let consumed = reader.position() as usize;
        if consumed != args.len() {
            return Err(AmqpError::Decode(format!(
                "{} carries {} unexpected trailing bytes",
                method.name(),
                args.len() - consumed
            )));
        }

        Ok(method)
    }

    pub fn class_id(&self) -> u16 {
        constants::CONNECTION_CLASS
    }

    pub fn method_id(&self) -> u16 {
        match self {
            Method::StartOk(_) => constants::CONNECTION_START_OK,
            Method::TuneOk(_) => constants::CONNECTION_TUNE_OK,
            Method::Open(_) => constants::CONNECTION_OPEN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::StartOk(_) => "connection.start-ok",
            Method::TuneOk(_) => "connection.tune-ok",
            Method::Open(_) => "connection.open",
        }
    }

    fn args(&self) -> Vec<MethodArg> {
        match self {
            Method::StartOk(m) => vec![
                MethodArg::Table(m.client_properties.clone()),
                MethodArg::ShortString(m.mechanism.clone()),
                MethodArg::LongString(m.response.clone()),
                MethodArg::ShortString(m.locale.clone()),
            ],
            Method::TuneOk(m) => vec![
                MethodArg::Short(m.channel_max),
                MethodArg::Long(m.frame_max),
                MethodArg::Short(m.heartbeat),
            ],
            Method::Open(m) => vec![
                MethodArg::ShortString(m.virtual_host.clone()),
                MethodArg::ShortString(m.reserved1.clone()),
                MethodArg::Bits(vec![m.reserved2]),
            ],
        }
    }

    /// Encodes the method the way a client sends it.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        build_method_payload(self.class_id(), self.method_id(), &self.args())
    }

    pub fn to_frame(&self, channel: u16) -> Result<Frame> {
        Ok(Frame::method(channel, self.to_payload()?))
    }
}
