use crate::constants;
use crate::error::{AmqpError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Method,
    Header,
    Body,
    Heartbeat,
}

impl FrameType {
    pub fn wire_value(&self) -> u8 {
        match self {
            FrameType::Method => constants::FRAME_METHOD,
            FrameType::Header => constants::FRAME_CONTENT_HEADER,
            FrameType::Body => constants::FRAME_CONTENT_BODY,
            FrameType::Heartbeat => constants::FRAME_HEARTBEAT,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FrameType::Method => "method",
            FrameType::Header => "content header",
            FrameType::Body => "content body",
            FrameType::Heartbeat => "heartbeat",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = AmqpError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            constants::FRAME_METHOD => Ok(FrameType::Method),
            constants::FRAME_CONTENT_HEADER => Ok(FrameType::Header),
            constants::FRAME_CONTENT_BODY => Ok(FrameType::Body),
            constants::FRAME_HEARTBEAT => Ok(FrameType::Heartbeat),
            other => Err(AmqpError::Framing(format!("unknown frame type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub channel: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, channel: u16, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            channel,
            payload,
        }
    }

    pub fn method(channel: u16, payload: Vec<u8>) -> Self {
        Self::new(FrameType::Method, channel, payload)
    }

    /// Wire layout: type, channel, size, payload, end octet.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = u32::try_from(self.payload.len()).map_err(|_| {
            AmqpError::Encode(format!(
                "frame payload of {} bytes does not fit a 32-bit size",
                self.payload.len()
            ))
        })?;

        Ok([
            &[self.frame_type.wire_value()][..],
            &self.channel.to_be_bytes(),
            &size.to_be_bytes(),
            &self.payload,
            &[constants::FRAME_END_BYTE],
        ]
        .concat())
    }
}

/// Reads one frame. `frame_max` bounds the whole frame including the eight
/// octets of envelope; zero means no limit.
pub async fn read_frame<R>(reader: &mut R, frame_max: u32) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; constants::FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let frame_type = FrameType::try_from(header[0])?;
    let channel = u16::from_be_bytes([header[1], header[2]]);
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]);

    if frame_max != 0 && size.saturating_add(constants::FRAME_OVERHEAD) > frame_max {
        return Err(AmqpError::Framing(format!(
            "frame of {size} payload bytes exceeds frame-max {frame_max}"
        )));
    }

    let mut payload = Vec::new();
    (&mut *reader)
        .take(u64::from(size))
        .read_to_end(&mut payload)
        .await?;
    if payload.len() != size as usize {
        return Err(AmqpError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("frame payload ended after {} of {size} bytes", payload.len()),
        )));
    }

    let end = reader.read_u8().await?;
    if end != constants::FRAME_END_BYTE {
        return Err(AmqpError::Framing(format!(
            "frame end octet 0x{end:02x}, expected 0x{:02x}",
            constants::FRAME_END_BYTE
        )));
    }

    Ok(Frame::new(frame_type, channel, payload))
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(bytes.len())
}

async fn with_deadline<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AmqpError::Timeout(format!(
            "{operation} did not complete within {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Owns the byte stream of one connection and puts a deadline on every read
/// and write, so a silent peer cannot stall its task forever.
pub struct FrameTransport<S> {
    stream: S,
    io_timeout: Duration,
    frame_max: u32,
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Duration, frame_max: u32) -> Self {
        Self {
            stream,
            io_timeout,
            frame_max,
        }
    }

    pub async fn read_protocol_header(&mut self) -> Result<[u8; 8]> {
        let stream = &mut self.stream;
        with_deadline(self.io_timeout, "protocol header read", async move {
            let mut header = [0u8; 8];
            stream.read_exact(&mut header).await?;
            Ok(header)
        })
        .await
    }

    pub async fn read_frame(&mut self) -> Result<Frame> {
        with_deadline(
            self.io_timeout,
            "frame read",
            read_frame(&mut self.stream, self.frame_max),
        )
        .await
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        with_deadline(
            self.io_timeout,
            "frame write",
            write_frame(&mut self.stream, frame),
        )
        .await
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
