use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::application::dto::{MessageResponse, PublishRequest, PublishResponse, SubscribeRequest};
use crate::domain::errors::BrokerError;

/// API keys for the broker's request types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKey {
    Publish = 0,
    Subscribe = 1,
    Health = 2,
}

impl TryFrom<i16> for ApiKey {
    type Error = &'static str;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApiKey::Publish),
            1 => Ok(ApiKey::Subscribe),
            2 => Ok(ApiKey::Health),
            _ => Err("Unknown API key"),
        }
    }
}

/// Error codes carried in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown = -1,
    None = 0,
    TopicNotFound = 1,
    PartitionNotFound = 2,
    OffsetNotFound = 3,
    InvalidArgument = 4,
    /// Clean end of a subscription stream
    Cancelled = 5,
}

impl From<&BrokerError> for ErrorCode {
    fn from(err: &BrokerError) -> Self {
        match err {
            BrokerError::TopicNotFound(_) => ErrorCode::TopicNotFound,
            BrokerError::PartitionNotFound(_, _) => ErrorCode::PartitionNotFound,
            BrokerError::OffsetNotFound { .. } => ErrorCode::OffsetNotFound,
            BrokerError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            BrokerError::Cancelled => ErrorCode::Cancelled,
        }
    }
}

impl From<i16> for ErrorCode {
    fn from(value: i16) -> Self {
        match value {
            0 => ErrorCode::None,
            1 => ErrorCode::TopicNotFound,
            2 => ErrorCode::PartitionNotFound,
            3 => ErrorCode::OffsetNotFound,
            4 => ErrorCode::InvalidArgument,
            5 => ErrorCode::Cancelled,
            _ => ErrorCode::Unknown,
        }
    }
}

impl WireEncodable for ErrorCode {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i16(buf, *self as i16);
        Ok(())
    }
}

/// Request header
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub correlation_id: i32,
}

impl RequestHeader {
    /// Correlation id of a raw request, readable even when the api key is not
    pub fn peek_correlation_id(frame: &[u8]) -> Option<i32> {
        frame.get(2..6)?.try_into().ok().map(i32::from_be_bytes)
    }
}

/// Response header
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

/// Trait for encoding protocol messages
pub trait WireEncodable {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()>;
}

/// Trait for decoding protocol messages
pub trait WireDecodable: Sized {
    fn decode(buf: &mut BytesMut) -> io::Result<Self>;
}

// Helper functions for encoding/decoding primitive types

fn not_enough_bytes() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "Not enough bytes")
}

pub fn encode_i8(buf: &mut BytesMut, value: i8) {
    buf.put_i8(value);
}

pub fn decode_i8(buf: &mut BytesMut) -> io::Result<i8> {
    if buf.remaining() < 1 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i8())
}

pub fn encode_i16(buf: &mut BytesMut, value: i16) {
    buf.put_i16(value);
}

pub fn decode_i16(buf: &mut BytesMut) -> io::Result<i16> {
    if buf.remaining() < 2 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i16())
}

pub fn encode_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn decode_i32(buf: &mut BytesMut) -> io::Result<i32> {
    if buf.remaining() < 4 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i32())
}

pub fn encode_i64(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn decode_i64(buf: &mut BytesMut) -> io::Result<i64> {
    if buf.remaining() < 8 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i64())
}

pub fn encode_string(buf: &mut BytesMut, value: Option<&str>) -> io::Result<()> {
    match value {
        Some(s) => {
            let bytes = s.as_bytes();
            let len = i16::try_from(bytes.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "String too long"))?;
            encode_i16(buf, len);
            buf.put_slice(bytes);
        }
        None => {
            encode_i16(buf, -1);
        }
    }
    Ok(())
}

pub fn decode_string(buf: &mut BytesMut) -> io::Result<Option<String>> {
    let len = decode_i16(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Invalid string length",
        ));
    }
    if buf.remaining() < len as usize {
        return Err(not_enough_bytes());
    }

    let bytes = buf.split_to(len as usize);
    let s = String::from_utf8(bytes.to_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))?;
    Ok(Some(s))
}

fn decode_required_string(buf: &mut BytesMut, field: &str) -> io::Result<String> {
    decode_string(buf)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, format!("{} cannot be null", field))
    })
}

pub fn encode_bytes(buf: &mut BytesMut, value: Option<&[u8]>) -> io::Result<()> {
    match value {
        Some(bytes) => {
            let len = i32::try_from(bytes.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Bytes too long"))?;
            encode_i32(buf, len);
            buf.put_slice(bytes);
        }
        None => {
            encode_i32(buf, -1);
        }
    }
    Ok(())
}

pub fn decode_bytes(buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
    let len = decode_i32(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Invalid bytes length",
        ));
    }
    if buf.remaining() < len as usize {
        return Err(not_enough_bytes());
    }

    Ok(Some(buf.split_to(len as usize).freeze()))
}

impl WireEncodable for RequestHeader {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i16(buf, self.api_key as i16);
        encode_i32(buf, self.correlation_id);
        Ok(())
    }
}

impl WireDecodable for RequestHeader {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let api_key_raw = decode_i16(buf)?;
        let api_key = ApiKey::try_from(api_key_raw)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Unknown API key"))?;
        let correlation_id = decode_i32(buf)?;

        Ok(RequestHeader {
            api_key,
            correlation_id,
        })
    }
}

impl WireEncodable for ResponseHeader {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.correlation_id);
        Ok(())
    }
}

impl WireDecodable for ResponseHeader {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let correlation_id = decode_i32(buf)?;
        Ok(ResponseHeader { correlation_id })
    }
}

impl WireEncodable for PublishRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_string(buf, self.key.as_deref())?;
        encode_i64(buf, self.ttl_ms);
        encode_bytes(buf, Some(self.body.as_ref()))?;
        encode_i64(buf, self.producer_id.unwrap_or(-1));
        Ok(())
    }
}

impl WireDecodable for PublishRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let topic = decode_required_string(buf, "Topic")?;
        let key = decode_string(buf)?;
        let ttl_ms = decode_i64(buf)?;
        let body = decode_bytes(buf)?.unwrap_or_default();
        let producer_id = Some(decode_i64(buf)?).filter(|id| *id >= 0);

        Ok(PublishRequest {
            topic,
            body,
            ttl_ms,
            key,
            producer_id,
        })
    }
}

impl WireEncodable for SubscribeRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_string(buf, Some(self.topic.as_str()))
    }
}

impl WireDecodable for SubscribeRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        Ok(SubscribeRequest {
            topic: decode_required_string(buf, "Topic")?,
        })
    }
}

/// Answer to a publish request: the stored message's coordinates or an error code
#[derive(Debug, Clone, PartialEq)]
pub enum PublishReply {
    Accepted(PublishResponse),
    Rejected(ErrorCode),
}

impl WireEncodable for PublishReply {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        match self {
            PublishReply::Accepted(response) => {
                encode_i16(buf, ErrorCode::None as i16);
                encode_string(buf, Some(response.id.as_str()))?;
                encode_string(buf, Some(response.partition.as_str()))?;
                encode_i64(buf, response.offset as i64);
            }
            PublishReply::Rejected(code) => {
                encode_i16(buf, *code as i16);
            }
        }
        Ok(())
    }
}

impl WireDecodable for PublishReply {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let code = ErrorCode::from(decode_i16(buf)?);
        if code != ErrorCode::None {
            return Ok(PublishReply::Rejected(code));
        }
        let id = decode_required_string(buf, "Message id")?;
        let partition = decode_required_string(buf, "Partition")?;
        let offset = decode_i64(buf)?;
        Ok(PublishReply::Accepted(PublishResponse {
            id,
            partition,
            offset: offset as u64,
        }))
    }
}

/// One frame of a subscription stream.
///
/// A stream is `Opened`, any number of `Message`s, then exactly one `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Opened { consumer_id: i64 },
    Message(MessageResponse),
    /// Terminal frame; `Cancelled` marks a clean end
    End(ErrorCode),
}

impl StreamFrame {
    const OPENED: i8 = 0;
    const MESSAGE: i8 = 1;
    const END: i8 = 2;
}

impl WireEncodable for StreamFrame {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        match self {
            StreamFrame::Opened { consumer_id } => {
                encode_i8(buf, Self::OPENED);
                encode_i64(buf, *consumer_id);
            }
            StreamFrame::Message(message) => {
                encode_i8(buf, Self::MESSAGE);
                encode_string(buf, Some(message.partition.as_str()))?;
                encode_i64(buf, message.offset as i64);
                encode_bytes(buf, Some(message.body.as_ref()))?;
            }
            StreamFrame::End(code) => {
                encode_i8(buf, Self::END);
                encode_i16(buf, *code as i16);
            }
        }
        Ok(())
    }
}

impl WireDecodable for StreamFrame {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        match decode_i8(buf)? {
            Self::OPENED => Ok(StreamFrame::Opened {
                consumer_id: decode_i64(buf)?,
            }),
            Self::MESSAGE => {
                let partition = decode_required_string(buf, "Partition")?;
                let offset = decode_i64(buf)? as u64;
                let body = decode_bytes(buf)?.unwrap_or_default();
                Ok(StreamFrame::Message(MessageResponse {
                    partition,
                    offset,
                    body,
                }))
            }
            Self::END => Ok(StreamFrame::End(ErrorCode::from(decode_i16(buf)?))),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Unknown stream frame kind",
            )),
        }
    }
}

/// Encode a header followed by a body into one frame payload
pub fn encode_payload(header: &impl WireEncodable, body: &impl WireEncodable) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    header.encode(&mut buf)?;
    body.encode(&mut buf)?;
    Ok(buf)
}

/// Read one size-prefixed frame. `Ok(None)` means the peer closed cleanly.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> io::Result<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    let size = match reader.read_i32().await {
        Ok(size) => size,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    if size <= 0 || size as usize > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid frame size: {}", size),
        ));
    }

    let mut frame = BytesMut::zeroed(size as usize);
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Write one size-prefixed frame
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let size = i32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Frame too large"))?;
    writer.write_i32(size).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TopicName;

    #[test]
    fn test_publish_request_layout() {
        let request = PublishRequest {
            topic: "orders".to_string(),
            body: Bytes::from_static(b"first"),
            ttl_ms: 500,
            key: Some("eu".to_string()),
            producer_id: None,
        };
        let header = RequestHeader {
            api_key: ApiKey::Publish,
            correlation_id: 7,
        };

        let mut buf = encode_payload(&header, &request).unwrap();
        let decoded_header = RequestHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded_header.api_key, ApiKey::Publish);
        assert_eq!(decoded_header.correlation_id, 7);
        assert_eq!(PublishRequest::decode(&mut buf).unwrap(), request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rejected_publish_carries_only_code() {
        let mut buf = BytesMut::new();
        PublishReply::Rejected(ErrorCode::InvalidArgument)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 2);
        assert_eq!(
            PublishReply::decode(&mut buf).unwrap(),
            PublishReply::Rejected(ErrorCode::InvalidArgument)
        );
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let mut buf = BytesMut::new();
        encode_i16(&mut buf, ApiKey::Subscribe as i16);
        assert_eq!(
            RequestHeader::decode(&mut buf).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );

        let mut buf = BytesMut::new();
        encode_i16(&mut buf, 99);
        encode_i32(&mut buf, 1);
        assert_eq!(
            RequestHeader::decode(&mut buf).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_correlation_id_survives_unknown_api_key() {
        let mut buf = BytesMut::new();
        encode_i16(&mut buf, 99);
        encode_i32(&mut buf, 31);

        assert_eq!(RequestHeader::peek_correlation_id(&buf), Some(31));
        assert!(RequestHeader::decode(&mut buf.clone()).is_err());
        assert_eq!(RequestHeader::peek_correlation_id(&buf[..3]), None);
    }

    #[test]
    fn test_error_code_mapping() {
        let topic = TopicName::new("orders").unwrap();
        assert_eq!(
            ErrorCode::from(&BrokerError::TopicNotFound(topic)),
            ErrorCode::TopicNotFound
        );
        assert_eq!(ErrorCode::from(&BrokerError::Cancelled), ErrorCode::Cancelled);
        assert_eq!(ErrorCode::from(42i16), ErrorCode::Unknown);
    }

    #[tokio::test]
    async fn test_frames_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"hello").await.unwrap();
        drop(client);

        let frame = read_frame(&mut server, 1024).await.unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &[0u8; 64]).await.unwrap();

        let err = read_frame(&mut server, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
