use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::header::{Header, Route};
use crate::marshaller::Marshaller;
use crate::message::Message;

/// Size of the leading `FrameLength` field.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Message id + header length + body length, counted by `FrameLength`.
pub const FIXED_FIELDS_SIZE: usize = 12;

/// Smallest possible block: length prefix plus the fixed fields.
pub const BLOCK_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + FIXED_FIELDS_SIZE;

/// Default maximum frame length: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Configuration for block readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum `FrameLength` accepted or produced. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Encode a block from pre-encoded body bytes.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────────┬───────────┬──────────────┬────────────┬──────────┬────────┐
/// │ FrameLength  │ MessageID │ HeaderLength │ BodyLength │ Header   │ Body   │
/// │ u32          │ i32       │ u32          │ u32        │ JSON     │ bytes  │
/// └──────────────┴───────────┴──────────────┴────────────┴──────────┴────────┘
/// ```
/// `FrameLength = 12 + HeaderLength + BodyLength`. An empty header is written
/// as a zero-length segment.
pub fn pack_raw(message_id: i32, body: &[u8], header: &Header) -> Result<Bytes> {
    let header_bytes = if header.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(header)?
    };

    let frame_len = FIXED_FIELDS_SIZE as u64 + header_bytes.len() as u64 + body.len() as u64;
    if frame_len > u32::MAX as u64 {
        return Err(FrameError::FrameTooLarge {
            size: usize::try_from(frame_len).unwrap_or(usize::MAX),
            max: u32::MAX as usize,
        });
    }

    let mut dst = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + frame_len as usize);
    dst.put_u32(frame_len as u32);
    dst.put_i32(message_id);
    dst.put_u32(header_bytes.len() as u32);
    dst.put_u32(body.len() as u32);
    dst.put_slice(&header_bytes);
    dst.put_slice(body);
    Ok(dst.freeze())
}

/// Encode a block, marshalling `body` with `marshaller`. `None` writes a
/// zero-length body segment.
pub fn pack<B: Serialize + ?Sized>(
    marshaller: Marshaller,
    message_id: i32,
    body: Option<&B>,
    header: &Header,
) -> Result<Bytes> {
    match body {
        Some(body) => pack_raw(message_id, &marshaller.marshal(body)?, header),
        None => pack_raw(message_id, &[], header),
    }
}

/// Decode a block, unmarshalling its body with `marshaller`.
///
/// Zero-length segments decode to an empty header and a `None` body without
/// invoking the marshaller.
pub fn unpack<B: DeserializeOwned>(marshaller: Marshaller, block: &[u8]) -> Result<Message<B>> {
    let layout = Layout::parse(block)?;
    let header = decode_header(&block[layout.header_range()])?;
    let body_bytes = &block[layout.body_range()];
    let body = if body_bytes.is_empty() {
        None
    } else {
        Some(marshaller.unmarshal(body_bytes)?)
    };
    Ok(Message {
        id: layout.message_id,
        header,
        body,
    })
}

/// The `FrameLength` field: bytes that follow the length prefix.
pub fn length_of(block: &[u8]) -> Result<u32> {
    if block.len() < LENGTH_PREFIX_SIZE {
        return Err(FrameError::Malformed(format!(
            "block is {} bytes, the length prefix needs {LENGTH_PREFIX_SIZE}",
            block.len()
        )));
    }
    Ok(read_u32(block, 0))
}

pub fn message_id_of(block: &[u8]) -> Result<i32> {
    Ok(Layout::parse(block)?.message_id)
}

pub fn header_length_of(block: &[u8]) -> Result<u32> {
    Ok(Layout::parse(block)?.header_len as u32)
}

pub fn body_length_of(block: &[u8]) -> Result<u32> {
    Ok(Layout::parse(block)?.body_len as u32)
}

/// Raw header JSON bytes.
pub fn header_bytes_of(block: &[u8]) -> Result<&[u8]> {
    let layout = Layout::parse(block)?;
    Ok(&block[layout.header_range()])
}

pub fn header_of(block: &[u8]) -> Result<Header> {
    decode_header(header_bytes_of(block)?)
}

/// Raw body bytes, still encoded by the sender's marshaller.
pub fn body_bytes_of(block: &[u8]) -> Result<&[u8]> {
    let layout = Layout::parse(block)?;
    Ok(&block[layout.body_range()])
}

/// Routing discriminator of a block.
pub fn route_of(block: &[u8]) -> Result<Route> {
    Ok(Route::of(&header_of(block)?))
}

/// URL pattern of a URL-routed block, `None` for message-id routing.
pub fn url_pattern_of(block: &[u8]) -> Result<Option<String>> {
    match route_of(block)? {
        Route::UrlPattern(pattern) => Ok(Some(pattern)),
        Route::MessageId => Ok(None),
    }
}

/// Validate that `buf` starts with one complete block and return exactly that block.
///
/// Used for datagrams, where a receive buffer may hold trailing bytes.
pub fn block_of_bytes(buf: &[u8]) -> Result<&[u8]> {
    let layout = Layout::parse(buf)?;
    Ok(&buf[..LENGTH_PREFIX_SIZE + layout.frame_len])
}

/// Validate a `FrameLength` value read from the wire.
pub(crate) fn check_frame_length(frame_len: usize, max: usize) -> Result<()> {
    if frame_len > max {
        return Err(FrameError::FrameTooLarge {
            size: frame_len,
            max,
        });
    }
    if frame_len < FIXED_FIELDS_SIZE {
        return Err(FrameError::Malformed(format!(
            "frame length {frame_len} is smaller than the {FIXED_FIELDS_SIZE} fixed bytes"
        )));
    }
    Ok(())
}

fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.is_empty() {
        return Ok(Header::new());
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Bounds-checked view of a block's fixed fields.
struct Layout {
    frame_len: usize,
    message_id: i32,
    header_len: usize,
    body_len: usize,
}

impl Layout {
    fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < BLOCK_HEADER_SIZE {
            return Err(FrameError::Malformed(format!(
                "block is {} bytes, the fixed header needs {BLOCK_HEADER_SIZE}",
                block.len()
            )));
        }

        let frame_len = read_u32(block, 0) as usize;
        let message_id = read_u32(block, 4) as i32;
        let header_len = read_u32(block, 8) as usize;
        let body_len = read_u32(block, 12) as usize;

        let available = block.len() - LENGTH_PREFIX_SIZE;
        if frame_len > available {
            return Err(FrameError::Malformed(format!(
                "frame length {frame_len} exceeds the {available} bytes available"
            )));
        }
        let declared = FIXED_FIELDS_SIZE as u64 + header_len as u64 + body_len as u64;
        if declared != frame_len as u64 {
            return Err(FrameError::Malformed(format!(
                "header ({header_len}) and body ({body_len}) lengths disagree with frame length {frame_len}"
            )));
        }

        Ok(Self {
            frame_len,
            message_id,
            header_len,
            body_len,
        })
    }

    fn header_range(&self) -> Range<usize> {
        BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + self.header_len
    }

    fn body_range(&self) -> Range<usize> {
        let start = BLOCK_HEADER_SIZE + self.header_len;
        start..start + self.body_len
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::*;
    use crate::header::set_url_pattern;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Login {
        username: String,
    }

    fn auth_header() -> Header {
        let mut h = Header::new();
        h.insert("auth".into(), json!("abc"));
        h
    }

    #[test]
    fn bit_exact_login_block() {
        let body = Login {
            username: "tcpx".into(),
        };
        let block = pack(Marshaller::Json, 1, Some(&body), &auth_header()).unwrap();

        let mut expected = vec![0, 0, 0, 45, 0, 0, 0, 1, 0, 0, 0, 14, 0, 0, 0, 19];
        expected.extend_from_slice(br#"{"auth":"abc"}"#);
        expected.extend_from_slice(br#"{"username":"tcpx"}"#);
        assert_eq!(block.len(), 49);
        assert_eq!(block.as_ref(), expected.as_slice());
    }

    #[test]
    fn roundtrip_with_header_and_body() {
        let body = Login {
            username: "tcpx".into(),
        };
        let block = pack(Marshaller::Json, -7, Some(&body), &auth_header()).unwrap();
        let msg: Message<Login> = unpack(Marshaller::Json, &block).unwrap();
        assert_eq!(msg.id, -7);
        assert_eq!(msg.header, auth_header());
        assert_eq!(msg.body, Some(body));
    }

    #[test]
    fn absent_header_and_body_are_zero_length() {
        let block = pack::<Value>(Marshaller::Json, 9, None, &Header::new()).unwrap();
        assert_eq!(block.len(), BLOCK_HEADER_SIZE);
        assert_eq!(length_of(&block).unwrap(), 12);
        assert_eq!(header_length_of(&block).unwrap(), 0);
        assert_eq!(body_length_of(&block).unwrap(), 0);

        let msg: Message = unpack(Marshaller::Json, &block).unwrap();
        assert!(msg.header.is_empty());
        assert_eq!(msg.body, None);
    }

    #[test]
    fn zero_length_body_skips_marshaller() {
        // Toml may be compiled out; an empty body must not reach it.
        let block = pack_raw(3, &[], &Header::new()).unwrap();
        let msg: Message<Login> = unpack(Marshaller::Toml, &block).unwrap();
        assert_eq!(msg.body, None);
    }

    #[test]
    fn accessors_read_without_decoding_body() {
        let block = pack_raw(42, b"\xff\xfe not-json", &auth_header()).unwrap();
        assert_eq!(message_id_of(&block).unwrap(), 42);
        assert_eq!(header_of(&block).unwrap(), auth_header());
        assert_eq!(header_bytes_of(&block).unwrap(), br#"{"auth":"abc"}"#);
        assert_eq!(body_bytes_of(&block).unwrap(), b"\xff\xfe not-json");
        assert_eq!(url_pattern_of(&block).unwrap(), None);
    }

    #[test]
    fn url_pattern_accessor() {
        let mut h = Header::new();
        set_url_pattern(&mut h, "/user/login/");
        let block = pack_raw(0, b"{}", &h).unwrap();
        assert_eq!(url_pattern_of(&block).unwrap().as_deref(), Some("/user/login/"));
        assert_eq!(route_of(&block).unwrap(), Route::UrlPattern("/user/login/".into()));
    }

    #[test]
    fn accessors_reject_lengths_beyond_slice() {
        let block = pack_raw(1, b"{\"a\":1}", &auth_header()).unwrap();
        let cut = &block[..block.len() - 2];
        assert!(matches!(message_id_of(cut), Err(FrameError::Malformed(_))));
        assert!(matches!(body_bytes_of(cut), Err(FrameError::Malformed(_))));
        assert!(matches!(header_of(&block[..10]), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn hostile_segment_lengths_are_malformed() {
        let mut wire = BytesMut::new();
        wire.put_u32(12);
        wire.put_i32(1);
        wire.put_u32(u32::MAX);
        wire.put_u32(u32::MAX);
        let err = unpack::<Value>(Marshaller::Json, &wire).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn block_of_bytes_trims_trailing_bytes() {
        let block = pack_raw(5, b"[1]", &Header::new()).unwrap();
        let mut buf = block.to_vec();
        buf.extend_from_slice(&[0u8; 32]);
        assert_eq!(block_of_bytes(&buf).unwrap(), block.as_ref());
        assert!(block_of_bytes(&block[..block.len() - 1]).is_err());
    }

    #[test]
    fn non_object_header_is_json_error() {
        let mut wire = BytesMut::new();
        wire.put_u32(12 + 3);
        wire.put_i32(1);
        wire.put_u32(3);
        wire.put_u32(0);
        wire.put_slice(b"[1]");
        assert!(matches!(header_of(&wire), Err(FrameError::Json(_))));
    }

    #[test]
    fn frame_length_limits() {
        assert!(check_frame_length(12, 16).is_ok());
        assert!(matches!(
            check_frame_length(17, 16),
            Err(FrameError::FrameTooLarge { size: 17, max: 16 })
        ));
        assert!(matches!(
            check_frame_length(11, 16),
            Err(FrameError::Malformed(_))
        ));
    }
}
