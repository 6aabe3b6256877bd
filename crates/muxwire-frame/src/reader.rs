use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use muxwire_transport::ClientStream;

use crate::codec::{check_frame_length, FrameConfig, LENGTH_PREFIX_SIZE};
use crate::error::{FrameError, Result};

/// Read exactly one block from `source`.
///
/// Returns `Ok(None)` if the source ends before any byte is read. End of input
/// part-way through a block is [`FrameError::Truncated`]. The declared length is
/// checked against `max_frame_size` before the receive buffer is allocated.
/// Never reads past the end of the block.
pub fn first_block_of<R: Read + ?Sized>(source: &mut R, max_frame_size: usize) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let got = read_full(source, &mut prefix)?;
    if got == 0 {
        return Ok(None);
    }
    if got < LENGTH_PREFIX_SIZE {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX_SIZE,
            actual: got,
        });
    }

    let frame_len = u32::from_be_bytes(prefix) as usize;
    check_frame_length(frame_len, max_frame_size)?;

    let total = LENGTH_PREFIX_SIZE + frame_len;
    let mut block = BytesMut::zeroed(total);
    block[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
    let got = read_full(source, &mut block[LENGTH_PREFIX_SIZE..])?;
    if got < frame_len {
        return Err(FrameError::Truncated {
            expected: total,
            actual: LENGTH_PREFIX_SIZE + got,
        });
    }
    Ok(Some(block.freeze()))
}

/// Fill `buf` from `source`, looping over short reads. Returns the byte count,
/// which is less than `buf.len()` only at end of input.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}

/// Reads complete blocks from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete blocks.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next block (blocking). `Ok(None)` means the peer closed cleanly.
    pub fn read_block(&mut self) -> Result<Option<Bytes>> {
        first_block_of(&mut self.inner, self.config.max_frame_size)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame length for subsequent reads.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<ClientStream> {
    /// Create a frame reader for a client stream and apply the read timeout from config.
    pub fn with_config_client(inner: ClientStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: muxwire_transport::TransportError) -> FrameError {
    use muxwire_transport::TransportError;
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;
    use serde_json::json;

    use super::*;
    use crate::codec::{pack_raw, DEFAULT_MAX_FRAME};
    use crate::header::Header;

    fn block(id: i32, body: &[u8]) -> Bytes {
        let mut h = Header::new();
        h.insert("seq".into(), json!(id));
        pack_raw(id, body, &h).unwrap()
    }

    #[test]
    fn read_single_block() {
        let wire = block(1, b"\"hello\"");
        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        assert_eq!(reader.read_block().unwrap().unwrap(), wire);
        assert!(reader.read_block().unwrap().is_none());
    }

    #[test]
    fn concatenated_blocks_read_in_order() {
        let a = block(1, b"\"one\"");
        let b = block(2, b"\"two\"");
        let mut wire = a.to_vec();
        wire.extend_from_slice(&b);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.read_block().unwrap().unwrap(), a);
        assert_eq!(reader.read_block().unwrap().unwrap(), b);
        assert!(reader.read_block().unwrap().is_none());
    }

    #[test]
    fn does_not_read_past_block() {
        let a = block(1, b"1");
        let mut wire = a.to_vec();
        wire.extend_from_slice(b"trailing");
        let mut cursor = Cursor::new(wire);

        let got = first_block_of(&mut cursor, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(got, a);
        assert_eq!(cursor.position() as usize, a.len());
    }

    #[test]
    fn partial_read_handling() {
        let wire = block(4, b"\"slow\"");
        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        });
        assert_eq!(reader.read_block().unwrap().unwrap(), wire);
    }

    #[test]
    fn clean_eof_is_not_an_error() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_block().unwrap().is_none());
    }

    #[test]
    fn three_prefix_bytes_then_eof_is_truncation() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8, 0, 0]));
        let err = reader.read_block().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn eof_mid_body_is_truncation() {
        let wire = block(1, b"\"abcdef\"");
        let cut = wire[..wire.len() - 3].to_vec();
        let mut reader = FrameReader::new(Cursor::new(cut));
        let err = reader.read_block().unwrap_err();
        match err {
            FrameError::Truncated { expected, actual } => {
                assert_eq!(expected, wire.len());
                assert_eq!(actual, wire.len() - 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn oversized_frame_rejected_before_allocation() {
        let mut wire = BytesMut::new();
        wire.put_u32(u32::MAX);
        let cfg = FrameConfig {
            max_frame_size: 1024,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_block().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 1024, .. }));
    }

    #[test]
    fn undersized_frame_length_is_malformed() {
        let mut wire = BytesMut::new();
        wire.put_u32(3);
        wire.put_slice(b"abc");
        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        assert!(matches!(reader.read_block(), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn set_max_frame_size_applies_to_next_read() {
        let wire = block(1, b"\"0123456789\"");
        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        reader.set_max_frame_size(12);
        assert_eq!(reader.config().max_frame_size, 12);
        assert!(matches!(
            reader.read_block(),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let wire = block(8, b"1");
        let mut framed = FrameReader::new(InterruptedThenData {
            state: 0,
            bytes: wire.to_vec(),
            pos: 0,
        });
        assert_eq!(framed.read_block().unwrap().unwrap(), wire);
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut framed = FrameReader::new(WouldBlockReader);
        let err = framed.read_block().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn roundtrip_over_tcp_client_stream() {
        use crate::writer::FrameWriter;
        use muxwire_transport::Network;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let echo = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);
            while let Some(block) = reader.read_block().unwrap() {
                writer.write_block(&block).unwrap();
            }
        });

        let stream = ClientStream::connect(Network::Tcp, &addr).unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config_client(stream.try_clone().unwrap(), cfg.clone()).unwrap();
        let mut reader = FrameReader::with_config_client(stream, cfg).unwrap();

        let wire = block(11, b"\"ping\"");
        writer.write_block(&wire).unwrap();
        assert_eq!(reader.read_block().unwrap().unwrap(), wire);

        reader.get_ref().shutdown_write().unwrap();
        echo.join().unwrap();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
