use std::io::{ErrorKind, Write};

use muxwire_transport::ClientStream;
use serde::Serialize;

use crate::codec::{FrameConfig, LENGTH_PREFIX_SIZE};
use crate::error::{FrameError, Result};
use crate::header::Header;
use crate::packer::Packer;
use crate::reader::transport_to_frame_error;

/// Writes complete blocks to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Write one already-packed block (blocking) and flush.
    pub fn write_block(&mut self, block: &[u8]) -> Result<()> {
        let frame_len = block.len().saturating_sub(LENGTH_PREFIX_SIZE);
        if frame_len > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: frame_len,
                max: self.config.max_frame_size,
            });
        }

        let mut offset = 0usize;
        while offset < block.len() {
            match self.inner.write(&block[offset..]) {
                Ok(0) => return Err(FrameError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Pack `body` with `packer` and write it.
    pub fn send<B: Serialize + ?Sized>(
        &mut self,
        packer: &Packer,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<()> {
        let block = packer.pack(message_id, body, headers)?;
        self.write_block(&block)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<ClientStream> {
    /// Create a frame writer for a client stream and apply the write timeout from config.
    pub fn with_config_client(inner: ClientStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
