//! Length-prefixed block codec for muxwire.
//!
//! Every message travels as one block:
//! - a 4-byte big-endian frame length
//! - a 4-byte message id, then header and body lengths
//! - a JSON header followed by a body encoded by the active [`Marshaller`]
//!
//! The header is always JSON so routing metadata can be read without knowing
//! the body encoding. Accessors in [`codec`] read single fields from a raw block
//! and bounds-check every declared length.

#[cfg(feature = "async")]
pub mod block_codec;
pub mod codec;
pub mod error;
pub mod header;
pub mod marshaller;
pub mod message;
pub mod packer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use block_codec::BlockCodec;
pub use codec::{
    block_of_bytes, body_bytes_of, body_length_of, header_bytes_of, header_length_of, header_of,
    length_of, message_id_of, pack, pack_raw, route_of, unpack, url_pattern_of, FrameConfig,
    BLOCK_HEADER_SIZE, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use header::{Header, Route};
pub use marshaller::Marshaller;
pub use message::Message;
pub use packer::Packer;
pub use reader::{first_block_of, FrameReader};
pub use writer::FrameWriter;
