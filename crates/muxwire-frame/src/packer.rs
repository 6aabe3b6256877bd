use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::error::{FrameError, Result};
use crate::header::{self, Header};
use crate::marshaller::Marshaller;
use crate::message::Message;

/// Packs and unpacks blocks with one body marshaller.
///
/// User headers are merged left to right and may not carry reserved keys;
/// routing and pipelining keys are set only by [`Packer::pack_url`] and
/// [`Packer::pack_pipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Packer {
    marshaller: Marshaller,
}

impl Packer {
    pub fn new(marshaller: Marshaller) -> Self {
        Self { marshaller }
    }

    pub fn marshaller(&self) -> Marshaller {
        self.marshaller
    }

    pub fn pack<B: Serialize + ?Sized>(
        &self,
        message_id: i32,
        body: &B,
        headers: &[Header],
    ) -> Result<Bytes> {
        let header = user_header(headers)?;
        codec::pack(self.marshaller, message_id, Some(body), &header)
    }

    /// Pack a block with a zero-length body.
    pub fn pack_empty(&self, message_id: i32, headers: &[Header]) -> Result<Bytes> {
        let header = user_header(headers)?;
        codec::pack_raw(message_id, &[], &header)
    }

    /// Pack pre-encoded body bytes verbatim.
    pub fn pack_raw(&self, message_id: i32, body: &[u8], headers: &[Header]) -> Result<Bytes> {
        let header = user_header(headers)?;
        codec::pack_raw(message_id, body, &header)
    }

    /// Pack a block routed by URL pattern instead of message id.
    pub fn pack_url<B: Serialize + ?Sized>(
        &self,
        pattern: &str,
        body: &B,
        headers: &[Header],
    ) -> Result<Bytes> {
        let mut header = user_header(headers)?;
        header::set_url_pattern(&mut header, pattern);
        codec::pack(self.marshaller, 0, Some(body), &header)
    }

    pub fn pack_message<B: Serialize>(&self, message: &Message<B>) -> Result<Bytes> {
        header::check_user_header(&message.header)?;
        codec::pack(self.marshaller, message.id, message.body.as_ref(), &message.header)
    }

    /// Pack several messages to be received and dispatched together, in order.
    ///
    /// The first block is marked with the number of blocks that follow it.
    pub fn pack_pipeline<B: Serialize>(&self, messages: &[Message<B>]) -> Result<Bytes> {
        let Some((head, rest)) = messages.split_first() else {
            return Err(FrameError::Malformed("empty pipeline".into()));
        };

        let mut out = BytesMut::new();
        let mut head_header = head.header.clone();
        header::check_user_header(&head_header)?;
        if !rest.is_empty() {
            header::set_pipe(&mut head_header, rest.len());
        }
        out.extend_from_slice(&codec::pack(
            self.marshaller,
            head.id,
            head.body.as_ref(),
            &head_header,
        )?);
        for message in rest {
            out.extend_from_slice(&self.pack_message(message)?);
        }
        Ok(out.freeze())
    }

    pub fn unpack<B: DeserializeOwned>(&self, block: &[u8]) -> Result<Message<B>> {
        codec::unpack(self.marshaller, block)
    }
}

fn user_header(headers: &[Header]) -> Result<Header> {
    let merged = header::merge(headers);
    header::check_user_header(&merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::header::{pipe_of, Route, PIPE, ROUTER_TYPE};

    fn h(value: Value) -> Header {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn variadic_headers_merge() {
        let packer = Packer::default();
        let block = packer
            .pack(1, &json!({"x": 1}), &[h(json!({"a": 1, "b": 1})), h(json!({"b": 2}))])
            .unwrap();
        let msg: Message = packer.unpack(&block).unwrap();
        assert_eq!(msg.header, h(json!({"a": 1, "b": 2})));
        assert_eq!(msg.body, Some(json!({"x": 1})));
    }

    #[test]
    fn reserved_keys_rejected_from_user_headers() {
        let packer = Packer::default();
        let err = packer
            .pack(1, &json!(null), &[h(json!({ ROUTER_TYPE: "URL_PATTERN" }))])
            .unwrap_err();
        assert!(matches!(err, FrameError::ReservedHeader(_)));

        let msg = Message::new(1, 0u8).with_header(PIPE, "enable;1");
        assert!(matches!(
            packer.pack_message(&msg),
            Err(FrameError::ReservedHeader(_))
        ));
    }

    #[test]
    fn pack_url_sets_routing_keys() {
        let packer = Packer::default();
        let block = packer.pack_url("/login/", &json!({"u": "x"}), &[]).unwrap();
        let msg: Message = packer.unpack(&block).unwrap();
        assert_eq!(msg.route(), Route::UrlPattern("/login/".into()));
    }

    #[test]
    fn pipeline_marks_head_with_follow_count() {
        let packer = Packer::default();
        let messages = vec![Message::new(1, "a"), Message::new(2, "b"), Message::new(3, "c")];
        let wire = packer.pack_pipeline(&messages).unwrap();

        let first_len = codec::length_of(&wire).unwrap() as usize + 4;
        let head = codec::header_of(&wire[..first_len]).unwrap();
        assert_eq!(pipe_of(&head), Some(2));
        assert_eq!(codec::message_id_of(&wire[first_len..]).unwrap(), 2);
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let err = Packer::default().pack_pipeline::<Value>(&[]).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn pack_empty_has_no_body() {
        let packer = Packer::default();
        let block = packer.pack_empty(1392, &[]).unwrap();
        let msg: Message = packer.unpack(&block).unwrap();
        assert_eq!(msg.id, 1392);
        assert_eq!(msg.body, None);
    }
}
