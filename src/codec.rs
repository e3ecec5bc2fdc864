//! `tokio-util` codec for IRC line framing.
//!
//! [`IrcCodec`] turns a byte stream into [`Message`]s and back, for use
//! with `tokio_util::codec::Framed`. The built-in
//! [`Transport`](crate::transport::Transport) does its own buffered
//! reads; the codec exists for callers who bring their own stream (a
//! proxy, an in-memory duplex in tests) and want the framing without the
//! socket handling.
//!
//! Inbound frames are split on `\n`, trimmed of `\r`, and parsed;
//! unparseable frames surface as errors carrying the raw text, not as
//! stream failures. Outbound messages are sanitized, clamped to the
//! 510-octet budget, and terminated with CRLF.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::{sanitize, Message, MAX_LINE_LEN};

/// Line-delimited IRC message codec.
#[derive(Clone, Debug, Default)]
pub struct IrcCodec {
    /// Offset scanned so far, to avoid re-scanning long partial lines.
    scanned: usize,
}

impl IrcCodec {
    /// A fresh codec.
    pub fn new() -> IrcCodec {
        IrcCodec::default()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = src.len();
            return Ok(None);
        };
        let mut frame = src.split_to(self.scanned + pos + 1);
        self.scanned = 0;

        while matches!(frame.last(), Some(b'\r') | Some(b'\n')) {
            frame.truncate(frame.len() - 1);
        }
        if frame.is_empty() {
            // Blank line between messages; try the next frame.
            return self.decode(src);
        }

        let line = String::from_utf8(frame.to_vec())?;
        match Message::parse(&line) {
            Ok(msg) => Ok(Some(msg)),
            Err(cause) => Err(ProtocolError::InvalidMessage {
                string: line,
                cause,
            }),
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut line = sanitize(&item.to_string());
        let budget = MAX_LINE_LEN - 2;
        if line.len() > budget {
            let mut cut = budget;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
