//! WebSocket frames as defined in [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! A frame is the atomic unit of transmission: protocol metadata plus the
//! payload. The wire layout handled by this module:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! ```
//!
//! Frames come in two categories:
//!
//! - **Data frames**: [`OpCode::Text`] (UTF-8) and [`OpCode::Binary`]
//!   carry application payloads. [`OpCode::Continuation`] exists in the
//!   opcode space but fragmented messages are rejected by the connection.
//! - **Control frames**: [`OpCode::Close`] ends the connection with an
//!   optional status code and reason, [`OpCode::Ping`] probes liveness and
//!   is answered with an [`OpCode::Pong`] carrying the identical payload.
//!
//! The RSV bits are ignored on input and always zero on output: no
//! extension is ever negotiated on these connections.

use bytes::BytesMut;

use crate::{close::CloseCode, Error};

/// Operation code determining the semantic meaning and handling of a frame.
///
/// The numeric values are defined in
/// [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8):
/// Continuation = 0x0, Text = 0x1, Binary = 0x2, Close = 0x8, Ping = 0x9,
/// Pong = 0xA. The remaining nibbles are reserved and rejected on decode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    /// Interprets the opcode nibble from a frame header. Reserved values
    /// (0x3-0x7 and 0xB-0xF) yield [`Error::InvalidOpCode`].
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(Error::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// Largest possible frame header: 2 bytes fixed, 8 bytes extended length,
/// 4 bytes mask key.
pub(crate) const MAX_HEAD_SIZE: usize = 14;

/// A single WebSocket frame.
///
/// Outgoing frames are built with the factory methods ([`Frame::text`],
/// [`Frame::binary`], [`Frame::ping`], [`Frame::pong`], [`Frame::close`])
/// and always carry `fin = true`: this protocol never fragments outgoing
/// messages. Incoming frames are produced by the decoder with the payload
/// already unmasked.
#[derive(Debug)]
pub struct Frame {
    /// Indicates if this is the final frame in a message.
    pub fin: bool,
    /// The opcode of the frame, defining its type.
    pub opcode: OpCode,
    /// Masking key, present only on frames the initiator role sends.
    mask: Option<[u8; 4]>,
    /// The payload of the frame.
    pub payload: BytesMut,
}

impl Frame {
    /// Creates a frame from its raw parts.
    pub fn new(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload: impl Into<BytesMut>) -> Self {
        Self {
            fin,
            opcode,
            mask,
            payload: payload.into(),
        }
    }

    /// Creates a final text frame with the given payload.
    pub fn text(payload: impl Into<BytesMut>) -> Self {
        Self::new(true, OpCode::Text, None, payload)
    }

    /// Creates a final binary frame with the given payload.
    pub fn binary(payload: impl Into<BytesMut>) -> Self {
        Self::new(true, OpCode::Binary, None, payload)
    }

    /// Creates a ping frame with the given payload.
    pub fn ping(payload: impl Into<BytesMut>) -> Self {
        Self::new(true, OpCode::Ping, None, payload)
    }

    /// Creates a pong frame with the given payload.
    pub fn pong(payload: impl Into<BytesMut>) -> Self {
        Self::new(true, OpCode::Pong, None, payload)
    }

    /// Creates a close frame carrying `code` and a UTF-8 `reason`.
    ///
    /// The payload is the 2-byte big-endian status code followed by the
    /// reason bytes.
    pub fn close(code: CloseCode, reason: impl AsRef<[u8]>) -> Self {
        let reason = reason.as_ref();
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.extend_from_slice(&u16::from(code).to_be_bytes());
        payload.extend_from_slice(reason);

        Self::new(true, OpCode::Close, None, payload)
    }

    /// Creates a close frame from a raw payload without enforcing the
    /// code/reason structure.
    pub fn close_raw(payload: impl Into<BytesMut>) -> Self {
        Self::new(true, OpCode::Close, None, payload)
    }

    /// Extracts the close code from a close frame's payload, if present.
    pub fn close_code(&self) -> Option<CloseCode> {
        let code = u16::from_be_bytes(self.payload.get(0..2)?.try_into().ok()?);
        Some(CloseCode::from(code))
    }

    /// Extracts the close reason from a close frame's payload, if present
    /// and valid UTF-8.
    pub fn close_reason(&self) -> Option<&str> {
        std::str::from_utf8(self.payload.get(2..)?).ok()
    }

    /// Masks the payload, generating a fresh random key when none is set.
    ///
    /// Called by the encoder for the initiator role only.
    pub(crate) fn mask(&mut self) {
        let key = *self.mask.get_or_insert_with(rand::random);
        crate::mask::apply_mask(&mut self.payload, key);
    }

    /// Formats the frame header into `head` and returns its size.
    ///
    /// The length field uses the shortest valid representation: the 7-bit
    /// value directly for lengths below 126, the 16-bit extended form below
    /// 65536 and the 64-bit form otherwise.
    ///
    /// # Panics
    /// Panics if `head` is shorter than [`MAX_HEAD_SIZE`].
    pub(crate) fn fmt_head(&self, head: &mut [u8]) -> usize {
        head[0] = (self.fin as u8) << 7 | u8::from(self.opcode);

        let len = self.payload.len();
        let size = if len < 126 {
            head[1] = len as u8;
            2
        } else if len < 65536 {
            head[1] = 126;
            head[2..4].copy_from_slice(&(len as u16).to_be_bytes());
            4
        } else {
            head[1] = 127;
            head[2..10].copy_from_slice(&(len as u64).to_be_bytes());
            10
        };

        if let Some(key) = self.mask {
            head[1] |= 0x80;
            head[size..size + 4].copy_from_slice(&key);
            size + 4
        } else {
            size
        }
    }
}
