//! CoAP datagram encoding (RFC 7252 §3).
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::coap::message::{Code, MessageType};
use crate::coap::option::OptionSet;

const VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xff;
const MAX_TOKEN_LEN: usize = 8;

/// Errors while encoding or decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("datagram truncated")]
    Truncated,

    #[error("unsupported CoAP version {0}")]
    InvalidVersion(u8),

    #[error("invalid token length {0}")]
    InvalidTokenLength(usize),

    #[error("reserved option nibble")]
    ReservedNibble,

    #[error("payload marker followed by empty payload")]
    EmptyPayload,

    #[error("option number exceeds 65535")]
    OptionNumberOverflow,

    #[error("option value too long ({0} bytes)")]
    OptionTooLong(usize),
}

/// A CoAP message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub mtype: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Bytes,
    pub options: OptionSet,
    pub payload: Bytes,
}

impl Packet {
    /// An empty message (ACK or RST) answering `message_id`.
    pub fn empty(mtype: MessageType, message_id: u16) -> Self {
        Self {
            mtype,
            code: Code::EMPTY,
            message_id,
            token: Bytes::new(),
            options: OptionSet::new(),
            payload: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLength(self.token.len()));
        }

        let mut buf = BytesMut::with_capacity(4 + self.token.len() + self.payload.len() + 32);
        buf.put_u8((VERSION << 6) | ((self.mtype as u8) << 4) | self.token.len() as u8);
        buf.put_u8(self.code.0);
        buf.put_u16(self.message_id);
        buf.put_slice(&self.token);

        let mut previous = 0u16;
        for option in self.options.iter() {
            let delta = option.number - previous;
            let len = option.value.len();
            if len > u16::MAX as usize + 269 {
                return Err(CodecError::OptionTooLong(len));
            }
            let (delta_nibble, delta_ext) = split_nibble(delta as usize);
            let (len_nibble, len_ext) = split_nibble(len);
            buf.put_u8((delta_nibble << 4) | len_nibble);
            put_extended(&mut buf, delta_nibble, delta_ext);
            put_extended(&mut buf, len_nibble, len_ext);
            buf.put_slice(&option.value);
            previous = option.number;
        }

        if !self.payload.is_empty() {
            buf.put_u8(PAYLOAD_MARKER);
            buf.put_slice(&self.payload);
        }
        Ok(buf.freeze())
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, CodecError> {
        if datagram.len() < 4 {
            return Err(CodecError::Truncated);
        }
        let version = datagram[0] >> 6;
        if version != VERSION {
            return Err(CodecError::InvalidVersion(version));
        }
        let mtype = MessageType::from(datagram[0] >> 4);
        let token_len = (datagram[0] & 0x0f) as usize;
        if token_len > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLength(token_len));
        }
        let code = Code(datagram[1]);
        let message_id = u16::from_be_bytes([datagram[2], datagram[3]]);

        let mut pos = 4;
        let token = take(datagram, &mut pos, token_len)?;

        let mut options = OptionSet::new();
        let mut number = 0u16;
        let mut payload = Bytes::new();
        while pos < datagram.len() {
            let byte = datagram[pos];
            pos += 1;
            if byte == PAYLOAD_MARKER {
                if pos == datagram.len() {
                    return Err(CodecError::EmptyPayload);
                }
                payload = Bytes::copy_from_slice(&datagram[pos..]);
                break;
            }
            let delta = read_extended(datagram, &mut pos, byte >> 4)?;
            let len = read_extended(datagram, &mut pos, byte & 0x0f)?;
            number = u16::try_from(number as usize + delta)
                .map_err(|_| CodecError::OptionNumberOverflow)?;
            let value = take(datagram, &mut pos, len)?;
            options.push(number, value);
        }

        Ok(Self {
            mtype,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }
}

fn split_nibble(value: usize) -> (u8, usize) {
    match value {
        0..=12 => (value as u8, 0),
        13..=268 => (13, value - 13),
        _ => (14, value - 269),
    }
}

fn put_extended(buf: &mut BytesMut, nibble: u8, ext: usize) {
    match nibble {
        13 => buf.put_u8(ext as u8),
        14 => buf.put_u16(ext as u16),
        _ => {}
    }
}

fn read_extended(datagram: &[u8], pos: &mut usize, nibble: u8) -> Result<usize, CodecError> {
    match nibble {
        0..=12 => Ok(nibble as usize),
        13 => {
            let b = take(datagram, pos, 1)?;
            Ok(b[0] as usize + 13)
        }
        14 => {
            let b = take(datagram, pos, 2)?;
            Ok(u16::from_be_bytes([b[0], b[1]]) as usize + 269)
        }
        _ => Err(CodecError::ReservedNibble),
    }
}

fn take(datagram: &[u8], pos: &mut usize, len: usize) -> Result<Bytes, CodecError> {
    let end = pos.checked_add(len).ok_or(CodecError::Truncated)?;
    if end > datagram.len() {
        return Err(CodecError::Truncated);
    }
    let slice = Bytes::copy_from_slice(&datagram[*pos..end]);
    *pos = end;
    Ok(slice)
}
