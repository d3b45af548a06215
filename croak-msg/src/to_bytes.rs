use core::fmt;

use std_alloc::vec::Vec;

use crate::msg::opt::{opts_size, write_opts};
use crate::Message;

/// How a message is laid out on the wire
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Framing {
  /// [RFC7252](https://datatracker.ietf.org/doc/html/rfc7252#section-3) fixed 4-byte header
  /// (version, type, token length, code, message id)
  Datagram,
  /// [RFC8323](https://datatracker.ietf.org/doc/html/rfc8323#section-3.2) length-prefixed header
  /// (length, token length, code). Type and message id are not transmitted.
  Stream,
}

/// Errors encounterable serializing to bytes
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum MessageToBytesError {
  /// An option number could not be expressed as a delta
  OptionNumberTooLarge(u16),
  /// An option value was longer than 65804 bytes
  OptionValueTooLong(usize),
  /// The options & payload of a stream frame were longer than the length field can express
  FrameTooLong(usize),
}

impl fmt::Display for MessageToBytesError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::OptionNumberTooLarge(n) => write!(f, "option number {} could not be encoded", n),
      | Self::OptionValueTooLong(n) => write!(f, "option value of {} bytes is too long", n),
      | Self::FrameTooLong(n) => write!(f, "stream frame of {} bytes is too long", n),
    }
  }
}

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a byte buffer laid out according to `framing`
  ///
  /// ```
  /// use croak_msg::{code, Framing, Id, Message, Token, TryIntoBytes, Type};
  ///
  /// let mut msg = Message::new(Type::Con, code::CONTENT, Id(1), Token::default());
  /// msg.payload.0 = b"hi".to_vec();
  ///
  /// assert_eq!(msg.try_into_bytes(Framing::Datagram).unwrap(),
  ///            vec![0x40, 0x45, 0x00, 0x01, 0xFF, b'h', b'i']);
  /// assert_eq!(msg.try_into_bytes(Framing::Stream).unwrap(),
  ///            vec![0x30, 0x45, 0xFF, b'h', b'i']);
  /// ```
  fn try_into_bytes(&self, framing: Framing) -> Result<Vec<u8>, Self::Error>;
}

/// Length of options + payload marker + payload
fn body_size(msg: &Message) -> usize {
  let payload = match msg.payload.0.len() {
    | 0 => 0,
    | n => n + 1,
  };

  opts_size(&msg.opts) + payload
}

fn stream_len_ext_size(len: usize) -> usize {
  match len {
    | n if n < 13 => 0,
    | n if n < 269 => 1,
    | n if n < 65805 => 2,
    | _ => 4,
  }
}

impl Message {
  /// Number of bytes this message occupies when serialized
  ///
  /// ```
  /// use croak_msg::{code, Framing, Id, Message, Token, TryIntoBytes, Type};
  ///
  /// let mut msg = Message::new(Type::Con, code::CONTENT, Id(1), Token::from_slice(&[1, 2]));
  /// msg.payload.0 = vec![0; 300];
  ///
  /// for framing in [Framing::Datagram, Framing::Stream] {
  ///   assert_eq!(msg.size(framing), msg.try_into_bytes(framing).unwrap().len());
  /// }
  /// ```
  pub fn size(&self, framing: Framing) -> usize {
    let body = body_size(self);
    let tkl = self.token.0.len();

    match framing {
      | Framing::Datagram => 4 + tkl + body,
      | Framing::Stream => 1 + stream_len_ext_size(body) + 1 + tkl + body,
    }
  }
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(&self, framing: Framing) -> Result<Vec<u8>, Self::Error> {
    let mut bytes = Vec::with_capacity(self.size(framing));
    let tkl = self.token.0.len() as u8;

    match framing {
      | Framing::Datagram => {
        let byte1 = (self.ver.0 << 6) | (u8::from(self.ty) << 4) | tkl;
        bytes.push(byte1);
        bytes.push(self.code.into());
        bytes.extend_from_slice(&self.id.0.to_be_bytes());
      },
      | Framing::Stream => {
        let len = body_size(self);
        match len {
          | n if n < 13 => bytes.push(((n as u8) << 4) | tkl),
          | n if n < 269 => {
            bytes.push((13 << 4) | tkl);
            bytes.push((n - 13) as u8);
          },
          | n if n < 65805 => {
            bytes.push((14 << 4) | tkl);
            bytes.extend_from_slice(&((n - 269) as u16).to_be_bytes());
          },
          | n => {
            let ext = u32::try_from(n - 65805).map_err(|_| MessageToBytesError::FrameTooLong(n))?;
            bytes.push((15 << 4) | tkl);
            bytes.extend_from_slice(&ext.to_be_bytes());
          },
        }
        bytes.push(self.code.into());
      },
    }

    bytes.extend_from_slice(&self.token.0);
    write_opts(&self.opts, &mut bytes)?;

    if !self.payload.0.is_empty() {
      bytes.push(0xFF);
      bytes.extend_from_slice(&self.payload.0);
    }

    Ok(bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{code, known, Block, Id, Token, Type};

  #[test]
  fn no_marker_without_payload() {
    let msg = Message::new(Type::Ack, code::EMPTY, Id(0xBEEF), Token::default());
    assert_eq!(msg.try_into_bytes(Framing::Datagram).unwrap(),
               std_alloc::vec![0x60, 0x00, 0xBE, 0xEF]);
  }

  #[test]
  fn stream_extended_lengths() {
    let mut msg = Message::new(Type::Non, code::CONTENT, Id(0), Token::default());

    for (payload_len, ext) in [(12usize, 1usize), (300, 2), (70_000, 4)] {
      msg.payload.0 = std_alloc::vec![1; payload_len];
      let bytes = msg.try_into_bytes(Framing::Stream).unwrap();

      assert_eq!(bytes.len(), 1 + ext + 1 + 1 + payload_len);
      assert_eq!(bytes.len(), msg.size(Framing::Stream));
    }
  }

  #[test]
  fn options_in_number_order() {
    let mut msg = Message::new(Type::Con, code::GET, Id(1), Token::default());
    msg.set_block2(Block::new(1, 2, false).unwrap());
    msg.add(known::URI_PATH, b"x"[..].into());

    let bytes = msg.try_into_bytes(Framing::Datagram).unwrap();
    // Uri-Path (11) first, then Block2 (delta 12)
    assert_eq!(&bytes[4..], &[0xB1, b'x', 0xC1, 0x12]);
  }
}
