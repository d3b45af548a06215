use crate::cursor::Cursor;
use crate::msg::opt::parse_opts;
use crate::{Code, Framing, Id, Message, MessageParseError, Payload, Token, Type, Version};

/// Trait for converting a sequence of bytes into some data structure
pub trait TryFromBytes: Sized {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert from some sequence of bytes laid out
  /// according to `framing` into `Self`
  fn try_from_bytes<A: AsRef<[u8]>>(framing: Framing, bytes: A) -> Result<Self, Self::Error>;
}

/// Given the first bytes of a stream frame, get the total number of bytes
/// in the frame.
///
/// Yields `None` when not enough of the header is present to know.
///
/// ```
/// use croak_msg::from_bytes::stream_frame_len;
///
/// assert_eq!(stream_frame_len(&[0x30, 0x45]), Some(5));
/// assert_eq!(stream_frame_len(&[0xD1]), None);
/// assert_eq!(stream_frame_len(&[0xD1, 0x00]), Some(1 + 1 + 1 + 1 + 13));
/// ```
pub fn stream_frame_len(bytes: &[u8]) -> Option<usize> {
  let b = *bytes.first()?;
  let tkl = (b & 0b1111) as usize;

  let (ext, len) = match b >> 4 {
    | 13 => (1, *bytes.get(1)? as usize + 13),
    | 14 => (2, u16::from_be_bytes([*bytes.get(1)?, *bytes.get(2)?]) as usize + 269),
    | 15 => (4,
             u32::from_be_bytes([*bytes.get(1)?, *bytes.get(2)?, *bytes.get(3)?, *bytes.get(4)?]) as usize
             + 65805),
    | n => (0, n as usize),
  };

  Some(1 + ext + 1 + tkl + len)
}

fn parse_token(bytes: &mut Cursor<'_>, tkl: u8) -> Result<Token, MessageParseError> {
  if tkl > 8 {
    return Err(MessageParseError::InvalidTokenLength(tkl));
  }

  bytes.take_exact(tkl as usize)
       .map(Token::from_slice)
       .ok_or_else(MessageParseError::eof)
}

fn parse_payload(bytes: &mut Cursor<'_>) -> Result<Payload, MessageParseError> {
  match bytes.next() {
    | None => Ok(Payload::default()),
    | Some(_marker) => match bytes.take_until_end() {
      | [] => Err(MessageParseError::EmptyPayloadAfterMarker),
      | rest => Ok(Payload(rest.to_vec())),
    },
  }
}

impl TryFromBytes for Message {
  type Error = MessageParseError;

  fn try_from_bytes<A: AsRef<[u8]>>(framing: Framing, bytes: A) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes.as_ref());
    let byte1 = bytes.next().ok_or_else(MessageParseError::eof)?;

    let (ver, ty, code, id, token) = match framing {
      | Framing::Datagram => {
        let ver = Version(byte1 >> 6);
        let ty = Type::try_from((byte1 >> 4) & 0b11)?;
        let code = Code::from(bytes.next().ok_or_else(MessageParseError::eof)?);
        let id = bytes.take_exact(2)
                      .map(|id| Id::from_be_bytes([id[0], id[1]]))
                      .ok_or_else(MessageParseError::eof)?;
        let token = parse_token(&mut bytes, byte1 & 0b1111)?;

        (ver, ty, code, id, token)
      },
      | Framing::Stream => {
        let len = match byte1 >> 4 {
          | 13 => bytes.next().map(|n| n as usize + 13),
          | 14 => bytes.take_exact(2)
                       .map(|n| u16::from_be_bytes([n[0], n[1]]) as usize + 269),
          | 15 => bytes.take_exact(4)
                       .map(|n| u32::from_be_bytes([n[0], n[1], n[2], n[3]]) as usize + 65805),
          | n => Some(n as usize),
        }.ok_or_else(MessageParseError::eof)?;

        let code = Code::from(bytes.next().ok_or_else(MessageParseError::eof)?);
        let token = parse_token(&mut bytes, byte1 & 0b1111)?;

        if bytes.remaining() != len {
          return Err(MessageParseError::FrameLengthMismatch { declared: len,
                                                              actual: bytes.remaining() });
        }

        (Version::default(), Type::Non, code, Id(0), token)
      },
    };

    let opts = parse_opts(&mut bytes)?;
    let payload = parse_payload(&mut bytes)?;

    Ok(Message { ver,
                 ty,
                 code,
                 id,
                 token,
                 opts,
                 payload })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{code, known, Block, TryIntoBytes};

  #[test]
  fn parse_datagram() {
    let bytes = [0x42, 0x01, 0x12, 0x34, 0xAA, 0xBB, 0xD1, 0x0A, 0x26, 0xFF, b'h', b'i'];
    let msg = Message::try_from_bytes(Framing::Datagram, bytes).unwrap();

    assert_eq!(msg.ty, Type::Con);
    assert_eq!(msg.code, code::GET);
    assert_eq!(msg.id, Id(0x1234));
    assert_eq!(msg.token.as_bytes(), &[0xAA, 0xBB]);
    assert_eq!(msg.block2(), Ok(Some(Block::new(2, 6, false).unwrap())));
    assert_eq!(msg.payload(), b"hi");
  }

  #[test]
  fn parse_stream_skips_type_and_id() {
    let mut msg = Message::new(Type::Con, code::POST, Id(99), Token::from_slice(&[7]));
    msg.set_block1(Block::new(0, 2, true).unwrap());
    msg.payload.0 = std_alloc::vec![0; 64];

    let bytes = msg.try_into_bytes(Framing::Stream).unwrap();
    let parsed = Message::try_from_bytes(Framing::Stream, &bytes).unwrap();

    assert_eq!(parsed.ty, Type::Non);
    assert_eq!(parsed.id, Id(0));
    assert_eq!(parsed.opts, msg.opts);
    assert_eq!(parsed.payload, msg.payload);
    assert_eq!(stream_frame_len(&bytes), Some(bytes.len()));
  }

  #[test]
  fn marker_without_payload_is_error() {
    let bytes = [0x40, 0x45, 0x00, 0x01, 0xFF];
    assert_eq!(Message::try_from_bytes(Framing::Datagram, bytes),
               Err(MessageParseError::EmptyPayloadAfterMarker));
  }

  #[test]
  fn token_too_long() {
    let bytes = [0x49, 0x45, 0x00, 0x01];
    assert_eq!(Message::try_from_bytes(Framing::Datagram, bytes),
               Err(MessageParseError::InvalidTokenLength(9)));
  }

  #[test]
  fn stream_length_mismatch() {
    let bytes = [0x20, 0x45, 0xFF];
    assert_eq!(Message::try_from_bytes(Framing::Stream, bytes),
               Err(MessageParseError::FrameLengthMismatch { declared: 2,
                                                            actual: 1 }));
  }

  #[test]
  fn echo_option_roundtrip() {
    let mut msg = Message::new(Type::Con, code::UNAUTHORIZED, Id(3), Token::default());
    msg.set(known::ECHO, (&[1u8, 2, 3, 4, 5, 6, 7, 8][..]).into());

    let bytes = msg.try_into_bytes(Framing::Datagram).unwrap();
    assert_eq!(Message::try_from_bytes(Framing::Datagram, bytes).unwrap(), msg);
  }
}
