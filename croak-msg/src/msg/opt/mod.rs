use std_alloc::collections::BTreeMap;
use std_alloc::vec::Vec;
use tinyvec::ArrayVec;

use crate::cursor::Cursor;
use crate::to_bytes::MessageToBytesError;

/// Block1 / Block2 option values
pub mod block;

/// Well-known option numbers
pub mod known;

/// Option parsing errors
pub mod parse_error;

pub use block::*;
pub use parse_error::*;

/// # Option Number
///
/// Options are identified by a 16-bit unsigned integer. Properties
/// of the option are encoded in its number:
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// |           | NoCacheKey| U | C |
/// +---+---+---+---+---+---+---+---+
/// ```
///
/// See [RFC7252 - Option Numbers](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.6) for context
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u16);

/// Whether an option must be understood by the recipient
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum OptionMustBeProcessed {
  /// Critical option; the message must be rejected if the option is not recognized
  Yes,
  /// Elective option; unrecognized options may be silently ignored
  No,
}

/// Whether a change in this option changes the response
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum WhenOptionChanges {
  /// The option is part of the cache key
  ResponseChanges,
  /// The option is not part of the cache key
  ResponseDoesNotChange,
}

impl OptNumber {
  /// Whether this option is critical
  ///
  /// ```
  /// use croak_msg::{known, OptionMustBeProcessed};
  ///
  /// assert_eq!(known::BLOCK2.must_be_processed(), OptionMustBeProcessed::Yes);
  /// assert_eq!(known::SIZE2.must_be_processed(), OptionMustBeProcessed::No);
  /// ```
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    if self.0 & 0b1 == 1 {
      OptionMustBeProcessed::Yes
    } else {
      OptionMustBeProcessed::No
    }
  }

  /// Whether this option is part of the cache key (based on its number alone)
  pub fn when_option_changes(&self) -> WhenOptionChanges {
    if self.0 & 0b11100 == 0b11100 {
      WhenOptionChanges::ResponseDoesNotChange
    } else {
      WhenOptionChanges::ResponseChanges
    }
  }

  /// Whether this option identifies the representation a request is for.
  ///
  /// Options that are not part of the cache key, as well as the options
  /// that describe block-wise transfer & observation state, are excluded.
  ///
  /// ```
  /// use croak_msg::known;
  ///
  /// assert!(known::URI_PATH.include_in_cache_key());
  /// assert!(!known::BLOCK2.include_in_cache_key());
  /// assert!(!known::REQUEST_TAG.include_in_cache_key());
  /// assert!(!known::SIZE1.include_in_cache_key());
  /// ```
  pub fn include_in_cache_key(&self) -> bool {
    self.when_option_changes() == WhenOptionChanges::ResponseChanges
    && ![known::BLOCK1,
         known::BLOCK2,
         known::OBSERVE,
         known::REQUEST_TAG,
         known::ECHO,
         known::NO_RESPONSE].contains(self)
  }
}

/// # Option Value
///
/// An opaque sequence of bytes. Depending on the option this
/// may be interpreted as a string, an unsigned integer, or nothing at all.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// Encode an unsigned integer in the minimal number of bytes
  ///
  /// ```
  /// use croak_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(1024).0, vec![4, 0]);
  /// ```
  pub fn uint(n: u32) -> Self {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[skip..].to_vec())
  }

  /// Interpret this value as an unsigned integer
  ///
  /// Yields `None` if the value is longer than 4 bytes.
  pub fn as_uint(&self) -> Option<u32> {
    if self.0.len() > 4 {
      None
    } else {
      Some(self.0.iter().fold(0u32, |n, b| (n << 8) | u32::from(*b)))
    }
  }

  /// Get the bytes of this value
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl From<&[u8]> for OptValue {
  fn from(bytes: &[u8]) -> Self {
    Self(bytes.to_vec())
  }
}

impl From<Vec<u8>> for OptValue {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

/// Options in a message, ordered by number.
///
/// Repeatable options hold their values in the order they
/// appeared in the message.
pub type OptionMap = BTreeMap<OptNumber, Vec<OptValue>>;

/// Read the extended part of an option delta or length
/// given the 4-bit nibble from the option header.
fn parse_opt_len_or_delta(nibble: u8,
                          bytes: &mut Cursor<'_>,
                          reserved_err: OptParseError)
                          -> Result<u32, OptParseError> {
  match nibble {
    | 13 => bytes.next()
                 .map(|n| u32::from(n) + 13)
                 .ok_or_else(OptParseError::eof),
    | 14 => bytes.take_exact(2)
                 .map(|n| u32::from(u16::from_be_bytes([n[0], n[1]])) + 269)
                 .ok_or_else(OptParseError::eof),
    | 15 => Err(reserved_err),
    | n => Ok(u32::from(n)),
  }
}

/// Parse options until the payload marker or the end of the buffer.
///
/// Does not consume the payload marker.
pub(crate) fn parse_opts(bytes: &mut Cursor<'_>) -> Result<OptionMap, OptParseError> {
  let mut opts = OptionMap::new();
  let mut number = 0u32;

  loop {
    match bytes.peek() {
      | None | Some(0xFF) => break Ok(opts),
      | Some(_) => (),
    }

    let head = bytes.next().ok_or_else(OptParseError::eof)?;
    let delta = parse_opt_len_or_delta(head >> 4,
                                       bytes,
                                       OptParseError::OptionDeltaReservedValue(head >> 4))?;
    let len = parse_opt_len_or_delta(head & 0b1111,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(head & 0b1111))?;

    number += delta;
    let num = u16::try_from(number).map_err(|_| OptParseError::OptionNumberTooLarge(number))?;

    let value = bytes.take_exact(len as usize)
                     .ok_or_else(OptParseError::eof)?;

    opts.entry(OptNumber(num))
        .or_insert_with(Vec::new)
        .push(OptValue(value.to_vec()));
  }
}

/// Get the 4-bit nibble & extended bytes for an option delta or length
pub(crate) fn opt_len_or_delta(val: usize) -> Option<(u8, ArrayVec<[u8; 2]>)> {
  match val {
    | n if n >= 269 => {
      let ext = u16::try_from(n - 269).ok()?;
      Some((14, ext.to_be_bytes().into()))
    },
    | n if n >= 13 => {
      let mut ext = ArrayVec::new();
      ext.push((n - 13) as u8);
      Some((13, ext))
    },
    | n => Some((n as u8, ArrayVec::new())),
  }
}

/// Number of bytes `opts` occupy on the wire
pub(crate) fn opts_size(opts: &OptionMap) -> usize {
  let mut prev = 0usize;
  let mut size = 0usize;

  for (num, values) in opts {
    for v in values {
      let delta = num.0 as usize - prev;
      prev = num.0 as usize;

      size += 1 + ext_size(delta) + ext_size(v.0.len()) + v.0.len();
    }
  }

  size
}

fn ext_size(n: usize) -> usize {
  match n {
    | n if n >= 269 => 2,
    | n if n >= 13 => 1,
    | _ => 0,
  }
}

pub(crate) fn write_opts(opts: &OptionMap, out: &mut Vec<u8>) -> Result<(), MessageToBytesError> {
  let mut prev = 0usize;

  for (num, values) in opts {
    for v in values {
      let (del, del_ext) =
        opt_len_or_delta(num.0 as usize - prev).ok_or(MessageToBytesError::OptionNumberTooLarge(num.0))?;
      let (len, len_ext) =
        opt_len_or_delta(v.0.len()).ok_or(MessageToBytesError::OptionValueTooLong(v.0.len()))?;
      prev = num.0 as usize;

      out.push((del << 4) | len);
      out.extend_from_slice(&del_ext);
      out.extend_from_slice(&len_ext);
      out.extend_from_slice(&v.0);
    }
  }

  Ok(())
}
