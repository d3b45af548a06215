use core::fmt;

use croak_msg::{BlockError, Code, MessageToBytesError};

use crate::platform::NackReason;

/// Errors that abort an operation or a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  /// A block option could not be built or was malformed
  Block(BlockError),
  /// Not even the smallest block (16 bytes) fits in the space
  /// left in the message
  NoBlockFits {
    /// Bytes available for payload
    avail: usize,
  },
  /// The requested block starts past the end of the body
  BlockOutOfRange(u32),
  /// The body is larger than we (or the peer) will handle
  BodyTooLarge {
    /// Length of the body
    len: usize,
    /// Largest acceptable length
    max: usize,
  },
  /// The received-block tracker ran out of room for gaps
  TooManyRanges,
  /// A message could not be serialized
  ToBytes(MessageToBytesError),
  /// The transfer went idle for too long
  Timeout,
  /// The peer responded with an error code
  Rejected(Code),
  /// A message belonging to the transfer was not delivered
  Nack(NackReason),
  /// The application cancelled the transfer
  Cancelled,
  /// The session was closed before the transfer finished
  SessionClosed,
  /// Only requests may carry an uploaded body
  NotARequest(Code),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Block(e) => write!(f, "{}", e),
      | Self::NoBlockFits { avail } => write!(f, "no block size fits in {} bytes", avail),
      | Self::BlockOutOfRange(n) => write!(f, "block {} is past the end of the body", n),
      | Self::BodyTooLarge { len, max } => write!(f, "body of {} bytes exceeds {} bytes", len, max),
      | Self::TooManyRanges => write!(f, "too many missing blocks"),
      | Self::ToBytes(e) => write!(f, "{}", e),
      | Self::Timeout => write!(f, "transfer timed out"),
      | Self::Rejected(c) => write!(f, "peer responded {}", c),
      | Self::Nack(r) => write!(f, "message not delivered: {:?}", r),
      | Self::Cancelled => write!(f, "transfer cancelled"),
      | Self::SessionClosed => write!(f, "session closed"),
      | Self::NotARequest(c) => write!(f, "{} is not a request code", c),
    }
  }
}

impl From<BlockError> for Error {
  fn from(e: BlockError) -> Self {
    Self::Block(e)
  }
}

impl From<MessageToBytesError> for Error {
  fn from(e: MessageToBytesError) -> Self {
    Self::ToBytes(e)
  }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
