use super::opt::parse_error::OptParseError;

/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Token length was > 8
  InvalidTokenLength(u8),

  /// Error parsing option
  OptParseError(OptParseError),

  /// The message type is invalid (see [`Type`](super::Type) for information & valid values)
  InvalidType(u8),

  /// A payload marker was present but no payload followed it
  EmptyPayloadAfterMarker,

  /// The length declared in a stream frame header
  /// did not match the number of bytes in the frame
  FrameLengthMismatch {
    /// Length in the frame header
    declared: usize,
    /// Bytes actually present after the header
    actual: usize,
  },
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}

impl From<OptParseError> for MessageParseError {
  fn from(e: OptParseError) -> Self {
    Self::OptParseError(e)
  }
}
