/// Errors encounterable while parsing an option from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum OptParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Option delta was the reserved value 15 outside of a payload marker
  OptionDeltaReservedValue(u8),

  /// Value length was the reserved value 15
  ValueLengthReservedValue(u8),

  /// Adding the option delta to the previous option number
  /// exceeded the largest possible option number (65535)
  OptionNumberTooLarge(u32),
}

impl OptParseError {
  /// Shorthand for [`OptParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}
