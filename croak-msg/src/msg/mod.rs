use std_alloc::vec::Vec;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::{Code, CodeKind};
pub use id::Id;
pub use opt::known;
pub use opt::*;
pub use parse_error::MessageParseError;
pub use token::Token;
pub use ty::Type;
pub use ver::Version;

/// Message payload
#[derive(Clone, Hash, PartialEq, Eq, Debug, Default)]
pub struct Payload(pub Vec<u8>);

/// # CoAP Messages
///
/// Messages are the same shape for both the datagram & stream framings;
/// the [`Type`] and [`Id`] of a message are only put on the wire
/// by [`Framing::Datagram`](crate::Framing::Datagram).
///
/// ```
/// use croak_msg::{code, known, Block, Id, Message, Token, Type};
///
/// let mut req = Message::new(Type::Con, code::GET, Id(1), Token::default());
/// req.add(known::URI_PATH, b"sensors"[..].into());
/// req.set_block2(Block::new(0, 6, false).unwrap());
///
/// assert_eq!(req.block2(), Ok(Some(Block::new(0, 6, false).unwrap())));
/// assert_eq!(req.block1(), Ok(None));
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`OptionMap`] for details
  pub opts: OptionMap,
  /// see [`Payload`] for details
  pub payload: Payload,
}

impl Message {
  /// Create a message with no options and an empty payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { ver: Version::default(),
           ty,
           code,
           id,
           token,
           opts: OptionMap::new(),
           payload: Payload(Vec::new()) }
  }

  /// Create an empty ACK acknowledging this message
  pub fn ack(&self) -> Self {
    Self::new(Type::Ack, code::EMPTY, self.id, Token::default())
  }

  /// Create a RST rejecting this message
  pub fn reset(&self) -> Self {
    Self::new(Type::Reset, code::EMPTY, self.id, Token::default())
  }

  /// Is this a request?
  pub fn is_request(&self) -> bool {
    self.code.kind() == CodeKind::Request
  }

  /// Is this a response?
  pub fn is_response(&self) -> bool {
    self.code.kind() == CodeKind::Response
  }

  /// Is this an empty (0.00) message?
  pub fn is_empty(&self) -> bool {
    self.code.kind() == CodeKind::Empty
  }

  /// Is this a signaling (7.xx) message?
  pub fn is_signal(&self) -> bool {
    self.code.kind() == CodeKind::Signal
  }

  /// Get the payload bytes
  pub fn payload(&self) -> &[u8] {
    &self.payload.0
  }

  /// Get all values for an option
  pub fn get(&self, n: OptNumber) -> Option<&Vec<OptValue>> {
    self.opts.get(&n)
  }

  /// Get the first value of an option
  pub fn get_first(&self, n: OptNumber) -> Option<&OptValue> {
    self.get(n).and_then(|vs| vs.first())
  }

  /// Replace all values of an option with `v`,
  /// yielding the values that were there before.
  pub fn set(&mut self, n: OptNumber, v: OptValue) -> Option<Vec<OptValue>> {
    self.opts.insert(n, std_alloc::vec![v])
  }

  /// Add a value to a (repeatable) option
  pub fn add(&mut self, n: OptNumber, v: OptValue) {
    self.opts.entry(n).or_insert_with(Vec::new).push(v);
  }

  /// Remove all values of an option
  pub fn remove(&mut self, n: OptNumber) -> Option<Vec<OptValue>> {
    self.opts.remove(&n)
  }

  /// Interpret the first value of an option as an unsigned integer
  pub fn get_uint(&self, n: OptNumber) -> Option<u32> {
    self.get_first(n).and_then(OptValue::as_uint)
  }

  /// Set an option to an unsigned integer value
  pub fn set_uint(&mut self, n: OptNumber, v: u32) {
    self.set(n, OptValue::uint(v));
  }

  fn block(&self, n: OptNumber) -> Result<Option<Block>, BlockError> {
    self.get_first(n)
        .map(|v| Block::from_bytes(&v.0))
        .transpose()
  }

  /// Get the Block1 option, if present
  pub fn block1(&self) -> Result<Option<Block>, BlockError> {
    self.block(known::BLOCK1)
  }

  /// Get the Block2 option, if present
  pub fn block2(&self) -> Result<Option<Block>, BlockError> {
    self.block(known::BLOCK2)
  }

  /// Set the Block1 option
  pub fn set_block1(&mut self, b: Block) {
    self.set(known::BLOCK1, OptValue(b.to_bytes().to_vec()));
  }

  /// Set the Block2 option
  pub fn set_block2(&mut self, b: Block) {
    self.set(known::BLOCK2, OptValue(b.to_bytes().to_vec()));
  }

  /// Get the Size1 option (total size of the request body)
  pub fn size1(&self) -> Option<u32> {
    self.get_uint(known::SIZE1)
  }

  /// Set the Size1 option
  pub fn set_size1(&mut self, n: u32) {
    self.set_uint(known::SIZE1, n)
  }

  /// Get the Size2 option (total size of the response body)
  pub fn size2(&self) -> Option<u32> {
    self.get_uint(known::SIZE2)
  }

  /// Set the Size2 option
  pub fn set_size2(&mut self, n: u32) {
    self.set_uint(known::SIZE2, n)
  }

  /// Get the first ETag option
  pub fn etag(&self) -> Option<&OptValue> {
    self.get_first(known::ETAG)
  }

  /// Get the Echo option
  pub fn echo(&self) -> Option<&OptValue> {
    self.get_first(known::ECHO)
  }

  /// Get the Request-Tag option
  pub fn request_tag(&self) -> Option<&OptValue> {
    self.get_first(known::REQUEST_TAG)
  }

  /// Get the Content-Format option
  pub fn content_format(&self) -> Option<u32> {
    self.get_uint(known::CONTENT_FORMAT)
  }

  /// Get the Observe option
  pub fn observe(&self) -> Option<u32> {
    self.get_uint(known::OBSERVE)
  }

  /// Get the Accept option
  pub fn accept(&self) -> Option<u32> {
    self.get_uint(known::ACCEPT)
  }
}
