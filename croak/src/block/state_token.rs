use croak_msg::Token;

const BASE_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Identifies one logical block-wise transfer on the wire.
///
/// Every message of a transfer carries a token made from the
/// same 48-bit `base`; `retry` increases with each message so
/// that a response can be matched to the transfer it belongs
/// to even when it answers an older request.
///
/// On the wire the token is the minimal big-endian encoding
/// of `base | retry << 48`.
///
/// ```
/// use croak::block::state_token::StateToken;
///
/// let t = StateToken::new(0x0102);
/// assert_eq!(t.to_token().as_bytes(), &[0x01, 0x02]);
///
/// let next = t.next();
/// assert_eq!(next.to_token().as_bytes(), &[0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02]);
/// assert_eq!(StateToken::from_token(&next.to_token()), next);
/// assert!(next.same_transfer(&t));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateToken {
  base: u64,
  retry: u16,
}

impl StateToken {
  /// A fresh transfer (retry 0); bits of `base` above 48 are dropped
  pub fn new(base: u64) -> Self {
    Self { base: base & BASE_MASK,
           retry: 0 }
  }

  /// 48-bit identifier of the transfer
  pub fn base(&self) -> u64 {
    self.base
  }

  /// Number of messages sent for this transfer before this one
  pub fn retry(&self) -> u16 {
    self.retry
  }

  /// The token for the next message of this transfer.
  ///
  /// The counter skips 0 when it wraps, so a wrapped token never
  /// collides with the first message of the transfer.
  pub fn next(self) -> Self {
    Self { retry: self.retry.checked_add(1).unwrap_or(1),
           ..self }
  }

  /// Do these tokens belong to the same transfer?
  pub fn same_transfer(&self, other: &Self) -> bool {
    self.base == other.base
  }

  /// Pack into one 64-bit value
  pub fn to_u64(&self) -> u64 {
    self.base | (u64::from(self.retry) << 48)
  }

  /// Unpack from one 64-bit value
  pub fn from_u64(n: u64) -> Self {
    Self { base: n & BASE_MASK,
           retry: (n >> 48) as u16 }
  }

  /// Encode as a message token
  pub fn to_token(&self) -> Token {
    let bytes = self.to_u64().to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Token::from_slice(&bytes[skip..])
  }

  /// Decode a message token
  pub fn from_token(token: &Token) -> Self {
    Self::from_u64(token.as_bytes()
                        .iter()
                        .fold(0u64, |n, b| (n << 8) | u64::from(*b)))
  }
}
