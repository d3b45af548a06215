use tinyvec::ArrayVec;

/// Message token for matching requests to responses
///
/// 0 to 8 opaque bytes. Unlike [`Id`](super::Id)s (which match
/// acknowledgements to the message they acknowledge), tokens
/// correlate a response with the request that elicited it.
///
/// See [RFC7252 - Token](https://datatracker.ietf.org/doc/html/rfc7252#section-5.3.1) for context
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// Take an arbitrary-length sequence of bytes and turn it into an opaque message token
  ///
  /// Currently uses the BLAKE2 hashing algorithm, but this may change in the future.
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// let my_token = Token::opaque(&[0, 1, 2]);
  /// assert_eq!(my_token.0.len(), 8);
  /// ```
  pub fn opaque(data: &[u8]) -> Token {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let mut digest = Blake2b::<U8>::new();
    digest.update(data);
    Token(Into::<[u8; 8]>::into(digest.finalize()).into())
  }

  /// Copy up to 8 bytes into a token, ignoring the rest
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// assert_eq!(Token::from_slice(&[1, 2]).as_bytes(), &[1, 2]);
  /// ```
  pub fn from_slice(bytes: &[u8]) -> Token {
    let mut t = ArrayVec::new();
    t.extend_from_slice(&bytes[..bytes.len().min(8)]);
    Token(t)
  }

  /// Get the bytes of this token
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Is this the zero-length token?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}
