use core::fmt::{self, Debug};
use core::hash::{Hash, Hasher};

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

use crate::{known, Message};

/// [`Hasher`] backed by 8-byte BLAKE2b digests
///
/// Unlike `std`'s `DefaultHasher`, output is stable
/// across processes & platforms.
#[derive(Clone, Default)]
pub struct Blake2Hasher(Blake2b<U8>);

impl Debug for Blake2Hasher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Blake2Hasher")
  }
}

impl Hasher for Blake2Hasher {
  fn finish(&self) -> u64 {
    u64::from_be_bytes(self.0.clone().finalize().into())
  }

  fn write(&mut self, bytes: &[u8]) {
    self.0.update(bytes);
  }
}

/// The cache key can be used to compare messages for representing
/// the same action against the same resource; for example requests
/// with different IDs but the same method and cache-key affecting options
/// (ex. path, query parameters) will yield the same cache-key.
///
/// [`DefaultCacheKey`] Provides a default implementation.
pub trait CacheKey
  where Self: Sized + Debug
{
  /// Type used to generate hashes
  type Hasher: Hasher;

  #[allow(missing_docs)]
  fn hasher(&mut self) -> &mut Self::Hasher;

  /// Add this message's cache key to the hasher's internal state.
  fn add_cache_key(&mut self, msg: &Message);

  /// Add this message's cache key to the hasher's internal state and yield the [`u64`] hash.
  ///
  /// ```
  /// use croak_msg::{code, known, CacheKey, DefaultCacheKey, Block, Id, Message, Token, Type};
  ///
  /// let mut a = Message::new(Type::Con, code::GET, Id(1), Token::from_slice(&[1]));
  /// a.add(known::URI_PATH, b"temp"[..].into());
  ///
  /// let mut b = Message::new(Type::Non, code::GET, Id(2), Token::from_slice(&[2]));
  /// b.add(known::URI_PATH, b"temp"[..].into());
  /// b.set_block2(Block::new(4, 2, false).unwrap());
  ///
  /// assert_eq!(DefaultCacheKey::new().cache_key(&a), DefaultCacheKey::new().cache_key(&b));
  /// ```
  fn cache_key(mut self, msg: &Message) -> u64 {
    self.add_cache_key(msg);
    self.hasher().finish()
  }
}

/// Hashes:
///  - [Message Code](crate::Message::code)
///  - options for which [`OptNumber::include_in_cache_key`](crate::OptNumber::include_in_cache_key) holds
#[derive(Debug, Clone, Default)]
pub struct DefaultCacheKey(Blake2Hasher);

impl DefaultCacheKey {
  /// Create a new `DefaultCacheKey`
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheKey for DefaultCacheKey {
  type Hasher = Blake2Hasher;

  fn hasher(&mut self) -> &mut Self::Hasher {
    &mut self.0
  }

  fn add_cache_key(&mut self, msg: &Message) {
    msg.code.hash(&mut self.0);
    msg.opts
       .iter()
       .filter(|(num, _)| num.include_in_cache_key())
       .for_each(|(num, vals)| {
         num.hash(&mut self.0);
         vals.hash(&mut self.0);
       });
  }
}

/// Hashes only the method and the options that identify the target
/// resource (Uri-Host, Uri-Port, Uri-Path & Uri-Query).
///
/// Two uploads to the same resource share a resource key even if they
/// differ in representation-describing options like Content-Format.
#[derive(Debug, Clone, Default)]
pub struct ResourceKey(Blake2Hasher);

impl ResourceKey {
  /// Create a new `ResourceKey`
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheKey for ResourceKey {
  type Hasher = Blake2Hasher;

  fn hasher(&mut self) -> &mut Self::Hasher {
    &mut self.0
  }

  fn add_cache_key(&mut self, msg: &Message) {
    msg.code.hash(&mut self.0);
    [known::URI_HOST, known::URI_PORT, known::URI_PATH, known::URI_QUERY].iter()
                                                                       .for_each(|num| {
                                                                         num.hash(&mut self.0);
                                                                         msg.get(*num).hash(&mut self.0);
                                                                       });
  }
}

impl Message {
  /// Shorthand for `DefaultCacheKey::new().cache_key(self)`
  pub fn cache_key(&self) -> u64 {
    DefaultCacheKey::new().cache_key(self)
  }

  /// Shorthand for `ResourceKey::new().cache_key(self)`
  pub fn resource_key(&self) -> u64 {
    ResourceKey::new().cache_key(self)
  }
}
