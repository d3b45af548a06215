use std_alloc::vec::Vec;

use crate::error::Error;

/// A body being reassembled from blocks.
///
/// Fragments are written at their absolute offset, so they
/// may arrive in any order. The buffer is sized to the declared
/// total on first write, and grows if a fragment lands past it
/// (declared sizes are only estimates).
///
/// ```
/// use croak::block::body::Body;
///
/// let mut body = Body::new(1024);
/// body.write(4, b"5678", Some(8)).unwrap();
/// body.write(0, b"1234", Some(8)).unwrap();
///
/// assert_eq!(body.take(8), b"12345678".to_vec());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
  buf: Vec<u8>,
  high_water: usize,
  limit: usize,
}

impl Body {
  /// Create an empty body that refuses to grow past `limit` bytes
  pub fn new(limit: usize) -> Self {
    Self { buf: Vec::new(),
           high_water: 0,
           limit }
  }

  /// Write a fragment at `offset`.
  ///
  /// `declared` is the total length the peer announced, if any.
  pub fn write(&mut self, offset: usize, fragment: &[u8], declared: Option<usize>) -> Result<(), Error> {
    let end = offset + fragment.len();

    if end > self.limit {
      return Err(Error::BodyTooLarge { len: end,
                                       max: self.limit });
    }

    if self.buf.is_empty() {
      if let Some(declared) = declared {
        self.buf.reserve_exact(declared.min(self.limit));
      }
    }

    if end > self.buf.len() {
      self.buf.resize(end, 0);
    }

    self.buf[offset..end].copy_from_slice(fragment);
    self.high_water = self.high_water.max(end);
    Ok(())
  }

  /// Offset one past the furthest byte written
  pub fn len(&self) -> usize {
    self.high_water
  }

  /// Has nothing been written?
  pub fn is_empty(&self) -> bool {
    self.high_water == 0
  }

  /// Largest body this will hold
  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Take the first `total` bytes of the body, leaving it empty
  pub fn take(&mut self, total: usize) -> Vec<u8> {
    let mut buf = core::mem::take(&mut self.buf);
    buf.truncate(total);
    self.high_water = 0;
    buf
  }

  /// Discard everything written so far
  pub fn clear(&mut self) {
    self.buf.clear();
    self.high_water = 0;
  }
}
