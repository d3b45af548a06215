/// A cursor over a byte slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  pub(crate) fn new(bytes: &'a [u8]) -> Self {
    Self { bytes, pos: 0 }
  }

  /// Take the next byte, returning None if the cursor is exhausted.
  pub(crate) fn next(&mut self) -> Option<u8> {
    self.take_exact(1).map(|b| b[0])
  }

  /// Without advancing, look at the next byte.
  pub(crate) fn peek(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  /// Take `n` bytes, returning None (and consuming nothing)
  /// if there are fewer than `n` bytes remaining.
  pub(crate) fn take_exact(&mut self, n: usize) -> Option<&'a [u8]> {
    if n > self.remaining() {
      return None;
    }

    let out = &self.bytes[self.pos..self.pos + n];
    self.pos += n;
    Some(out)
  }

  /// Consume everything left in the buffer
  pub(crate) fn take_until_end(&mut self) -> &'a [u8] {
    let out = &self.bytes[self.pos..];
    self.pos = self.bytes.len();
    out
  }

  pub(crate) fn remaining(&self) -> usize {
    self.bytes.len() - self.pos
  }

  pub(crate) fn is_exhausted(&self) -> bool {
    self.remaining() == 0
  }

  pub(crate) fn position(&self) -> usize {
    self.pos
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next() {
    let mut cur = Cursor::new(&[1]);
    assert_eq!(cur.next(), Some(1));
    assert_eq!(cur.next(), None);
    assert!(cur.is_exhausted());
  }

  #[test]
  fn take_exact() {
    let mut cur = Cursor::new(&[1, 2, 3]);
    assert_eq!(cur.take_exact(2), Some([1u8, 2].as_ref()));
    assert_eq!(cur.take_exact(2), None);
    assert_eq!(cur.position(), 2);
    assert_eq!(cur.take_until_end(), &[3]);
    assert_eq!(cur.take_until_end(), &[] as &[u8]);
  }

  #[test]
  fn peek() {
    let cur = Cursor::new(&[9, 8]);
    assert_eq!(cur.peek(), Some(9));
    assert_eq!(cur.remaining(), 2);
  }
}
