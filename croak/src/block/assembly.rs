use std_alloc::vec::Vec;

use croak_msg::Block;

use super::body::Body;
use super::ranges::Ranges;
use crate::error::Error;

/// A body being received block by block, in any order.
///
/// Arrivals are tracked in units of the smallest block size seen so far.
/// When the peer switches to smaller blocks mid-transfer the tracker is
/// rescaled, so blocks of different sizes can be mixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
  body: Body,
  ranges: Ranges,
  unit_szx: u8,
  total: Option<usize>,
}

impl Assembly {
  /// Create an empty assembly allowing `max_ranges` gaps and
  /// bodies of at most `max_body` bytes
  pub fn new(max_ranges: usize, max_body: usize) -> Self {
    Self { body: Body::new(max_body),
           ranges: Ranges::new(max_ranges),
           unit_szx: 6,
           total: None }
  }

  /// Record a block, yielding whether the body is now complete.
  ///
  /// `declared` is the total size the peer announced (Size1 / Size2).
  ///
  /// ```
  /// use croak::block::assembly::Assembly;
  /// use croak_msg::Block;
  ///
  /// let mut asm = Assembly::new(4, 1024);
  /// let last = Block::new(1, 0, false).unwrap();
  /// let first = Block::new(0, 0, true).unwrap();
  ///
  /// assert_eq!(asm.record(last, &[2; 4], None), Ok(false));
  /// assert_eq!(asm.record(first, &[1; 16], None), Ok(true));
  /// assert_eq!(asm.take().len(), 20);
  /// ```
  pub fn record(&mut self, block: Block, payload: &[u8], declared: Option<usize>) -> Result<bool, Error> {
    let szx = block.logical_szx();

    if self.ranges.is_empty() {
      self.unit_szx = szx;
    } else if szx < self.unit_szx {
      self.ranges.rescale(1 << (self.unit_szx - szx));
      self.unit_szx = szx;
    }

    let offset = block.offset();
    self.body.write(offset, payload, declared)?;

    let unit = Block::size_of(self.unit_szx);
    let begin = offset / unit;
    let end = match payload.len() {
      | 0 => begin,
      | n => (offset + n - 1) / unit,
    };

    self.ranges
        .update_range(begin as u32, end as u32)
        .map_err(|_| Error::TooManyRanges)?;

    if !block.more() {
      self.total = Some(offset + payload.len());
    }

    Ok(self.is_complete())
  }

  /// Has every byte up to the final block arrived?
  pub fn is_complete(&self) -> bool {
    let unit = Block::size_of(self.unit_szx);
    self.total
        .map(|total| self.ranges.is_complete(((total + unit - 1) / unit) as u32))
        .unwrap_or(false)
  }

  /// Has any block arrived?
  pub fn is_empty(&self) -> bool {
    self.ranges.is_empty()
  }

  /// Byte offset of the first block that has not arrived
  pub fn next_missing_offset(&self) -> usize {
    self.ranges.first_missing() as usize * Block::size_of(self.unit_szx)
  }

  /// Total length of the body, once the final block arrived
  pub fn total(&self) -> Option<usize> {
    self.total
  }

  /// Take the assembled body, leaving this empty
  pub fn take(&mut self) -> Vec<u8> {
    let total = self.total.unwrap_or_else(|| self.body.len());
    let body = self.body.take(total);
    self.reset();
    body
  }

  /// Forget everything received so far
  pub fn reset(&mut self) {
    self.body.clear();
    self.ranges.clear();
    self.total = None;
  }
}
