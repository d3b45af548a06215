use std_alloc::vec::Vec;

/// An inclusive run of block numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Run {
  /// First block in the run
  pub begin: u32,
  /// Last block in the run
  pub end: u32,
}

/// Recording a block would need more runs than allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TooManyRanges;

/// Which blocks of a body have arrived.
///
/// Runs are kept sorted, non-overlapping and non-adjacent; at most
/// `capacity` runs may exist at once so that a lossy transfer is
/// abandoned instead of stalling forever.
///
/// ```
/// use croak::block::ranges::{Ranges, Run};
///
/// let mut r = Ranges::new(4);
/// r.update(0).unwrap();
/// r.update(2).unwrap();
/// assert!(!r.is_complete(3));
///
/// r.update(1).unwrap();
/// assert_eq!(r.runs(), &[Run { begin: 0, end: 2 }]);
/// assert!(r.is_complete(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranges {
  runs: Vec<Run>,
  capacity: usize,
}

impl Ranges {
  /// Create an empty tracker allowing `capacity` runs
  pub fn new(capacity: usize) -> Self {
    Self { runs: Vec::new(),
           capacity: capacity.max(1) }
  }

  /// Record that a block arrived
  pub fn update(&mut self, num: u32) -> Result<(), TooManyRanges> {
    self.update_range(num, num)
  }

  /// Record that blocks `begin..=end` arrived (BERT blocks cover several)
  pub fn update_range(&mut self, begin: u32, end: u32) -> Result<(), TooManyRanges> {
    let (begin, end) = (begin.min(end), begin.max(end));

    let mut i = 0;
    while i < self.runs.len() && self.runs[i].end.saturating_add(1) < begin {
      i += 1;
    }

    if i == self.runs.len() || self.runs[i].begin > end.saturating_add(1) {
      if self.runs.len() >= self.capacity {
        return Err(TooManyRanges);
      }

      self.runs.insert(i, Run { begin, end });
      return Ok(());
    }

    let run = &mut self.runs[i];
    run.begin = run.begin.min(begin);
    run.end = run.end.max(end);

    while i + 1 < self.runs.len() && self.runs[i + 1].begin <= self.runs[i].end.saturating_add(1) {
      let next = self.runs.remove(i + 1);
      self.runs[i].end = self.runs[i].end.max(next.end);
    }

    Ok(())
  }

  /// Has every block in `0..total` arrived?
  pub fn is_complete(&self, total: u32) -> bool {
    match self.runs.as_slice() {
      | _ if total == 0 => true,
      | [only] => only.begin == 0 && only.end >= total - 1,
      | _ => false,
    }
  }

  /// Has this block arrived?
  pub fn contains(&self, num: u32) -> bool {
    self.runs.iter().any(|r| r.begin <= num && num <= r.end)
  }

  /// The lowest block that has not arrived
  pub fn first_missing(&self) -> u32 {
    match self.runs.first() {
      | Some(r) if r.begin == 0 => r.end.saturating_add(1),
      | _ => 0,
    }
  }

  /// Switch to blocks `factor` times smaller (when the block size shrinks
  /// mid-transfer, block `n` becomes blocks `n * factor ..= n * factor + factor - 1`)
  pub fn rescale(&mut self, factor: u32) {
    let factor = factor.max(1);
    self.runs.iter_mut().for_each(|r| {
                          r.begin = r.begin.saturating_mul(factor);
                          r.end = r.end.saturating_mul(factor).saturating_add(factor - 1);
                        });
  }

  /// Forget every block
  pub fn clear(&mut self) {
    self.runs.clear();
  }

  /// The runs of blocks that have arrived
  pub fn runs(&self) -> &[Run] {
    &self.runs
  }

  /// Has nothing arrived yet?
  pub fn is_empty(&self) -> bool {
    self.runs.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn runs(r: &Ranges) -> Vec<(u32, u32)> {
    r.runs().iter().map(|r| (r.begin, r.end)).collect()
  }

  #[test]
  fn merge_adjacent_on_both_sides() {
    let mut r = Ranges::new(4);
    r.update(0).unwrap();
    r.update(4).unwrap();
    r.update(2).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(0, 0), (2, 2), (4, 4)]);

    r.update(3).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(0, 0), (2, 4)]);

    r.update(1).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(0, 4)]);
  }

  #[test]
  fn duplicates_are_idempotent() {
    let mut r = Ranges::new(1);
    r.update(0).unwrap();
    r.update(1).unwrap();
    r.update(0).unwrap();
    r.update(1).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(0, 1)]);
  }

  #[test]
  fn over_capacity_fails() {
    let mut r = Ranges::new(2);
    r.update(0).unwrap();
    r.update(2).unwrap();
    assert_eq!(r.update(4), Err(TooManyRanges));
    assert_eq!(runs(&r), std_alloc::vec![(0, 0), (2, 2)]);

    // filling a gap still works at capacity
    r.update(1).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(0, 2)]);
  }

  #[test]
  fn range_spanning_several_runs() {
    let mut r = Ranges::new(4);
    r.update(1).unwrap();
    r.update(5).unwrap();
    r.update(9).unwrap();
    r.update_range(2, 8).unwrap();
    assert_eq!(runs(&r), std_alloc::vec![(1, 9)]);
  }

  #[test]
  fn complete_requires_block_zero() {
    let mut r = Ranges::new(4);
    r.update_range(1, 9).unwrap();
    assert!(!r.is_complete(10));
    assert_eq!(r.first_missing(), 0);

    r.update(0).unwrap();
    assert!(r.is_complete(10));
    assert!(!r.is_complete(11));
    assert_eq!(r.first_missing(), 10);
  }

  #[test]
  fn rescale() {
    let mut r = Ranges::new(4);
    r.update_range(0, 1).unwrap();
    r.rescale(4);
    assert_eq!(runs(&r), std_alloc::vec![(0, 7)]);
  }

  #[test]
  fn never_complete_with_gap() {
    // every subset of 0..6 missing at least one block is incomplete
    for missing in 0..6u32 {
      let mut r = Ranges::new(4);
      (0..6).filter(|n| *n != missing)
            .for_each(|n| r.update(n).unwrap());
      assert!(!r.is_complete(6));
      assert!(!r.contains(missing));
    }
  }
}
