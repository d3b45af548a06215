use core::ops::Range;

use croak_msg::{Block, BlockError, BERT_UNIT};

use crate::error::Error;

/// What we know when picking the next block to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiate {
  /// Bytes left in the message for the payload
  pub avail: usize,
  /// SZX the transfer is using (7 asks for BERT)
  pub szx: u8,
  /// Number of the block to send, in units of `szx`
  pub num: u32,
  /// Total length of the body being sent
  pub body_len: usize,
  /// Is BERT possible? (reliable transport, both ends advertised it)
  pub bert: bool,
}

/// The block picked for a message, and the slice of the body it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
  /// Block option to put in the message
  pub block: Block,
  /// Offset of the payload in the body
  pub offset: usize,
  /// Length of the payload
  pub len: usize,
}

impl Chunk {
  /// Range of the body this chunk covers
  pub fn range(&self) -> Range<usize> {
    self.offset..self.offset + self.len
  }

  /// Offset of the first byte after this chunk
  pub fn end(&self) -> usize {
    self.offset + self.len
  }
}

/// Pick a legal block for the next message of a transfer.
///
/// BERT is used when eligible, packing as many 1024-byte units as fit.
/// Otherwise blocks are `2^(szx + 4)` bytes, shrinking to the largest size
/// that fits when the message has less room than one block and the rest of
/// the body does not fit either.
///
/// ```
/// use croak::block::negotiate::{negotiate, Negotiate};
///
/// let chunk = negotiate(Negotiate { avail: 20,
///                                   szx: 6,
///                                   num: 0,
///                                   body_len: 5000,
///                                   bert: false }).unwrap();
///
/// assert_eq!(chunk.block.szx(), 0);
/// assert_eq!(chunk.len, 16);
/// assert!(chunk.block.more());
/// ```
pub fn negotiate(n: Negotiate) -> Result<Chunk, Error> {
  let szx = n.szx.min(6);
  let size = Block::size_of(szx);
  let offset = n.num as usize * size;

  if offset > n.body_len || (offset == n.body_len && n.body_len > 0) {
    return Err(Error::BlockOutOfRange(n.num));
  }

  let remaining = n.body_len - offset;

  if n.bert && szx == 6 && n.avail >= BERT_UNIT {
    let chunk = (n.avail / BERT_UNIT) * BERT_UNIT;
    let block = Block::bert(n.num, chunk < remaining)?;
    return Ok(Chunk { block,
                      offset,
                      len: chunk.min(remaining) });
  }

  let (szx, size) = if n.avail < size && remaining >= n.avail {
    let szx = Block::szx_fitting(n.avail).ok_or(Error::NoBlockFits { avail: n.avail })?;
    (szx, Block::size_of(szx))
  } else {
    (szx, size)
  };

  let num = u32::try_from(offset / size).map_err(|_| BlockError::NumTooLarge(u32::MAX))?;
  let block = Block::new(num, szx, size < remaining)?;

  Ok(Chunk { block,
             offset,
             len: size.min(remaining) })
}

/// Decide whether a peer asking to continue a transfer at `requested_szx`
/// can be honored, given the offset of the next byte to send.
///
/// A new size is only taken on when the next block boundary at that size
/// lines up with the bytes already sent; otherwise yields `None` and the
/// transfer continues at its current size.
///
/// ```
/// use croak::block::negotiate::renegotiate;
///
/// // sent blocks 0..=2 at 64 bytes; 192 is not a multiple of 128
/// assert_eq!(renegotiate(192, 3), None);
/// // sent blocks 0..=1 at 64 bytes; 128 is
/// assert_eq!(renegotiate(128, 3), Some(3));
/// // shrinking always lines up
/// assert_eq!(renegotiate(192, 0), Some(0));
/// ```
pub fn renegotiate(next_offset: usize, requested_szx: u8) -> Option<u8> {
  let szx = requested_szx.min(6);
  if next_offset % Block::size_of(szx) == 0 {
    Some(szx)
  } else {
    None
  }
}

/// Smallest SZX at which a body of `len` bytes can be numbered
/// within 20 bits, or `None` if it is too large even for 1024-byte blocks
pub fn min_szx_for(len: usize) -> Option<u8> {
  (0..=6u8).find(|szx| {
             let blocks = (len + Block::size_of(*szx) - 1) / Block::size_of(*szx);
             blocks <= croak_msg::MAX_NUM as usize + 1
           })
}
