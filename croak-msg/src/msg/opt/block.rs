use core::fmt;

use tinyvec::ArrayVec;

/// The largest block number encodable in a Block1 / Block2 option (20 bits)
pub const MAX_NUM: u32 = 0xF_FFFF;

/// SZX value reserved for BERT (RFC8323); a BERT block carries
/// one or more 1024-byte units.
pub const BERT_SZX: u8 = 7;

/// Size of the units that BERT blocks are counted in
pub const BERT_UNIT: usize = 1024;

/// Errors encounterable while creating or decoding a [`Block`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockError {
  /// Block numbers must fit in 20 bits
  NumTooLarge(u32),
  /// SZX values are 3 bits wide
  SzxTooLarge(u8),
  /// Block option values are at most 3 bytes long
  TooLong(usize),
}

impl fmt::Display for BlockError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::NumTooLarge(n) => write!(f, "block number {} does not fit in 20 bits", n),
      | Self::SzxTooLarge(s) => write!(f, "szx {} is not in 0..=7", s),
      | Self::TooLong(n) => write!(f, "block option value was {} bytes long", n),
    }
  }
}

/// # Block1 / Block2 option values
///
/// The value of a block option is an unsigned integer laid out as:
///
/// ```text
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 NUM                   |M| SZX |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// where the block size is `2^(SZX + 4)` bytes (16 to 1024).
///
/// SZX 7 denotes a BERT block: the block size is treated as
/// 1024 bytes for offset arithmetic, and the payload may hold
/// any multiple of 1024 bytes.
///
/// ```
/// use croak_msg::Block;
///
/// let b = Block::new(3, 2, true).unwrap();
/// assert_eq!(b.size(), 64);
/// assert_eq!(b.offset(), 192);
/// assert_eq!(u32::from(b), 0b0011_1_010);
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Block {
  num: u32,
  more: bool,
  szx: u8,
}

impl Block {
  /// Create a block option value, failing if `num` does not fit in 20 bits
  /// or `szx` is greater than 7.
  pub fn new(num: u32, szx: u8, more: bool) -> Result<Self, BlockError> {
    if num > MAX_NUM {
      Err(BlockError::NumTooLarge(num))
    } else if szx > BERT_SZX {
      Err(BlockError::SzxTooLarge(szx))
    } else {
      Ok(Self { num, more, szx })
    }
  }

  /// Create a BERT block option value
  ///
  /// `num` counts 1024-byte units.
  pub fn bert(num: u32, more: bool) -> Result<Self, BlockError> {
    Self::new(num, BERT_SZX, more)
  }

  /// Number of the block (in units of [`Block::size`])
  pub fn num(&self) -> u32 {
    self.num
  }

  /// Whether more blocks follow this one
  pub fn more(&self) -> bool {
    self.more
  }

  /// SZX as it appears on the wire (`0..=7`)
  pub fn szx(&self) -> u8 {
    self.szx
  }

  /// SZX used for arithmetic; BERT (7) is treated as 6
  pub fn logical_szx(&self) -> u8 {
    self.szx.min(6)
  }

  /// Is this a BERT block?
  pub fn is_bert(&self) -> bool {
    self.szx == BERT_SZX
  }

  /// Size in bytes of blocks in this transfer
  ///
  /// BERT blocks report the 1024-byte unit size.
  pub fn size(&self) -> usize {
    Self::size_of(self.szx)
  }

  /// Byte offset of this block within the body
  pub fn offset(&self) -> usize {
    self.num as usize * self.size()
  }

  /// Size in bytes of blocks with a given SZX
  ///
  /// ```
  /// use croak_msg::Block;
  ///
  /// assert_eq!(Block::size_of(0), 16);
  /// assert_eq!(Block::size_of(6), 1024);
  /// assert_eq!(Block::size_of(7), 1024);
  /// ```
  pub fn size_of(szx: u8) -> usize {
    1 << (szx.min(6) + 4)
  }

  /// Largest SZX whose block size is `<= size`, if any
  ///
  /// ```
  /// use croak_msg::Block;
  ///
  /// assert_eq!(Block::szx_fitting(20), Some(0));
  /// assert_eq!(Block::szx_fitting(100), Some(2));
  /// assert_eq!(Block::szx_fitting(4000), Some(6));
  /// assert_eq!(Block::szx_fitting(15), None);
  /// ```
  pub fn szx_fitting(size: usize) -> Option<u8> {
    if size < 16 {
      None
    } else {
      let log2 = (usize::BITS - 1 - size.leading_zeros()) as u8;
      Some((log2 - 4).min(6))
    }
  }

  /// Copy of this block with a different `more` flag
  pub fn with_more(self, more: bool) -> Self {
    Self { more, ..self }
  }

  /// Decode a block option value
  ///
  /// A zero-length value decodes as block 0, SZX 0, no more blocks.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
    if bytes.len() > 3 {
      return Err(BlockError::TooLong(bytes.len()));
    }

    let n = bytes.iter().fold(0u32, |n, b| (n << 8) | u32::from(*b));
    Self::try_from(n)
  }

  /// Encode as the minimal big-endian option value
  pub fn to_bytes(&self) -> ArrayVec<[u8; 3]> {
    let n = u32::from(*self).to_be_bytes();
    let skip = n.iter().take_while(|b| **b == 0).count();
    n[skip..].iter().copied().collect()
  }
}

impl TryFrom<u32> for Block {
  type Error = BlockError;

  fn try_from(n: u32) -> Result<Self, Self::Error> {
    Self::new(n >> 4, (n & 0b111) as u8, n & 0b1000 != 0)
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> u32 {
    (b.num << 4) | (u32::from(b.more) << 3) | u32::from(b.szx)
  }
}
