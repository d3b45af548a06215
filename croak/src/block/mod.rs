/// Picking the size of the next block to send
pub mod negotiate;

/// Tracking which blocks of a body arrived
pub mod ranges;

/// Buffers for bodies being reassembled
pub mod body;

/// Bodies received block by block
pub mod assembly;

/// Tokens carrying transfer identity & retry count
pub mod state_token;

pub(crate) mod crcv;
pub(crate) mod srcv;
pub(crate) mod xmit;
