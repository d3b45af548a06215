use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// Configuration options related to outbound CON messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Con {
  /// Retry strategy for CON messages that
  /// have not yet been ACKed.
  ///
  /// Defaults to an exponential retry strategy with an initial
  /// timeout between ACK_TIMEOUT (2s) and ACK_TIMEOUT * ACK_RANDOM_FACTOR (3s):
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Con;
  /// use croak::retry::Strategy;
  ///
  /// assert_eq!(Con::default().retry_strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                    init_max: Milliseconds(3_000) });
  /// ```
  pub retry_strategy: Strategy,
  /// Number of times we are allowed to resend a CON message
  /// before giving up on it.
  ///
  /// Defaults to 4 retransmissions.
  /// ```
  /// use croak::config::Con;
  /// use croak::retry::Attempts;
  ///
  /// assert_eq!(Con::default().max_retransmit, Attempts(4));
  /// ```
  pub max_retransmit: Attempts,
}

impl Con {
  /// Total number of transmissions a CON message gets
  /// (the first, plus [`Con::max_retransmit`])
  pub fn max_attempts(&self) -> Attempts {
    Attempts(self.max_retransmit.0.saturating_add(1))
  }
}

/// Configuration options related to parsing & handling messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msg {
  /// Seed mixed into the per-session random number generator
  /// used for message ids, tokens and retransmission jitter.
  ///
  /// The default value is 0, although it is
  /// best practice to set this to something else.
  /// (random integer, machine identifier)
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_seed, 0);
  /// ```
  pub token_seed: u16,

  /// See [`Con`]
  pub con: Con,

  /// Number of CON messages that may be outstanding (not yet
  /// acknowledged) at once. Further CON messages wait in a
  /// delay queue.
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().nstart, 1);
  /// ```
  pub nstart: u8,

  /// Number of recently received message ids remembered
  /// for duplicate detection.
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().dedup_capacity, 64);
  /// ```
  pub dedup_capacity: usize,
}

impl Default for Con {
  fn default() -> Self {
    Con { retry_strategy: Strategy::Exponential { init_min: Milliseconds(2_000),
                                                  init_max: Milliseconds(3_000) },
          max_retransmit: Attempts(4) }
  }
}

impl Default for Msg {
  fn default() -> Self {
    Msg { token_seed: 0,
          con: Con::default(),
          nstart: 1,
          dedup_capacity: 64 }
  }
}

/// Configuration options related to block-wise transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  /// Block size (as SZX, `0..=6`) we prefer to send & receive.
  ///
  /// The size actually used may be smaller when the path MTU
  /// does not fit it, or when the peer asks for smaller blocks.
  ///
  /// Defaults to 6 (1024 bytes).
  /// ```
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().preferred_szx, 6);
  /// ```
  pub preferred_szx: u8,

  /// Whether BERT may be used on reliable transports that support it.
  ///
  /// ```
  /// use croak::config::Block;
  ///
  /// assert!(Block::default().bert);
  /// ```
  pub bert: bool,

  /// Maximum number of discontiguous runs of blocks tracked
  /// while reassembling a body. A transfer that would need more
  /// is abandoned.
  ///
  /// ```
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().max_ranges, 4);
  /// ```
  pub max_ranges: usize,

  /// Largest body we are willing to reassemble.
  ///
  /// ```
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().max_body_size, 16 * 1024 * 1024);
  /// ```
  pub max_body_size: usize,

  /// How long a fully transmitted body is retained so that
  /// late or repeated block requests can still be answered.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().xmit_linger, Milliseconds(8_000u64));
  /// ```
  pub xmit_linger: Millis,

  /// How long the state of a fully received body is retained
  /// (to suppress duplicates & echo Block1 in the final response).
  ///
  /// Defaults to 4 x ACK_TIMEOUT.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().rcv_linger, Milliseconds(8_000u64));
  /// ```
  pub rcv_linger: Millis,
}

impl Default for Block {
  fn default() -> Self {
    Block { preferred_szx: 6,
            bert: true,
            max_ranges: 4,
            max_body_size: 16 * 1024 * 1024,
            xmit_linger: Milliseconds(8_000),
            rcv_linger: Milliseconds(8_000) }
  }
}

/// Capabilities we advertise in our CSM on reliable transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csm {
  /// Largest message we are willing to receive
  ///
  /// ```
  /// use croak::config::Csm;
  ///
  /// assert_eq!(Csm::default().max_message_size, 1152);
  /// ```
  pub max_message_size: usize,
}

impl Default for Csm {
  fn default() -> Self {
    Csm { max_message_size: 1152 }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// See [`Block`]
  pub block: Block,
  /// See [`Csm`]
  pub csm: Csm,
}

impl Config {
  /// MAX_TRANSMIT_SPAN: time from the first transmission of a CON
  /// message to its last retransmission
  pub fn max_transmit_span_millis(&self) -> u64 {
    self.msg
        .con
        .retry_strategy
        .max_time(self.msg.con.max_retransmit)
        .0
  }

  /// MAX_TRANSMIT_WAIT: time from the first transmission of a CON
  /// message to when we give up waiting for an acknowledgement
  pub fn max_transmit_wait_millis(&self) -> u64 {
    self.msg
        .con
        .retry_strategy
        .max_time(self.msg.con.max_attempts())
        .0
  }

  pub(crate) fn max_latency_millis(&self) -> u64 {
    100_000
  }

  pub(crate) fn expected_processing_delay_millis(&self) -> u64 {
    2_000
  }

  /// EXCHANGE_LIFETIME: how long a message id may be
  /// considered for duplicate detection, and how long
  /// transfer state may sit idle before it is discarded.
  ///
  /// ```
  /// use croak::config::Config;
  ///
  /// assert_eq!(Config::default().exchange_lifetime_millis(), 247_000);
  /// ```
  pub fn exchange_lifetime_millis(&self) -> u64 {
    self.max_transmit_span_millis()
    + (2 * self.max_latency_millis())
    + self.expected_processing_delay_millis()
  }
}
