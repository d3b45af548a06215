use core::fmt;

use croak_msg::{Message, Token};
use std_alloc::string::String;
use std_alloc::vec::Vec;

use crate::error::Error;
use crate::net::Addrd;

/// Caller-owned body handed back when the engine is done with it.
///
/// `Ok` when the body was fully transferred, `Err` with the
/// reason otherwise. Either way the caller regains ownership.
pub type Released<B> = Result<B, (B, Error)>;

/// Why a message could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NackReason {
  /// The message was retransmitted `MAX_RETRANSMIT` times without acknowledgement
  TooManyRetries,
  /// The transport refused the message, or the session went away
  NotDeliverable,
  /// The peer rejected the message with a Reset
  Rst,
  /// The security layer failed; the session is unusable
  TlsFailed,
  /// The network reported a (possibly transient) ICMP error
  IcmpIssue,
}

/// Out-of-band events an application may want to know about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
  /// The transport connection is up (reliable transports)
  SessionConnected,
  /// The session may carry application traffic
  SessionEstablished,
  /// The session was closed
  SessionClosed,
  /// The session failed (e.g. the security handshake failed)
  SessionFailed,
  /// A body being received was abandoned before it was complete
  ///
  /// Carries the token of the request the body belongs to.
  PartialBlock(Token),
  /// A body being sent was abandoned before the peer had all of it
  ///
  /// Carries the token of the request the body belongs to.
  XmitBlockFail(Token),
}

/// Used by [`Session`](crate::session::Session) to deterministically communicate
/// to its driver side-effects that it would like to perform.
#[allow(missing_docs)]
pub enum Effect<B> {
  Send(Addrd<Message>),
  Log(log::Level, String),
  /// A message we sent (identified by the token the application used) was not delivered
  Nack(Token, NackReason),
  Event(Event),
  /// A caller-owned body is no longer needed by the engine
  Release(Token, Released<B>),
}

/// Vec of [`Effect`]s
pub type Effects<B> = Vec<Effect<B>>;

impl<B: Clone> Clone for Effect<B> {
  fn clone(&self) -> Self {
    match self {
      | Effect::Send(m) => Effect::Send(m.clone()),
      | Effect::Log(l, m) => Effect::Log(*l, m.clone()),
      | Effect::Nack(t, r) => Effect::Nack(*t, *r),
      | Effect::Event(e) => Effect::Event(e.clone()),
      | Effect::Release(t, b) => Effect::Release(*t, b.clone()),
    }
  }
}

impl<B> fmt::Debug for Effect<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Send(m) => f.debug_tuple("Send").field(m).finish(),
      | Self::Log(l, s) => f.debug_tuple("Log").field(l).field(s).finish(),
      | Self::Nack(t, r) => f.debug_tuple("Nack").field(t).field(r).finish(),
      | Self::Event(e) => f.debug_tuple("Event").field(e).finish(),
      | Self::Release(t, Ok(_)) => f.debug_tuple("Release").field(t).field(&"Ok(..)").finish(),
      | Self::Release(t, Err((_, e))) => f.debug_tuple("Release")
                                          .field(t)
                                          .field(e)
                                          .finish(),
    }
  }
}

impl<B> Effect<B> {
  /// Get the message, if this is [`Effect::Send`]
  pub fn get_send(&self) -> Option<&Addrd<Message>> {
    match self {
      | Self::Send(m) => Some(m),
      | _ => None,
    }
  }

  /// Is this [`Effect::Log`]?
  pub fn is_log(&self) -> bool {
    matches!(self, Self::Log(..))
  }
}
