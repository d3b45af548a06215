use std_alloc::collections::VecDeque;
use std_alloc::vec::Vec;

use croak_msg::{Id, Message, Type};

use crate::retry::RetryTimer;
use crate::time::Clock;

/// A CON message on the wire, awaiting its ACK
#[derive(Debug)]
pub(crate) struct Pending<C: Clock> {
  pub(crate) msg: Message,
  pub(crate) timer: RetryTimer<C>,
}

/// Outbound messages that have not been acknowledged or not yet been sent
#[derive(Debug)]
pub(crate) struct Queue<C: Clock> {
  /// Unacknowledged CONs; these count against NSTART
  pub(crate) pending: Vec<Pending<C>>,
  /// Messages waiting for the session to be established
  /// or for NSTART to free up, in FIFO order
  pub(crate) delayed: VecDeque<Message>,
}

impl<C: Clock> Queue<C> {
  pub(crate) fn new() -> Self {
    Self { pending: Vec::new(),
           delayed: VecDeque::new() }
  }

  /// Number of unacknowledged CONs
  pub(crate) fn active(&self) -> usize {
    self.pending.len()
  }

  /// Stop waiting for an ACK to the CON with this id
  pub(crate) fn remove_pending(&mut self, id: Id) -> Option<Pending<C>> {
    self.pending
        .iter()
        .position(|p| p.msg.id == id)
        .map(|ix| self.pending.remove(ix))
  }

  pub(crate) fn is_pending(&self, id: Id) -> bool {
    self.pending.iter().any(|p| p.msg.id == id)
  }

  /// Take every message out of the queue, oldest first
  pub(crate) fn drain(&mut self) -> impl Iterator<Item = Message> + '_ {
    self.pending
        .drain(..)
        .map(|p| p.msg)
        .chain(self.delayed.drain(..))
  }
}

/// Does this message take an NSTART slot while unacknowledged?
pub(crate) fn is_con(msg: &Message, reliable: bool) -> bool {
  msg.ty == Type::Con && !reliable
}
