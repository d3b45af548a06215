use std_alloc::collections::VecDeque;

use croak_msg::{Id, Message};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

use crate::time::Clock;

#[derive(Debug)]
struct Seen<C: Clock> {
  id: Id,
  at: Instant<C>,
  reply: Option<Message>,
}

/// Recently received CON & NON message ids, along with
/// the ACK / RST / piggybacked response we sent for each.
#[derive(Debug)]
pub(crate) struct Dedup<C: Clock> {
  seen: VecDeque<Seen<C>>,
  capacity: usize,
}

/// Result of checking an incoming message id
#[derive(Debug, PartialEq)]
pub(crate) enum Check<'a> {
  /// First time we see this id
  New,
  /// Seen before; holds our reply (if we sent one)
  Duplicate(Option<&'a Message>),
}

impl<C: Clock> Dedup<C> {
  pub(crate) fn new(capacity: usize) -> Self {
    Self { seen: VecDeque::new(),
           capacity: capacity.max(1) }
  }

  /// Check whether `id` is a duplicate, remembering it if it is not
  pub(crate) fn check(&mut self, now: Instant<C>, id: Id) -> Check<'_> {
    match self.seen.iter().position(|s| s.id == id) {
      | Some(ix) => Check::Duplicate(self.seen[ix].reply.as_ref()),
      | None => {
        if self.seen.len() >= self.capacity {
          self.seen.pop_front();
        }

        self.seen.push_back(Seen { id,
                                   at: now,
                                   reply: None });
        Check::New
      },
    }
  }

  /// Remember the reply we sent to the message with this id
  pub(crate) fn set_reply(&mut self, id: Id, reply: Message) {
    if let Some(s) = self.seen.iter_mut().find(|s| s.id == id) {
      s.reply = Some(reply);
    }
  }

  /// Forget ids older than `lifetime_millis`
  pub(crate) fn prune(&mut self, now: Instant<C>, lifetime_millis: u64) {
    while let Some(s) = self.seen.front() {
      if s.at + Milliseconds(lifetime_millis) <= now {
        self.seen.pop_front();
      } else {
        break;
      }
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.seen.len()
  }
}
