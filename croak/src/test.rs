//! Mocks & helpers for testing code that uses `croak`

use core::cell::{Cell, RefCell};

use croak_msg::Message;
use embedded_time::rate::Fraction;
use embedded_time::Instant;
use no_std_net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std_alloc::rc::Rc;
use std_alloc::vec::Vec;

use crate::net::{Addrd, Link, Transport};
use crate::platform::{Effect, Effects, NackReason};

/// A clock that only moves when told to, counting milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockMock(pub Cell<u64>);

impl ClockMock {
  /// A clock reading 0
  pub fn new() -> Self {
    Self(Cell::new(0))
  }

  /// Move the clock to `millis`
  pub fn set(&self, millis: u64) {
    self.0.set(millis);
  }

  /// Move the clock forward by `millis`
  pub fn advance(&self, millis: u64) {
    self.0.set(self.0.get() + millis);
  }

  /// An instant `millis` after the epoch
  pub fn instant(millis: u64) -> Instant<Self> {
    Instant::new(millis)
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.0.get()))
  }
}

/// A transport that records what was sent, and can be told to fail
#[derive(Debug, Clone)]
pub struct TransportMock {
  /// Capabilities to report
  pub link: Link,
  /// Everything sent so far
  pub tx: Rc<RefCell<Vec<Addrd<Vec<u8>>>>>,
  /// When set, sends fail with this reason
  pub fail_with: Rc<Cell<Option<NackReason>>>,
}

impl TransportMock {
  /// A mock transport with the capabilities of `link`
  pub fn new(link: Link) -> Self {
    Self { link,
           tx: Default::default(),
           fail_with: Default::default() }
  }

  /// Take everything sent so far
  pub fn take_sent(&self) -> Vec<Addrd<Vec<u8>>> {
    core::mem::take(&mut *self.tx.borrow_mut())
  }
}

impl Transport for TransportMock {
  type Error = NackReason;

  fn link(&self) -> Link {
    self.link
  }

  fn send(&mut self, msg: Addrd<&[u8]>) -> nb::Result<usize, Self::Error> {
    match self.fail_with.get() {
      | Some(reason) => Err(nb::Error::Other(reason)),
      | None => {
        let len = msg.data().len();
        self.tx.borrow_mut().push(msg.map(|bytes| bytes.to_vec()));
        Ok(len)
      },
    }
  }

  fn nack_reason(&self, e: &NackReason) -> NackReason {
    *e
  }
}

/// An address to pretend messages come from / go to
pub fn dummy_addr() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 5683))
}

/// A recognizable body of `len` bytes
pub fn body(len: usize) -> Vec<u8> {
  (0..len).map(|n| (n % 251) as u8).collect()
}

/// Remove the messages to send from a vec of effects
pub fn take_sent<B>(effects: &mut Effects<B>) -> Vec<Message> {
  let mut sent = Vec::new();
  effects.retain(|eff| match eff {
           | Effect::Send(Addrd(msg, _)) => {
             sent.push(msg.clone());
             false
           },
           | _ => true,
         });
  sent
}
