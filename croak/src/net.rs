use no_std_net::SocketAddr;

use crate::platform::NackReason;

/// Data that came from (or is headed to) a network socket
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the contents of this Addressed
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Discard the socket and get the data in this Addressed
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Map the data contained in this Addressed
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the contents of the addressed item
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// Copy the socket address for the data
  pub fn addr(&self) -> SocketAddr {
    self.1
  }
}

impl<T> AsMut<T> for Addrd<T> {
  fn as_mut(&mut self) -> &mut T {
    &mut self.0
  }
}

/// Capabilities of the transport a session runs over
///
/// ```
/// use croak::net::Link;
///
/// assert!(!Link::udp().reliable);
/// assert_eq!(Link::udp().max_pdu_size(), 1152);
/// assert_eq!(Link::dtls().max_pdu_size(), 1152 - 29);
/// assert!(Link::tcp().reliable && Link::tcp().bert);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
  /// Is the transport reliable & ordered (TCP, TLS, WebSockets)?
  ///
  /// Reliable transports use stream framing, exchange CSMs and
  /// never retransmit.
  pub reliable: bool,
  /// Does a security handshake (DTLS / TLS) need to complete
  /// before messages may be sent?
  pub secure: bool,
  /// Do we support BERT on this transport? (only meaningful when `reliable`)
  pub bert: bool,
  /// Largest PDU the path carries
  pub mtu: usize,
  /// Bytes of the MTU consumed by the security layer
  pub overhead: usize,
}

impl Link {
  /// Plain CoAP over UDP
  pub const fn udp() -> Self {
    Self { reliable: false,
           secure: false,
           bert: false,
           mtu: 1152,
           overhead: 0 }
  }

  /// CoAP over DTLS
  pub const fn dtls() -> Self {
    Self { secure: true,
           overhead: 29,
           ..Self::udp() }
  }

  /// CoAP over TCP
  pub const fn tcp() -> Self {
    Self { reliable: true,
           secure: false,
           bert: true,
           mtu: 65_535,
           overhead: 0 }
  }

  /// CoAP over TLS
  pub const fn tls() -> Self {
    Self { secure: true,
           ..Self::tcp() }
  }

  /// Largest PDU we may send over this link, before any
  /// limit negotiated with the peer is applied
  pub const fn max_pdu_size(&self) -> usize {
    self.mtu.saturating_sub(self.overhead)
  }
}

/// A transport that encoded messages can be sent over
///
/// Receiving is left to the host; received bytes are
/// handed to [`Endpoint::recv`](crate::endpoint::Endpoint::recv).
pub trait Transport {
  /// The error yielded by transport operations
  type Error: core::fmt::Debug;

  /// Capabilities of this transport
  fn link(&self) -> Link;

  /// Largest PDU that may be sent over this transport
  fn max_pdu_size(&self) -> usize {
    self.link().max_pdu_size()
  }

  /// Send a message to a remote address, yielding the number of bytes written
  fn send(&mut self, msg: Addrd<&[u8]>) -> nb::Result<usize, Self::Error>;

  /// Classify a send error so that the pending message
  /// can be failed (or retried) appropriately
  fn nack_reason(&self, _: &Self::Error) -> NackReason {
    NackReason::NotDeliverable
  }
}
