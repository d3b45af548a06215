use core::fmt;

use croak_msg::{code, Framing, Id, Message, MessageParseError, MessageToBytesError, Token, TryFromBytes,
                TryIntoBytes, Type};
use embedded_time::Instant;
use no_std_net::SocketAddr;
use std_alloc::collections::VecDeque;
use std_alloc::vec::Vec;

use crate::config::Config;
use crate::net::{Addrd, Link, Transport};
use crate::platform::{Effect, Effects};
use crate::session::Session;
use crate::time::{Clock, Millis};

/// Errors encountered while driving a session
#[derive(Debug, PartialEq)]
pub enum Error<TE> {
  /// The transport failed
  Transport(TE),
  /// Received bytes were not a CoAP message
  Parse(MessageParseError),
  /// A message could not be serialized
  ToBytes(MessageToBytesError),
  /// The clock could not be read
  Clock(embedded_time::clock::Error),
  /// The engine refused the operation
  Engine(crate::Error),
}

impl<TE: fmt::Debug> fmt::Display for Error<TE> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Transport(e) => write!(f, "transport error: {:?}", e),
      | Self::Parse(e) => write!(f, "malformed message: {:?}", e),
      | Self::ToBytes(e) => write!(f, "{}", e),
      | Self::Clock(e) => write!(f, "clock error: {:?}", e),
      | Self::Engine(e) => write!(f, "{}", e),
    }
  }
}

#[cfg(feature = "std")]
impl<TE: fmt::Debug> std::error::Error for Error<TE> {}

/// A [`Session`] driven over a [`Transport`], reading time from a clock.
///
/// Messages to send are serialized and handed to the transport right away,
/// log lines go to the [`log`] crate, and everything meant for the
/// application (nacks, events & released bodies) is kept until
/// [`drain`](Endpoint::drain)ed.
///
/// ```
/// use croak::config::Config;
/// use croak::endpoint::Endpoint;
/// use croak::net::Link;
/// use croak::test::{dummy_addr, ClockMock, TransportMock};
/// use croak_msg::{code, Framing, Id, Message, Token, TryFromBytes, Type};
///
/// let transport = TransportMock::new(Link::udp());
/// let mut ep: Endpoint<TransportMock, ClockMock> = Endpoint::new(dummy_addr(),
///                                                                 transport.clone(),
///                                                                 ClockMock::new(),
///                                                                 Config::default()).unwrap();
///
/// let req = Message::new(Type::Con, code::GET, Id(0), Token::default());
/// ep.send(req).unwrap();
///
/// let sent = transport.take_sent();
/// let sent = Message::try_from_bytes(Framing::Datagram, sent[0].data()).unwrap();
/// assert_eq!(sent.code, code::GET);
/// ```
#[derive(Debug)]
pub struct Endpoint<T: Transport, C: Clock, B = Vec<u8>> {
  transport: T,
  clock: C,
  session: Session<C, B>,
  outbox: VecDeque<Effect<B>>,
}

impl<T: Transport, C: Clock, B: AsRef<[u8]>> Endpoint<T, C, B> {
  /// Create an endpoint talking to `addr` over `transport`
  pub fn new(addr: SocketAddr, transport: T, clock: C, config: Config) -> Result<Self, Error<T::Error>> {
    let now = clock.try_now().map_err(Error::Clock)?;
    let link = Link { mtu: transport.max_pdu_size(),
                      overhead: 0,
                      ..transport.link() };
    let session = Session::new(addr, link, config, now);

    Ok(Self { transport,
              clock,
              session,
              outbox: VecDeque::new() })
  }

  /// The session with the peer
  pub fn session(&self) -> &Session<C, B> {
    &self.session
  }

  /// The transport messages are sent over
  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// The clock time is read from
  pub fn clock(&self) -> &C {
    &self.clock
  }

  fn now(&self) -> Result<Instant<C>, Error<T::Error>> {
    self.clock.try_now().map_err(Error::Clock)
  }

  /// Run `f` against the session at the current time, then carry out its effects
  fn drive<R>(&mut self,
              f: impl FnOnce(&mut Session<C, B>, Instant<C>, &mut Effects<B>) -> R)
              -> Result<R, Error<T::Error>> {
    let now = self.now()?;
    let mut effects = Effects::<B>::new();
    let r = f(&mut self.session, now, &mut effects);
    self.exec(now, effects);
    Ok(r)
  }

  /// See [`Session::send`]
  pub fn send(&mut self, msg: Message) -> Result<Token, Error<T::Error>> {
    self.drive(|s, now, effs| s.send(now, effs, msg))
  }

  /// See [`Session::send_large`]
  pub fn send_large(&mut self, msg: Message, body: B) -> Result<Token, (B, Error<T::Error>)> {
    let now = match self.now() {
      | Ok(now) => now,
      | Err(e) => return Err((body, e)),
    };

    let mut effects = Effects::<B>::new();
    let r = self.session.send_large(now, &mut effects, msg, body);
    self.exec(now, effects);
    r.map_err(|(body, e)| (body, Error::Engine(e)))
  }

  /// See [`Session::respond_large`]
  pub fn respond_large(&mut self, req: &Message, resp: Message, body: B) -> Result<(), (B, Error<T::Error>)> {
    let now = match self.now() {
      | Ok(now) => now,
      | Err(e) => return Err((body, e)),
    };

    let mut effects = Effects::<B>::new();
    let r = self.session.respond_large(now, &mut effects, req, resp, body);
    self.exec(now, effects);
    r.map_err(|(body, e)| (body, Error::Engine(e)))
  }

  /// See [`Session::cancel_observe`]
  pub fn cancel_observe(&mut self, token: Token) -> Result<bool, Error<T::Error>> {
    self.drive(|s, now, effs| s.cancel_observe(now, effs, token))
  }

  /// Process bytes received from the peer (one datagram, or one stream frame)
  ///
  /// See [`Session::recv`].
  pub fn recv(&mut self, bytes: &[u8]) -> nb::Result<Addrd<Message>, Error<T::Error>> {
    let framing = self.session.framing();

    let msg = match Message::try_from_bytes(framing, bytes) {
      | Ok(msg) => msg,
      | Err(e) => {
        self.reject_malformed(framing, bytes)
            .map_err(nb::Error::Other)?;
        return Err(nb::Error::Other(Error::Parse(e)));
      },
    };

    self.drive(|s, now, effs| s.recv(now, effs, msg))
        .map_err(nb::Error::Other)?
        .map_err(|e| e.map(Error::Engine))
  }

  /// Malformed CONs are answered with a Reset, if we can make out their id
  fn reject_malformed(&mut self, framing: Framing, bytes: &[u8]) -> Result<(), Error<T::Error>> {
    let con = u8::from(Type::Con);

    match (framing, bytes) {
      | (Framing::Datagram, [b0, _, id0, id1, ..]) if (b0 >> 4) & 0b11 == con => {
        let rst = Message::new(Type::Reset, code::EMPTY, Id::from_be_bytes([*id0, *id1]), Token::default());
        let addr = self.session.addr();
        let now = self.now()?;
        self.exec(now, std_alloc::vec![Effect::Send(Addrd(rst, addr))]);
        Ok(())
      },
      | _ => Ok(()),
    }
  }

  /// Retransmit & expire as needed; yields how long until this should be called again
  ///
  /// See [`Session::poll_timeouts`].
  pub fn poll(&mut self) -> Result<Option<Millis>, Error<T::Error>> {
    self.drive(|s, now, effs| s.poll_timeouts(now, effs))
  }

  /// See [`Session::on_connected`]
  pub fn connected(&mut self) -> Result<(), Error<T::Error>> {
    self.drive(|s, now, effs| s.on_connected(now, effs))
  }

  /// See [`Session::on_handshake_complete`]
  pub fn handshake_complete(&mut self) -> Result<(), Error<T::Error>> {
    self.drive(|s, now, effs| s.on_handshake_complete(now, effs))
  }

  /// See [`Session::on_closed`]
  pub fn closed(&mut self) -> Result<(), Error<T::Error>> {
    self.drive(|s, now, effs| s.on_closed(now, effs))
  }

  /// See [`Session::close`]
  pub fn close(&mut self) -> Result<(), Error<T::Error>> {
    self.drive(|s, now, effs| s.close(now, effs))
  }

  /// Take the nacks, events and released bodies meant for the application,
  /// oldest first
  pub fn drain(&mut self) -> impl Iterator<Item = Effect<B>> + '_ {
    self.outbox.drain(..)
  }

  /// Carry out effects.
  ///
  /// A message the transport refuses is failed in the session,
  /// and the effects of that are carried out too.
  fn exec(&mut self, now: Instant<C>, effects: Effects<B>) {
    let mut work: VecDeque<Effect<B>> = effects.into_iter().collect();

    while let Some(effect) = work.pop_front() {
      match effect {
        | Effect::Send(Addrd(msg, addr)) => {
          let framing = self.session.framing();
          let sent = msg.try_into_bytes(framing)
                        .map_err(Error::ToBytes)
                        .and_then(|bytes| {
                          nb::block!(self.transport.send(Addrd(&bytes, addr))).map_err(Error::Transport)
                        });

          if let Err(e) = sent {
            let reason = match &e {
              | Error::Transport(te) => self.transport.nack_reason(te),
              | _ => crate::platform::NackReason::NotDeliverable,
            };

            log::warn!("failed to send message to {}: {}", addr, e);
            let mut more = Effects::<B>::new();
            self.session.on_transport_error(now, &mut more, &msg, reason);
            work.extend(more);
          }
        },
        | Effect::Log(level, line) => log::log!(level, "{}", line),
        | other => self.outbox.push_back(other),
      }
    }
  }
}
