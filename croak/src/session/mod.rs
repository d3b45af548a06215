use croak_msg::{code, Code, Framing, Id, Message, Token, Type};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use no_std_net::SocketAddr;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std_alloc::vec::Vec;

use crate::block::crcv::LgCrcv;
use crate::block::srcv::LgSrcv;
use crate::block::state_token::StateToken;
use crate::block::xmit::{LgXmit, XmitKind};
use crate::config::Config;
use crate::error::Error;
use crate::logging::{log, msg_summary};
use crate::net::{Addrd, Link};
use crate::platform::{Effect, Effects, Event, NackReason};
use crate::retry::{RetryTimer, YouShould};
use crate::time::{millis_since_epoch, millis_until, sooner, Clock, Millis};

mod csm;
mod dedup;
mod queue;

use dedup::{Check, Dedup};
use queue::{is_con, Pending, Queue};

const BASE_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Lifecycle of a session
///
/// ```text
///                  on_connected          CSM exchanged
/// Connecting ----------------------> Csm --------------> Established
///      \                              ^                       ^
///       \ (secure) on_connected       | on_handshake_complete |
///        `-------------------> Handshake ---------------------'
///                                        (unreliable)
/// ```
///
/// Plain UDP sessions start out `Established`. Closing a session
/// (or the peer releasing it) always lands in `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
  /// Closed
  None,
  /// Waiting for the transport connection (reliable transports)
  Connecting,
  /// Waiting for the security handshake
  Handshake,
  /// Waiting for the peer's Capabilities and Settings Message
  Csm,
  /// Application traffic may flow
  Established,
}

/// What we learned about the peer from its CSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Peer {
  pub(crate) max_message_size: usize,
  pub(crate) bert: bool,
  pub(crate) csm_received: bool,
}

/// The protocol engine for one remote endpoint.
///
/// A session is purely deterministic: it never performs IO or reads a clock.
/// Every operation accepts the current time and a vec of [`Effect`]s that the
/// host must carry out (send messages, log, notify the application, hand
/// bodies back).
///
/// ```
/// use croak::config::Config;
/// use croak::net::Link;
/// use croak::platform::{Effect, Effects};
/// use croak::session::{Session, State};
/// use croak::test::ClockMock;
/// use croak_msg::{code, Id, Message, Token, Type};
///
/// let addr = "127.0.0.1:5683".parse().unwrap();
/// let now = ClockMock::instant(0);
/// let mut session = Session::<ClockMock>::new(addr, Link::udp(), Config::default(), now);
/// assert_eq!(session.state(), State::Established);
///
/// let mut effects: Effects<Vec<u8>> = vec![];
/// let req = Message::new(Type::Con, code::GET, Id(0), Token::default());
/// let token = session.send(now, &mut effects, req);
///
/// let sent = effects.iter().find_map(Effect::get_send).unwrap();
/// assert_eq!(sent.data().ty, Type::Con);
/// assert_ne!(sent.data().id, Id(0));
/// assert_eq!(sent.data().token, token);
/// ```
#[derive(Debug)]
pub struct Session<C: Clock, B = Vec<u8>> {
  pub(crate) addr: SocketAddr,
  pub(crate) link: Link,
  pub(crate) config: Config,
  pub(crate) state: State,
  pub(crate) peer: Peer,
  pub(crate) rng: ChaCha8Rng,
  next_id: Id,
  next_base: u64,
  next_rtag: u32,
  pub(crate) queue: Queue<C>,
  pub(crate) dedup: Dedup<C>,
  pub(crate) lg_xmit: Vec<LgXmit<C, B>>,
  pub(crate) lg_crcv: Vec<LgCrcv<C>>,
  pub(crate) lg_srcv: Vec<LgSrcv<C>>,
}

impl<C: Clock, B: AsRef<[u8]>> Session<C, B> {
  /// Create a session with a remote endpoint
  pub fn new(addr: SocketAddr, link: Link, config: Config, now: Instant<C>) -> Self {
    let seed = (u64::from(config.msg.token_seed) << 48) ^ millis_since_epoch(now);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let state = match (link.reliable, link.secure) {
      | (true, _) => State::Connecting,
      | (false, true) => State::Handshake,
      | (false, false) => State::Established,
    };

    let next_id = Id(rng.gen());
    let next_base = (rng.gen::<u64>() & BASE_MASK).max(1);
    let next_rtag = rng.gen();

    Self { addr,
           link,
           state,
           peer: Peer { max_message_size: 1152,
                        bert: false,
                        csm_received: false },
           rng,
           next_id,
           next_base,
           next_rtag,
           queue: Queue::new(),
           dedup: Dedup::new(config.msg.dedup_capacity),
           lg_xmit: Vec::new(),
           lg_crcv: Vec::new(),
           lg_srcv: Vec::new(),
           config }
  }

  /// Address of the remote endpoint
  pub fn addr(&self) -> SocketAddr {
    self.addr
  }

  /// The transport this session runs over
  pub fn link(&self) -> Link {
    self.link
  }

  /// Runtime config
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Where the session is in its lifecycle
  pub fn state(&self) -> State {
    self.state
  }

  /// Framing used to (de)serialize messages for this session
  pub fn framing(&self) -> Framing {
    if self.link.reliable {
      Framing::Stream
    } else {
      Framing::Datagram
    }
  }

  /// Largest message we may send.
  ///
  /// Unreliable links are limited by the path MTU minus security overhead,
  /// reliable links additionally by the peer's advertised Max-Message-Size.
  pub fn max_pdu_size(&self) -> usize {
    if self.link.reliable {
      self.link.max_pdu_size().min(self.peer.max_message_size)
    } else {
      self.link.max_pdu_size()
    }
  }

  /// May BERT blocks be used with this peer?
  pub fn bert(&self) -> bool {
    self.link.reliable && self.link.bert && self.config.block.bert && self.peer.bert
  }

  /// Number of CON messages waiting for an ACK
  pub fn pending(&self) -> usize {
    self.queue.active()
  }

  /// Number of messages held back until the session is established
  /// or NSTART allows them out
  pub fn delayed(&self) -> usize {
    self.queue.delayed.len()
  }

  /// Number of bodies being sent or served
  pub fn transfers_out(&self) -> usize {
    self.lg_xmit.len()
  }

  /// Number of bodies being received (including lingering completed ones)
  pub fn transfers_in(&self) -> usize {
    self.lg_srcv.len()
    + self.lg_crcv
          .iter()
          .filter(|c| !c.assembly.is_empty() || c.complete)
          .count()
  }

  pub(crate) fn exchange_lifetime(&self, now: Instant<C>) -> Instant<C> {
    now + Milliseconds(self.config.exchange_lifetime_millis())
  }

  pub(crate) fn next_id(&mut self) -> Id {
    let id = match self.next_id {
      | Id(0) => Id(1),
      | id => id,
    };

    self.next_id = id.next();
    id
  }

  pub(crate) fn mint_state_token(&mut self) -> StateToken {
    let base = self.next_base;
    self.next_base = match (base + 1) & BASE_MASK {
      | 0 => 1,
      | n => n,
    };
    StateToken::new(base)
  }

  pub(crate) fn next_request_tag(&mut self) -> u32 {
    let tag = self.next_rtag;
    self.next_rtag = tag.wrapping_add(1);
    tag
  }

  /// Assign a message id if the caller left it as 0
  pub(crate) fn provision_id(&mut self, msg: &mut Message) {
    if msg.id == Id(0) && matches!(msg.ty, Type::Con | Type::Non) {
      msg.id = self.next_id();
    }
  }

  /// The token the application knows a message we sent by
  pub(crate) fn app_token(&self, msg: &Message) -> Token {
    if !msg.is_request() {
      return msg.token;
    }

    let state = StateToken::from_token(&msg.token);
    self.lg_crcv
        .iter()
        .find(|c| c.state.same_transfer(&state))
        .map(|c| c.app_token)
        .or_else(|| {
          self.lg_xmit.iter().find_map(|x| match x.kind {
                                 | XmitKind::Request { state: s, app_token } if s.same_transfer(&state) => {
                                   Some(app_token)
                                 },
                                 | _ => None,
                               })
        })
        .unwrap_or(msg.token)
  }

  /// Start tracking responses to a request, rewriting its token
  /// to a state token. Yields the token the application knows it by.
  pub(crate) fn track_request(&mut self, now: Instant<C>, msg: &mut Message) -> Token {
    let state = self.mint_state_token();
    let app_token = match msg.token {
      | t if t.is_empty() => state.to_token(),
      | t => t,
    };

    msg.token = state.to_token();
    self.lg_crcv.retain(|c| c.app_token != app_token);

    let crcv = LgCrcv::new(app_token,
                           state,
                           msg,
                           &self.config,
                           self.exchange_lifetime(now));
    self.lg_crcv.push(crcv);
    app_token
  }

  /// Send a message, yielding the token the application should use to
  /// correlate the response.
  ///
  /// Message ids of 0 are replaced with fresh ids, and requests without
  /// a token are given one. Request tokens are replaced on the wire by
  /// tokens that let us track block-wise responses, but responses are
  /// always delivered with the token returned here.
  ///
  /// CONs over unreliable transports are retransmitted until acknowledged.
  /// Messages sent before the session is established, or while NSTART CONs
  /// are outstanding, are queued and sent in order once possible.
  pub fn send(&mut self, now: Instant<C>, effects: &mut Effects<B>, mut msg: Message) -> Token {
    self.provision_id(&mut msg);

    let preferred = self.config.block.preferred_szx;
    let fetches = msg.code == code::GET || msg.code == code::FETCH;
    if fetches && preferred < 6 && matches!(msg.block2(), Ok(None)) {
      // ask for smaller blocks up front
      if let Ok(b) = croak_msg::Block::new(0, preferred, false) {
        msg.set_block2(b);
      }
    }

    let token = if msg.is_request() {
      self.track_request(now, &mut msg)
    } else {
      msg.token
    };

    if msg.is_response() {
      self.echo_block1(&mut msg);
    }

    if matches!(msg.ty, Type::Ack | Type::Reset) && !self.link.reliable {
      self.dedup.set_reply(msg.id, msg.clone());
    }

    self.transmit(now, effects, msg);
    token
  }

  /// Respond to a request from the peer
  pub(crate) fn respond(&mut self,
                        now: Instant<C>,
                        effects: &mut Effects<B>,
                        req: &Message,
                        code: Code,
                        f: impl FnOnce(&mut Message)) {
    let (ty, id) = match req.ty {
      | Type::Con if !self.link.reliable => (Type::Ack, req.id),
      | _ => (Type::Non, Id(0)),
    };

    let mut resp = Message::new(ty, code, id, req.token);
    f(&mut resp);
    self.send(now, effects, resp);
  }

  /// Put a message on the wire now, or queue it for later
  pub(crate) fn transmit(&mut self, now: Instant<C>, effects: &mut Effects<B>, msg: Message) {
    let nstart = usize::from(self.config.msg.nstart.max(1));
    let established = self.state == State::Established;

    if !established && !msg.is_signal() {
      log!(Session::transmit,
           effects,
           log::Level::Debug,
           "session not established; queued {}",
           msg_summary(&msg));
      self.queue.delayed.push_back(msg);
    } else if is_con(&msg, self.link.reliable)
              && (self.queue.active() >= nstart || !self.queue.delayed.is_empty())
    {
      log!(Session::transmit,
           effects,
           log::Level::Debug,
           "{} CONs outstanding; queued {}",
           self.queue.active(),
           msg_summary(&msg));
      self.queue.delayed.push_back(msg);
    } else {
      self.put_on_wire(now, effects, msg);
    }
  }

  fn put_on_wire(&mut self, now: Instant<C>, effects: &mut Effects<B>, msg: Message) {
    log!(Session::put_on_wire,
         effects,
         log::Level::Trace,
         "sending {}",
         msg_summary(&msg));

    if is_con(&msg, self.link.reliable) {
      let timer = RetryTimer::new(now,
                                  self.config.msg.con.retry_strategy,
                                  self.config.msg.con.max_attempts(),
                                  &mut self.rng);
      self.queue.pending.push(Pending { msg: msg.clone(),
                                        timer });
    }

    effects.push(Effect::Send(Addrd(msg, self.addr)));
  }

  /// Send queued messages, oldest first, for as long as the session
  /// is established and NSTART allows.
  pub(crate) fn flush_delayed(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    let nstart = usize::from(self.config.msg.nstart.max(1));

    while self.state == State::Established {
      let blocked = match self.queue.delayed.front() {
        | Some(front) => is_con(front, self.link.reliable) && self.queue.active() >= nstart,
        | None => true,
      };

      if blocked {
        break;
      }

      if let Some(msg) = self.queue.delayed.pop_front() {
        self.put_on_wire(now, effects, msg);
      }
    }
  }

  /// The transport connection came up
  pub fn on_connected(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    if self.state != State::Connecting {
      log!(Session::on_connected,
           effects,
           log::Level::Debug,
           "ignoring connect in state {:?}",
           self.state);
      return;
    }

    effects.push(Effect::Event(Event::SessionConnected));

    if self.link.secure {
      self.state = State::Handshake;
    } else {
      self.begin_csm(now, effects);
    }
  }

  /// The DTLS / TLS handshake completed
  pub fn on_handshake_complete(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    if self.state != State::Handshake {
      log!(Session::on_handshake_complete,
           effects,
           log::Level::Debug,
           "ignoring handshake in state {:?}",
           self.state);
      return;
    }

    if self.link.reliable {
      self.begin_csm(now, effects);
    } else {
      self.establish(now, effects);
    }
  }

  /// The transport connection went away
  pub fn on_closed(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    self.close(now, effects);
  }

  pub(crate) fn establish(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    self.state = State::Established;
    effects.push(Effect::Event(Event::SessionEstablished));
    self.flush_delayed(now, effects);
  }

  /// The transport could not send a message we handed it
  pub fn on_transport_error(&mut self,
                            now: Instant<C>,
                            effects: &mut Effects<B>,
                            msg: &Message,
                            reason: NackReason) {
    log!(Session::on_transport_error,
         effects,
         log::Level::Warn,
         "{:?} while sending {}",
         reason,
         msg_summary(msg));

    match reason {
      | NackReason::TlsFailed => {
        effects.push(Effect::Event(Event::SessionFailed));
        self.close_because(now, effects, NackReason::TlsFailed);
      },
      | NackReason::IcmpIssue if self.queue.is_pending(msg.id) => {
        // keep it queued; the retransmission timer will try again
      },
      | reason => {
        self.queue.remove_pending(msg.id);
        self.fail_exchange(effects, msg, reason);
        self.flush_delayed(now, effects);
      },
    }
  }

  /// A message we sent will never be delivered; tell the application
  /// and abandon any transfer it belonged to.
  pub(crate) fn fail_exchange(&mut self, effects: &mut Effects<B>, msg: &Message, reason: NackReason) {
    if msg.is_empty() {
      return;
    }

    effects.push(Effect::Nack(self.app_token(msg), reason));
    self.abort_transfers(effects, msg, Error::Nack(reason));
  }

  /// Abandon the transfers (if any) a message belonged to
  pub(crate) fn abort_transfers(&mut self, effects: &mut Effects<B>, msg: &Message, err: Error) {
    if msg.is_request() {
      let state = StateToken::from_token(&msg.token);

      if let Some(ix) = self.lg_xmit.iter().position(|x| x.is_request_for(&state)) {
        self.lg_xmit.remove(ix).abort(effects, err);
      }

      if let Some(ix) = self.lg_crcv.iter().position(|c| c.state.same_transfer(&state)) {
        let crcv = self.lg_crcv.remove(ix);
        if !crcv.assembly.is_empty() {
          effects.push(Effect::Event(Event::PartialBlock(crcv.app_token)));
        }
      }
    } else if msg.is_response() {
      if let Some(ix) = self.lg_xmit.iter().position(|x| x.is_response_to(&msg.token)) {
        self.lg_xmit.remove(ix).abort(effects, err);
      }
    }
  }

  /// Process a message from the peer.
  ///
  /// Yields `Ok` with messages the application should see, and
  /// `WouldBlock` for messages that were consumed by the engine
  /// (ACKs, duplicates, intermediate blocks, signals).
  ///
  /// Responses are delivered with the token the application used in
  /// the request, and block-wise bodies are delivered whole.
  pub fn recv(&mut self,
              now: Instant<C>,
              effects: &mut Effects<B>,
              msg: Message)
              -> nb::Result<Addrd<Message>, Error> {
    if self.state == State::None {
      return Err(nb::Error::Other(Error::SessionClosed));
    }

    log!(Session::recv,
         effects,
         log::Level::Trace,
         "received {}",
         msg_summary(&msg));

    if msg.is_signal() {
      self.on_signal(now, effects, &msg);
      return Err(nb::Error::WouldBlock);
    }

    if !self.link.reliable {
      match msg.ty {
        | Type::Con | Type::Non => match self.dedup.check(now, msg.id) {
          | Check::New => (),
          | Check::Duplicate(reply) => {
            let reply = reply.cloned();
            log!(Session::recv,
                 effects,
                 log::Level::Debug,
                 "duplicate {}",
                 msg_summary(&msg));

            if let Some(reply) = reply.filter(|_| msg.ty == Type::Con) {
              effects.push(Effect::Send(Addrd(reply, self.addr)));
            }

            return Err(nb::Error::WouldBlock);
          },
        },
        | Type::Ack | Type::Reset => {
          let acked = self.queue.remove_pending(msg.id).map(|p| p.msg);

          match (msg.ty, acked) {
            | (Type::Reset, Some(rejected)) => {
              self.fail_exchange(effects, &rejected, NackReason::Rst);
              self.flush_delayed(now, effects);
              return Err(nb::Error::WouldBlock);
            },
            | (_, None) => {
              // duplicate, or for a CON we gave up on
              log!(Session::recv,
                   effects,
                   log::Level::Debug,
                   "{:?} {} matches nothing we sent",
                   msg.ty,
                   msg.id.0);
              return Err(nb::Error::WouldBlock);
            },
            | _ => self.flush_delayed(now, effects),
          }
        },
      }
    }

    if msg.is_empty() {
      if msg.ty == Type::Con {
        // CoAP ping
        self.send(now, effects, msg.reset());
      }

      return Err(nb::Error::WouldBlock);
    }

    if msg.is_response() {
      if msg.ty == Type::Con && !self.link.reliable {
        self.send(now, effects, msg.ack());
      }

      return self.on_response(now, effects, msg);
    }

    if msg.is_request() {
      return self.on_request(now, effects, msg);
    }

    Ok(Addrd(msg, self.addr))
  }

  fn on_response(&mut self,
                 now: Instant<C>,
                 effects: &mut Effects<B>,
                 msg: Message)
                 -> nb::Result<Addrd<Message>, Error> {
    let state = StateToken::from_token(&msg.token);

    let msg = match self.lg_xmit.iter().position(|x| x.is_request_for(&state)) {
      | Some(ix) => match self.xmit_on_response(now, effects, ix, msg) {
        | Some(msg) => msg,
        | None => return Err(nb::Error::WouldBlock),
      },
      | None => msg,
    };

    match self.lg_crcv.iter().position(|c| c.state.same_transfer(&state)) {
      | Some(ix) => self.crcv_on_response(now, effects, ix, msg),
      | None => Ok(Addrd(msg, self.addr)),
    }
  }

  fn on_request(&mut self,
                now: Instant<C>,
                effects: &mut Effects<B>,
                msg: Message)
                -> nb::Result<Addrd<Message>, Error> {
    let blocks = msg.block1().and_then(|b1| msg.block2().map(|b2| (b1, b2)));

    let (block1, block2) = match blocks {
      | Ok(blocks) => blocks,
      | Err(e) => {
        log!(Session::on_request,
             effects,
             log::Level::Debug,
             "malformed block option ({}) in {}",
             e,
             msg_summary(&msg));
        self.respond(now, effects, &msg, code::BAD_OPTION, |_| ());
        return Err(nb::Error::WouldBlock);
      },
    };

    if let Some(b2) = block2.filter(|b| b.num() > 0) {
      let key = msg.cache_key();
      if let Some(ix) = self.lg_xmit.iter().position(|x| x.serves(key)) {
        self.xmit_on_request(now, effects, ix, &msg, b2);
        return Err(nb::Error::WouldBlock);
      }
    }

    match block1 {
      | Some(b1) => self.srcv_on_request(now, effects, msg, b1),
      | None => Ok(Addrd(msg, self.addr)),
    }
  }

  /// Check every timer, retransmitting and expiring as needed.
  ///
  /// Yields the time until the next timer is due, if any; the host
  /// should call this again no later than that.
  pub fn poll_timeouts(&mut self, now: Instant<C>, effects: &mut Effects<B>) -> Option<Millis> {
    self.dedup
        .prune(now, self.config.exchange_lifetime_millis());

    let next = self.retransmit_timeouts(now, effects);
    let next = sooner(next, self.lg_xmit_timeouts(now, effects));
    let next = sooner(next, self.lg_crcv_timeouts(now, effects));
    sooner(next, self.lg_srcv_timeouts(now, effects))
  }

  /// Retransmit CONs whose timers expired, failing those out of attempts
  pub fn retransmit_timeouts(&mut self, now: Instant<C>, effects: &mut Effects<B>) -> Option<Millis> {
    let mut failed = Vec::new();
    let mut ix = 0;

    while ix < self.queue.pending.len() {
      match self.queue.pending[ix].timer.what_should_i_do(now) {
        | Ok(YouShould::Retry) => {
          let msg = self.queue.pending[ix].msg.clone();
          log!(Session::retransmit_timeouts,
               effects,
               log::Level::Debug,
               "retransmitting {}",
               msg_summary(&msg));
          effects.push(Effect::Send(Addrd(msg, self.addr)));
          ix += 1;
        },
        | Ok(YouShould::Cry) => failed.push(self.queue.pending.remove(ix).msg),
        | Err(_) => ix += 1,
      }
    }

    if !failed.is_empty() {
      failed.iter().for_each(|msg| {
                     log!(Session::retransmit_timeouts,
                          effects,
                          log::Level::Warn,
                          "giving up on {}",
                          msg_summary(msg));
                     self.fail_exchange(effects, msg, NackReason::TooManyRetries);
                   });
      self.flush_delayed(now, effects);
    }

    self.queue
        .pending
        .iter()
        .map(|p| millis_until(now, p.timer.next_deadline()))
        .min()
        .map(Milliseconds)
  }

  /// Close the session, failing everything in flight
  pub fn close(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    self.close_because(now, effects, NackReason::NotDeliverable);
  }

  fn close_because(&mut self, _: Instant<C>, effects: &mut Effects<B>, reason: NackReason) {
    if self.state == State::None {
      return;
    }

    let undelivered = self.queue.drain().collect::<Vec<_>>();
    undelivered.iter()
               .filter(|m| !m.is_empty() && !m.is_signal())
               .for_each(|m| effects.push(Effect::Nack(self.app_token(m), reason)));

    self.lg_xmit
        .drain(..)
        .for_each(|x| x.abort(effects, Error::SessionClosed));

    self.lg_crcv
        .drain(..)
        .filter(|c| !c.assembly.is_empty() && !c.complete)
        .for_each(|c| effects.push(Effect::Event(Event::PartialBlock(c.app_token))));

    self.lg_srcv
        .drain(..)
        .filter(|s| !s.assembly.is_empty() && !s.complete)
        .for_each(|s| effects.push(Effect::Event(Event::PartialBlock(s.token))));

    log!(Session::close, effects, log::Level::Debug, "closed");
    self.state = State::None;
    effects.push(Effect::Event(Event::SessionClosed));
  }
}
