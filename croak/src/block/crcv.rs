//! Receiving responses to our requests, reassembling
//! block-wise (Block2) bodies and following observations.

use croak_msg::known::{BLOCK1, BLOCK2, ECHO, OBSERVE, REQUEST_TAG, SIZE1};
use croak_msg::{code, Block, Id, Message, OptValue, Payload, Token};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use std_alloc::vec::Vec;

use super::assembly::Assembly;
use super::state_token::StateToken;
use crate::config::Config;
use crate::error::Error;
use crate::logging::{log, msg_summary};
use crate::net::Addrd;
use crate::platform::{Effect, Effects, Event};
use crate::session::Session;
use crate::time::{millis_until, Clock, Millis};

/// Responses we expect for a request we sent
#[derive(Debug)]
pub(crate) struct LgCrcv<C: Clock> {
  /// Token the application used for the request
  pub(crate) app_token: Token,
  /// Token currently on the wire
  pub(crate) state: StateToken,
  /// The request, stripped down for asking for more blocks
  pub(crate) skeleton: Message,
  /// The most recent request sent for this exchange
  pub(crate) last_req: Message,
  /// We asked to observe, and the peer has not said no
  pub(crate) observe: bool,
  pub(crate) etag: Option<OptValue>,
  /// Observe value of the notification being reassembled
  pub(crate) notification: Option<Vec<OptValue>>,
  pub(crate) assembly: Assembly,
  /// The body was delivered; lingering to absorb duplicates
  pub(crate) complete: bool,
  pub(crate) expires_at: Instant<C>,
}

impl<C: Clock> LgCrcv<C> {
  pub(crate) fn new(app_token: Token,
                    state: StateToken,
                    req: &Message,
                    config: &Config,
                    expires_at: Instant<C>)
                    -> Self {
    let mut skeleton = req.clone();
    [BLOCK1, BLOCK2, SIZE1, OBSERVE, REQUEST_TAG].into_iter()
                                                 .for_each(|n| {
                                                   skeleton.remove(n);
                                                 });

    // FETCH carries its query in the payload
    if req.code != code::FETCH {
      skeleton.payload.0.clear();
    }

    Self { app_token,
           state,
           skeleton,
           last_req: req.clone(),
           observe: req.observe() == Some(0),
           etag: None,
           notification: None,
           assembly: Assembly::new(config.block.max_ranges, config.block.max_body_size),
           complete: false,
           expires_at }
  }
}

/// Largest block size (no larger than `szx`) whose blocks start at `offset`
fn aligned_szx(offset: usize, szx: u8) -> u8 {
  if szx == croak_msg::BERT_SZX && offset % croak_msg::BERT_UNIT == 0 {
    return szx;
  }

  (0..=szx.min(6)).rev()
                  .find(|szx| offset % Block::size_of(*szx) == 0)
                  .unwrap_or(0)
}

impl<C: Clock, B: AsRef<[u8]>> Session<C, B> {
  /// Send `req` as the next request of the exchange at `ix`
  fn crcv_resend(&mut self, now: Instant<C>, effects: &mut Effects<B>, ix: usize, mut req: Message) {
    let lg = &mut self.lg_crcv[ix];
    lg.state = lg.state.next();
    req.token = lg.state.to_token();
    req.id = Id(0);
    lg.last_req = req.clone();

    self.provision_id(&mut req);
    self.transmit(now, effects, req);
  }

  /// Ask for the block of the response body at `num`
  fn crcv_request_block(&mut self, now: Instant<C>, effects: &mut Effects<B>, ix: usize, num: u32, szx: u8) {
    let mut req = self.lg_crcv[ix].skeleton.clone();

    match Block::new(num, szx, false) {
      | Ok(b) => {
        req.set_block2(b);
        self.crcv_resend(now, effects, ix, req);
      },
      | Err(e) => {
        log!(Session::crcv_request_block,
             effects,
             log::Level::Warn,
             "can't ask for block {}: {}",
             num,
             e);
        let lg = self.lg_crcv.remove(ix);
        effects.push(Effect::Event(Event::PartialBlock(lg.app_token)));
      },
    }
  }

  /// A response to a request we sent
  pub(crate) fn crcv_on_response(&mut self,
                                 now: Instant<C>,
                                 effects: &mut Effects<B>,
                                 ix: usize,
                                 msg: Message)
                                 -> nb::Result<Addrd<Message>, Error> {
    let lifetime = self.exchange_lifetime(now);
    let lg = &mut self.lg_crcv[ix];

    if lg.complete {
      log!(Session::crcv_on_response,
           effects,
           log::Level::Debug,
           "late duplicate {}",
           msg_summary(&msg));
      return Err(nb::Error::WouldBlock);
    }

    lg.expires_at = lifetime;

    if msg.code == code::UNAUTHORIZED {
      if let Some(echo) = msg.echo().filter(|e| lg.last_req.echo() != Some(*e)) {
        log!(Session::crcv_on_response,
             effects,
             log::Level::Debug,
             "repeating request with Echo");
        let mut req = lg.last_req.clone();
        req.set(ECHO, echo.clone());
        self.crcv_resend(now, effects, ix, req);
        return Err(nb::Error::WouldBlock);
      }
    }

    let block2 = match msg.block2() {
      | Ok(b) => b.filter(|_| msg.code.is_success()),
      | Err(e) => {
        log!(Session::crcv_on_response,
             effects,
             log::Level::Warn,
             "malformed Block2 ({}) in {}",
             e,
             msg_summary(&msg));
        None
      },
    };

    let first = block2.map(|b| b.num() == 0).unwrap_or(true);
    if first && msg.observe().is_none() {
      lg.observe = false;
    }

    match block2 {
      | Some(b) => self.crcv_on_block(now, effects, ix, msg, b),
      | None => {
        let app_token = lg.app_token;
        if lg.observe && msg.code.is_success() {
          lg.assembly.reset();
        } else {
          let lg = self.lg_crcv.remove(ix);
          if !lg.assembly.is_empty() {
            effects.push(Effect::Event(Event::PartialBlock(app_token)));
          }
        }

        let mut msg = msg;
        msg.token = app_token;
        Ok(Addrd(msg, self.addr))
      },
    }
  }

  fn crcv_on_block(&mut self,
                   now: Instant<C>,
                   effects: &mut Effects<B>,
                   ix: usize,
                   mut msg: Message,
                   b: Block)
                   -> nb::Result<Addrd<Message>, Error> {
    let linger = self.config.block.rcv_linger;
    let lg = &mut self.lg_crcv[ix];

    if b.num() == 0 && msg.observe().is_some() {
      // a new notification replaces one being reassembled
      lg.assembly.reset();
      lg.etag = None;
      lg.notification = msg.get(OBSERVE).cloned();
    }

    let etag = msg.etag().cloned();
    let changed = matches!((&lg.etag, &etag), (Some(old), Some(new)) if old != new);

    if changed {
      log!(Session::crcv_on_block,
           effects,
           log::Level::Debug,
           "representation changed during transfer; starting over");
      lg.assembly.reset();
      lg.etag = etag;

      if b.num() != 0 {
        self.crcv_request_block(now, effects, ix, 0, b.szx());
        return Err(nb::Error::WouldBlock);
      }
    } else if lg.etag.is_none() {
      lg.etag = etag;
    }

    let declared = msg.size2().map(|n| n as usize);

    match lg.assembly.record(b, msg.payload(), declared) {
      | Err(e) => {
        log!(Session::crcv_on_block,
             effects,
             log::Level::Warn,
             "abandoning response body: {}",
             e);
        let lg = self.lg_crcv.remove(ix);
        effects.push(Effect::Event(Event::PartialBlock(lg.app_token)));
        Err(nb::Error::WouldBlock)
      },
      | Ok(true) => {
        msg.payload = Payload(lg.assembly.take());
        msg.remove(BLOCK2);
        msg.token = lg.app_token;

        if let Some(obs) = lg.notification.take() {
          msg.opts.insert(OBSERVE, obs);
        }

        if !lg.observe {
          lg.complete = true;
          lg.expires_at = now + linger;
        }

        Ok(Addrd(msg, self.addr))
      },
      | Ok(false) => {
        let next = lg.assembly.next_missing_offset();
        let szx = aligned_szx(next, b.szx());
        let num = (next / Block::size_of(szx)) as u32;
        self.crcv_request_block(now, effects, ix, num, szx);
        Err(nb::Error::WouldBlock)
      },
    }
  }

  /// Expire response tracking that went idle.
  ///
  /// Observations stay registered; only a partially received
  /// notification is abandoned.
  pub fn lg_crcv_timeouts(&mut self, now: Instant<C>, effects: &mut Effects<B>) -> Option<Millis> {
    let lifetime = self.exchange_lifetime(now);
    let mut ix = 0;

    while ix < self.lg_crcv.len() {
      let lg = &mut self.lg_crcv[ix];

      if lg.expires_at > now {
        ix += 1;
      } else if lg.observe {
        if !lg.assembly.is_empty() {
          lg.assembly.reset();
          effects.push(Effect::Event(Event::PartialBlock(lg.app_token)));
        }

        lg.expires_at = lifetime;
        ix += 1;
      } else {
        let lg = self.lg_crcv.remove(ix);
        if !lg.assembly.is_empty() && !lg.complete {
          log!(Session::lg_crcv_timeouts,
               effects,
               log::Level::Debug,
               "response body went idle");
          effects.push(Effect::Event(Event::PartialBlock(lg.app_token)));
        }
      }
    }

    self.lg_crcv
        .iter()
        .map(|c| millis_until(now, c.expires_at))
        .min()
        .map(Milliseconds)
  }

  /// Stop observing the resource registered with `token`.
  ///
  /// Sends a deregistration (Observe: 1) with the token of the original
  /// registration, and tears down any notification being reassembled.
  /// The response to the deregistration is delivered like any other.
  ///
  /// Yields `false` if there is no observation with that token.
  pub fn cancel_observe(&mut self, now: Instant<C>, effects: &mut Effects<B>, token: Token) -> bool {
    let ix = match self.lg_crcv
                       .iter()
                       .position(|c| c.app_token == token && c.observe)
    {
      | Some(ix) => ix,
      | None => return false,
    };

    let lg = self.lg_crcv.remove(ix);
    if !lg.assembly.is_empty() {
      effects.push(Effect::Event(Event::PartialBlock(token)));
    }

    let registration = StateToken::new(lg.state.base());
    let mut req = lg.skeleton.clone();
    req.set_uint(OBSERVE, 1);
    req.token = registration.to_token();
    req.id = Id(0);

    let crcv = LgCrcv::new(token, registration, &req, &self.config, self.exchange_lifetime(now));
    self.lg_crcv.push(crcv);

    self.provision_id(&mut req);
    self.transmit(now, effects, req);
    true
  }
}
