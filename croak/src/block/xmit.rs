//! Sending bodies too large for one message: uploading request bodies
//! with Block1 and serving response bodies with Block2.

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};
use croak_msg::known::{BLOCK1, BLOCK2, ECHO, ETAG, OBSERVE, REQUEST_TAG, SIZE1};
use croak_msg::{code, Block, Framing, Id, Message, OptValue, Token, Type};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

use super::negotiate::{min_szx_for, negotiate, renegotiate, Chunk, Negotiate};
use super::state_token::StateToken;
use crate::error::Error;
use crate::logging::log;
use crate::platform::{Effect, Effects, Event};
use crate::session::Session;
use crate::time::{millis_until, Clock, Millis};

/// Which side of an exchange a body is sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XmitKind {
  /// A request body uploaded with Block1
  Request {
    state: StateToken,
    app_token: Token,
  },
  /// A response body served with Block2, to any request
  /// for the same representation
  Response {
    key: u64,
    /// Token of the request the body was first served to
    token: Token,
    /// Token of the most recent request for a block
    latest: Token,
  },
}

/// A body being sent block by block
#[derive(Debug)]
pub(crate) struct LgXmit<C: Clock, B> {
  pub(crate) kind: XmitKind,
  pub(crate) body: B,
  /// Header & options shared by every block
  pub(crate) skeleton: Message,
  /// SZX of the blocks we send (6 when BERT)
  pub(crate) szx: u8,
  pub(crate) last: Option<Chunk>,
  /// The final block has been sent
  pub(crate) complete: bool,
  pub(crate) expires_at: Instant<C>,
}

/// Space left for the payload of a message, leaving room for a block option
fn avail(msg: &Message, opt: croak_msg::OptNumber, max_pdu: usize, framing: Framing) -> usize {
  let mut probe = msg.clone();
  probe.payload.0.clear();
  probe.set(opt, OptValue(std_alloc::vec![0xFF; 3]));

  // payload marker, plus the extended length a stream frame may grow by
  let overhead = probe.size(framing)
                 + 1
                 + match framing {
                   | Framing::Stream => 4,
                   | Framing::Datagram => 0,
                 };

  max_pdu.saturating_sub(overhead)
}

/// An entity tag derived from the body
pub(crate) fn etag_for(body: &[u8]) -> OptValue {
  let mut hasher = Blake2b::<U8>::new();
  hasher.update(body);
  OptValue(hasher.finalize().to_vec())
}

impl<C: Clock, B: AsRef<[u8]>> LgXmit<C, B> {
  fn opt(&self) -> croak_msg::OptNumber {
    match self.kind {
      | XmitKind::Request { .. } => BLOCK1,
      | XmitKind::Response { .. } => BLOCK2,
    }
  }

  pub(crate) fn is_request_for(&self, state: &StateToken) -> bool {
    matches!(self.kind, XmitKind::Request { state: s, .. } if s.same_transfer(state))
  }

  /// Is `state` the token of the most recent block we sent?
  pub(crate) fn is_on_the_wire(&self, state: &StateToken) -> bool {
    matches!(self.kind, XmitKind::Request { state: s, .. } if s == *state)
  }

  pub(crate) fn is_response_to(&self, token: &Token) -> bool {
    matches!(self.kind, XmitKind::Response { token: t, latest, .. } if t == *token || latest == *token)
  }

  pub(crate) fn serves(&self, cache_key: u64) -> bool {
    matches!(self.kind, XmitKind::Response { key, .. } if key == cache_key)
  }

  /// Token the application knows this body by
  pub(crate) fn token(&self) -> Token {
    match self.kind {
      | XmitKind::Request { app_token, .. } => app_token,
      | XmitKind::Response { token, .. } => token,
    }
  }

  /// Build the message carrying block `num` (in units of `szx`)
  pub(crate) fn block_message(&self,
                              num: u32,
                              szx: u8,
                              max_pdu: usize,
                              framing: Framing,
                              bert: bool)
                              -> Result<(Message, Chunk), Error> {
    let body = self.body.as_ref();
    let opt = self.opt();

    let mut msg = self.skeleton.clone();
    if opt == BLOCK1 && num == 0 {
      msg.set_size1(u32::try_from(body.len()).unwrap_or(u32::MAX));
    }

    let chunk = negotiate(Negotiate { avail: avail(&msg, opt, max_pdu, framing),
                                      szx,
                                      num,
                                      body_len: body.len(),
                                      bert })?;

    msg.set(opt, OptValue(chunk.block.to_bytes().to_vec()));
    msg.payload.0 = body[chunk.range()].to_vec();

    Ok((msg, chunk))
  }

  /// Give the body back to the application
  pub(crate) fn abort(self, effects: &mut Effects<B>, err: crate::error::Error) {
    let token = self.token();
    effects.push(Effect::Release(token, Err((self.body, err))));
    effects.push(Effect::Event(Event::XmitBlockFail(token)));
  }

  /// The body was transferred (or, for served responses, is no longer needed)
  pub(crate) fn finish(self, effects: &mut Effects<B>) {
    effects.push(Effect::Release(self.token(), Ok(self.body)));
  }
}

impl<C: Clock, B: AsRef<[u8]>> Session<C, B> {
  /// Send a request whose body may be too large for one message.
  ///
  /// The body is uploaded block by block using Block1; the caller regains
  /// ownership of it through an [`Effect::Release`] once the upload finishes
  /// or fails. The final response (reassembled if it is itself block-wise)
  /// is delivered by [`Session::recv`] with the returned token.
  ///
  /// Bodies that fit in a single message are sent as-is and released immediately.
  pub fn send_large(&mut self,
                    now: Instant<C>,
                    effects: &mut Effects<B>,
                    mut msg: Message,
                    body: B)
                    -> Result<Token, (B, Error)> {
    if !msg.is_request() {
      return Err((body, Error::NotARequest(msg.code)));
    }

    let len = body.as_ref().len();
    let szx = match min_szx_for(len) {
      | Some(min) => self.config.block.preferred_szx.min(6).max(min),
      | None => {
        return Err((body,
                    Error::BodyTooLarge { len,
                                          max: Block::size_of(6) * (croak_msg::MAX_NUM as usize + 1) }))
      },
    };

    self.provision_id(&mut msg);
    msg.remove(BLOCK1);
    msg.remove(SIZE1);
    msg.payload.0.clear();

    let (max_pdu, framing) = (self.max_pdu_size(), self.framing());

    if msg.size(framing) + 1 + len <= max_pdu {
      msg.payload.0 = body.as_ref().to_vec();
      let token = self.track_request(now, &mut msg);
      self.transmit(now, effects, msg);
      effects.push(Effect::Release(token, Ok(body)));
      return Ok(token);
    }

    if msg.request_tag().is_none() {
      let tag = self.next_request_tag();
      msg.set(REQUEST_TAG, OptValue::uint(tag));
    }

    let app_token = self.track_request(now, &mut msg);
    let state = StateToken::from_token(&msg.token);

    let mut lg = LgXmit { kind: XmitKind::Request { state, app_token },
                          body,
                          skeleton: msg,
                          szx,
                          last: None,
                          complete: false,
                          expires_at: self.exchange_lifetime(now) };

    let (first, chunk) = match lg.block_message(0, szx, max_pdu, framing, self.bert()) {
      | Ok(first) => first,
      | Err(e) => {
        self.lg_crcv.retain(|c| c.app_token != app_token);
        return Err((lg.body, e));
      },
    };

    log!(Session::send_large,
         effects,
         log::Level::Debug,
         "uploading {} bytes in blocks of {}",
         len,
         chunk.len);

    if !chunk.block.is_bert() {
      lg.szx = chunk.block.szx();
    }
    lg.last = Some(chunk);
    lg.complete = !chunk.block.more();
    self.lg_xmit.push(lg);
    self.transmit(now, effects, first);
    Ok(app_token)
  }

  /// Respond to `req` with a body that may be too large for one message.
  ///
  /// The block the request asked for (or block 0) is sent now, and later
  /// blocks are served from the body as the peer requests them. An ETag
  /// is added if `resp` has none, so the peer can detect the body changing
  /// under it. Responding again for the same representation replaces the
  /// body being served.
  ///
  /// The body is released once the transfer finishes and has lingered for
  /// [`xmit_linger`](crate::config::Block::xmit_linger), or when it is abandoned.
  pub fn respond_large(&mut self,
                       now: Instant<C>,
                       effects: &mut Effects<B>,
                       req: &Message,
                       mut resp: Message,
                       body: B)
                       -> Result<(), (B, Error)> {
    let requested = match req.block2() {
      | Ok(b) => b,
      | Err(e) => return Err((body, e.into())),
    };

    let len = body.as_ref().len();
    let (max_pdu, framing, bert) = (self.max_pdu_size(), self.framing(), self.bert());

    resp.remove(BLOCK2);
    resp.payload.0.clear();

    if requested.is_none() && resp.size(framing) + 1 + len <= max_pdu {
      resp.payload.0 = body.as_ref().to_vec();
      let token = resp.token;
      self.send(now, effects, resp);
      effects.push(Effect::Release(token, Ok(body)));
      return Ok(());
    }

    let mut szx = match min_szx_for(len) {
      | Some(min) => {
        let asked = requested.map(|b| b.logical_szx()).unwrap_or(6);
        self.config.block.preferred_szx.min(asked).max(min)
      },
      | None => {
        return Err((body,
                    Error::BodyTooLarge { len,
                                          max: Block::size_of(6) * (croak_msg::MAX_NUM as usize + 1) }))
      },
    };

    let bert = bert && requested.map(|b| b.is_bert()).unwrap_or(true);

    if resp.etag().is_none() {
      resp.set(ETAG, etag_for(body.as_ref()));
    }
    resp.set_size2(u32::try_from(len).unwrap_or(u32::MAX));

    let key = req.cache_key();
    if let Some(ix) = self.lg_xmit.iter().position(|x| x.serves(key)) {
      log!(Session::respond_large,
           effects,
           log::Level::Debug,
           "replacing body being served");
      self.lg_xmit.remove(ix).finish(effects);
    }

    let mut skeleton = resp.clone();
    skeleton.remove(OBSERVE);

    let mut lg = LgXmit { kind: XmitKind::Response { key,
                                                    token: resp.token,
                                                    latest: resp.token },
                          body,
                          skeleton,
                          szx,
                          last: None,
                          complete: false,
                          expires_at: self.exchange_lifetime(now) };

    // the peer numbered the block it wants in units of its own size
    let num = match requested {
      | Some(b) => {
        if b.offset() % Block::size_of(szx) != 0 {
          szx = b.logical_szx();
        }
        (b.offset() / Block::size_of(szx)) as u32
      },
      | None => 0,
    };
    let (mut msg, chunk) = match lg.block_message(num, szx, max_pdu, framing, bert) {
      | Ok(first) => first,
      | Err(e) => return Err((lg.body, e)),
    };

    // the block answering this request carries its header & Observe
    msg.ty = resp.ty;
    msg.id = resp.id;
    if let Some(obs) = resp.get(OBSERVE) {
      msg.opts.insert(OBSERVE, obs.clone());
    }

    lg.szx = chunk.block.logical_szx();
    lg.last = Some(chunk);
    if !chunk.block.more() {
      lg.complete = true;
      lg.expires_at = now + self.config.block.xmit_linger;
    }

    self.lg_xmit.push(lg);
    self.send(now, effects, msg);
    Ok(())
  }

  /// The peer asked for another block of a body we are serving
  pub(crate) fn xmit_on_request(&mut self,
                                now: Instant<C>,
                                effects: &mut Effects<B>,
                                ix: usize,
                                req: &Message,
                                asked: Block) {
    let (max_pdu, framing) = (self.max_pdu_size(), self.framing());
    let bert = self.bert() && asked.is_bert();
    let linger = self.config.block.xmit_linger;
    let lifetime = self.exchange_lifetime(now);

    let lg = &mut self.lg_xmit[ix];
    let built = lg.block_message(asked.num(), asked.logical_szx(), max_pdu, framing, bert);

    match built {
      | Ok((mut msg, chunk)) => {
        let reliable = self.link.reliable;
        let (ty, id) = match req.ty {
          | Type::Con if !reliable => (Type::Ack, req.id),
          | _ => (Type::Non, Id(0)),
        };

        msg.ty = ty;
        msg.id = id;
        msg.token = req.token;

        if let XmitKind::Response { latest, .. } = &mut lg.kind {
          *latest = req.token;
        }

        lg.last = Some(chunk);
        if !chunk.block.more() {
          lg.complete = true;
        }
        lg.expires_at = if lg.complete { now + linger } else { lifetime };

        self.send(now, effects, msg);
      },
      | Err(e) => {
        log!(Session::xmit_on_request,
             effects,
             log::Level::Debug,
             "can't serve block {}: {}",
             asked.num(),
             e);
        self.respond(now, effects, req, code::BAD_REQUEST, |_| ());
      },
    }
  }

  /// A response arrived for a request body we are uploading.
  ///
  /// Yields the response if the application (or the response
  /// reassembly) should see it.
  pub(crate) fn xmit_on_response(&mut self,
                                 now: Instant<C>,
                                 effects: &mut Effects<B>,
                                 ix: usize,
                                 msg: Message)
                                 -> Option<Message> {
    let block1 = msg.block1().ok().flatten();
    let lifetime = self.exchange_lifetime(now);
    let lg = &mut self.lg_xmit[ix];
    let last = lg.last;

    // these move the upload along, so only the answer to the block on the wire counts
    let steers = [code::CONTINUE, code::REQUEST_ENTITY_TOO_LARGE, code::UNAUTHORIZED].contains(&msg.code);
    if steers && !lg.is_on_the_wire(&StateToken::from_token(&msg.token)) {
      log!(Session::xmit_on_response,
           effects,
           log::Level::Debug,
           "stale {} for an earlier block",
           msg.code);
      return None;
    }

    lg.expires_at = lifetime;

    match msg.code {
      | c if c == code::CONTINUE => {
        let last = last?;
        let next = last.end();

        if next >= lg.body.as_ref().len() {
          log!(Session::xmit_on_response,
               effects,
               log::Level::Warn,
               "peer asked for more of a body we already sent in full");
          return None;
        }

        if let Some(b) = block1.filter(|b| !b.is_bert() && b.szx() != lg.szx) {
          match renegotiate(next, b.szx()) {
            | Some(szx) => lg.szx = szx,
            | None => log!(Session::xmit_on_response,
                           effects,
                           log::Level::Debug,
                           "ignoring block size {} not aligned with offset {}",
                           b.size(),
                           next),
          }
        }

        let num = (next / Block::size_of(lg.szx)) as u32;
        self.send_block(now, effects, ix, num);
        None
      },
      | c if c == code::REQUEST_ENTITY_TOO_LARGE
             && block1.map(|b| b.logical_szx() < lg.szx).unwrap_or(false) =>
      {
        let szx = block1.map(|b| b.logical_szx()).unwrap_or(0);
        log!(Session::xmit_on_response,
             effects,
             log::Level::Debug,
             "peer wants blocks of {} bytes; starting over",
             Block::size_of(szx));
        lg.szx = szx;
        self.send_block(now, effects, ix, 0);
        None
      },
      | c if c == code::UNAUTHORIZED
             && msg.echo().is_some()
             && msg.echo() != lg.skeleton.get_first(ECHO) =>
      {
        let last = last?;
        if let Some(echo) = msg.echo() {
          lg.skeleton.set(ECHO, echo.clone());
        }

        let num = (last.offset / Block::size_of(lg.szx)) as u32;
        self.send_block(now, effects, ix, num);
        None
      },
      | c => {
        let lg = self.lg_xmit.remove(ix);
        if c.is_success() && lg.complete {
          lg.finish(effects);
        } else {
          log!(Session::xmit_on_response,
               effects,
               log::Level::Debug,
               "upload ended by {}",
               c);
          lg.abort(effects, Error::Rejected(c));
        }

        Some(msg)
      },
    }
  }

  /// Send block `num` of the upload at `ix`
  fn send_block(&mut self, now: Instant<C>, effects: &mut Effects<B>, ix: usize, num: u32) {
    let (max_pdu, framing, bert) = (self.max_pdu_size(), self.framing(), self.bert());
    let lg = &mut self.lg_xmit[ix];

    match lg.block_message(num, lg.szx, max_pdu, framing, bert) {
      | Ok((mut msg, chunk)) => {
        let mut state = None;
        if let XmitKind::Request { state: s, .. } = &mut lg.kind {
          *s = s.next();
          msg.token = s.to_token();
          state = Some(*s);
        }

        if !chunk.block.is_bert() {
          lg.szx = chunk.block.szx();
        }
        lg.last = Some(chunk);
        lg.complete = !chunk.block.more();

        // responses to this block are tracked with the same token
        if let Some(state) = state {
          if let Some(crcv) = self.lg_crcv.iter_mut().find(|c| c.state.same_transfer(&state)) {
            crcv.state = state;
            crcv.last_req = msg.clone();
          }
        }

        msg.id = Id(0);
        self.provision_id(&mut msg);
        self.transmit(now, effects, msg);
      },
      | Err(e) => {
        log!(Session::send_block,
             effects,
             log::Level::Warn,
             "can't send block {}: {}",
             num,
             e);
        let lg = self.lg_xmit.remove(ix);
        let state = match lg.kind {
          | XmitKind::Request { state, .. } => Some(state),
          | XmitKind::Response { .. } => None,
        };
        lg.abort(effects, e);

        if let Some(state) = state {
          self.lg_crcv.retain(|c| !c.state.same_transfer(&state));
        }
      },
    }
  }

  /// Expire bodies that went idle, and release served bodies
  /// that have lingered long enough
  pub fn lg_xmit_timeouts(&mut self, now: Instant<C>, effects: &mut Effects<B>) -> Option<Millis> {
    let mut ix = 0;

    while ix < self.lg_xmit.len() {
      if self.lg_xmit[ix].expires_at > now {
        ix += 1;
        continue;
      }

      let lg = self.lg_xmit.remove(ix);
      match lg.kind {
        | XmitKind::Response { .. } if lg.complete => lg.finish(effects),
        | _ => {
          log!(Session::lg_xmit_timeouts,
               effects,
               log::Level::Debug,
               "body transfer went idle");
          lg.abort(effects, Error::Timeout);
        },
      }
    }

    self.lg_xmit
        .iter()
        .map(|x| millis_until(now, x.expires_at))
        .min()
        .map(Milliseconds)
  }

  /// Stop serving or uploading the body known by `token`,
  /// handing it back with [`Error::Cancelled`].
  ///
  /// Yields `false` if no such body was being sent.
  pub fn cancel_xmit(&mut self, effects: &mut Effects<B>, token: Token) -> bool {
    match self.lg_xmit.iter().position(|x| x.token() == token) {
      | Some(ix) => {
        let lg = self.lg_xmit.remove(ix);
        if let XmitKind::Request { state, .. } = lg.kind {
          self.lg_crcv.retain(|c| !c.state.same_transfer(&state));
        }
        lg.abort(effects, Error::Cancelled);
        true
      },
      | None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn etag_is_stable() {
    assert_eq!(etag_for(b"hello"), etag_for(b"hello"));
    assert_ne!(etag_for(b"hello"), etag_for(b"hellO"));
    assert_eq!(etag_for(b"").0.len(), 8);
  }

  #[test]
  fn avail_leaves_room_for_block_option() {
    let msg = Message::new(Type::Con, code::PUT, Id(1), Token::from_slice(&[1, 2]));
    // 4 header + 2 token + 5 block option (header, extended delta, 3 value bytes) + 1 marker
    assert_eq!(avail(&msg, BLOCK1, 100, Framing::Datagram), 100 - 12);
  }
}
