//! Receiving request bodies uploaded to us with Block1.

use croak_msg::known::SIZE1;
use croak_msg::{code, Block, Message, OptValue, Payload, Token, Type};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

use super::assembly::Assembly;
use crate::error::Error;
use crate::logging::log;
use crate::net::Addrd;
use crate::platform::{Effect, Effects, Event};
use crate::session::Session;
use crate::time::{millis_until, Clock, Millis};

/// A request body being uploaded to us
#[derive(Debug)]
pub(crate) struct LgSrcv<C: Clock> {
  /// Identifies the resource being uploaded to
  pub(crate) key: u64,
  pub(crate) request_tag: Option<OptValue>,
  pub(crate) content_format: Option<u32>,
  /// Token of the most recent block
  pub(crate) token: Token,
  pub(crate) assembly: Assembly,
  /// Block1 of the final block, once it arrived
  pub(crate) last: Option<Block>,
  pub(crate) complete: bool,
  pub(crate) expires_at: Instant<C>,
}

impl<C: Clock> LgSrcv<C> {
  fn matches(&self, key: u64, request_tag: Option<&OptValue>) -> bool {
    self.key == key && self.request_tag.as_ref() == request_tag
  }
}

impl<C: Clock, B: AsRef<[u8]>> Session<C, B> {
  /// A request carrying Block1 arrived
  pub(crate) fn srcv_on_request(&mut self,
                                now: Instant<C>,
                                effects: &mut Effects<B>,
                                mut req: Message,
                                b1: Block)
                                -> nb::Result<Addrd<Message>, Error> {
    let key = req.resource_key();
    let max_body = self.config.block.max_body_size;
    let lifetime = self.exchange_lifetime(now);
    let linger = self.config.block.rcv_linger;

    let found = self.lg_srcv
                    .iter()
                    .position(|s| s.matches(key, req.request_tag()));

    let ix = match found {
      | Some(ix) if self.lg_srcv[ix].complete && b1.num() == 0 => {
        // the same resource is being uploaded again
        self.lg_srcv.remove(ix);
        None
      },
      | found => found,
    };

    let ix = match ix {
      | Some(ix) if self.lg_srcv[ix].complete => {
        log!(Session::srcv_on_request,
             effects,
             log::Level::Debug,
             "block {} of an upload that already finished",
             b1.num());
        self.respond(now, effects, &req, code::REQUEST_ENTITY_INCOMPLETE, |_| ());
        return Err(nb::Error::WouldBlock);
      },
      | Some(ix) => ix,
      | None if b1.num() == 0 && !b1.more() => return Ok(Addrd(req, self.addr)),
      | None => {
        if req.size1().map(|n| n as usize > max_body).unwrap_or(false) {
          self.respond_too_large(now, effects, &req);
          return Err(nb::Error::WouldBlock);
        }

        // blocks may arrive in any order; whichever comes first starts the upload
        self.lg_srcv.push(LgSrcv { key,
                                   request_tag: req.request_tag().cloned(),
                                   content_format: req.content_format(),
                                   token: req.token,
                                   assembly: Assembly::new(self.config.block.max_ranges, max_body),
                                   last: None,
                                   complete: false,
                                   expires_at: lifetime });
        self.lg_srcv.len() - 1
      },
    };

    let lg = &mut self.lg_srcv[ix];
    lg.token = req.token;
    lg.expires_at = lifetime;

    if lg.content_format != req.content_format() {
      log!(Session::srcv_on_request,
           effects,
           log::Level::Debug,
           "Content-Format changed mid-upload");
      self.lg_srcv.remove(ix);
      self.respond(now, effects, &req, code::REQUEST_ENTITY_INCOMPLETE, |_| ());
      return Err(nb::Error::WouldBlock);
    }

    let declared = req.size1().map(|n| n as usize);

    match lg.assembly.record(b1, req.payload(), declared) {
      | Err(Error::BodyTooLarge { .. }) => {
        self.lg_srcv.remove(ix);
        self.respond_too_large(now, effects, &req);
        Err(nb::Error::WouldBlock)
      },
      | Err(e) => {
        log!(Session::srcv_on_request,
             effects,
             log::Level::Warn,
             "abandoning upload: {}",
             e);
        self.lg_srcv.remove(ix);
        effects.push(Effect::Event(Event::PartialBlock(req.token)));
        self.respond(now, effects, &req, code::INTERNAL_SERVER_ERROR, |_| ());
        Err(nb::Error::WouldBlock)
      },
      | Ok(false) if b1.more() => {
        let szx = match b1.is_bert() && self.bert() {
          | true => croak_msg::BERT_SZX,
          | false => b1.logical_szx().min(self.config.block.preferred_szx),
        };

        let ack = Block::new(b1.num(), szx, true);
        self.respond(now, effects, &req, code::CONTINUE, |resp| {
              if let Ok(ack) = ack {
                resp.set_block1(ack);
              }
            });
        Err(nb::Error::WouldBlock)
      },
      | Ok(false) => {
        log!(Session::srcv_on_request,
             effects,
             log::Level::Debug,
             "final block {} arrived with a gap at byte {}",
             b1.num(),
             lg.assembly.next_missing_offset());
        lg.last = Some(b1);

        if req.ty == Type::Con && !self.link.reliable {
          self.send(now, effects, req.ack());
        }
        Err(nb::Error::WouldBlock)
      },
      | Ok(true) => {
        req.payload = Payload(lg.assembly.take());
        lg.complete = true;
        lg.last = Some(lg.last.filter(|_| b1.more()).unwrap_or(b1.with_more(false)));
        lg.expires_at = now + linger;

        Ok(Addrd(req, self.addr))
      },
    }
  }

  fn respond_too_large(&mut self, now: Instant<C>, effects: &mut Effects<B>, req: &Message) {
    let max = u32::try_from(self.config.block.max_body_size).unwrap_or(u32::MAX);
    self.respond(now, effects, req, code::REQUEST_ENTITY_TOO_LARGE, |resp| {
          resp.set_uint(SIZE1, max)
        });
  }

  /// Responses to the final block of an upload echo its Block1
  pub(crate) fn echo_block1(&self, resp: &mut Message) {
    if !matches!(resp.block1(), Ok(None)) {
      return;
    }

    let last = self.lg_srcv
                   .iter()
                   .find(|s| s.complete && s.token == resp.token)
                   .and_then(|s| s.last);

    if let Some(b) = last {
      resp.set_block1(b);
    }
  }

  /// Forget uploads that went idle, and completed ones
  /// that have lingered long enough
  pub fn lg_srcv_timeouts(&mut self, now: Instant<C>, effects: &mut Effects<B>) -> Option<Millis> {
    let mut ix = 0;

    while ix < self.lg_srcv.len() {
      if self.lg_srcv[ix].expires_at > now {
        ix += 1;
        continue;
      }

      let lg = self.lg_srcv.remove(ix);
      if !lg.complete {
        log!(Session::lg_srcv_timeouts,
             effects,
             log::Level::Debug,
             "upload went idle");
        effects.push(Effect::Event(Event::PartialBlock(lg.token)));
      }
    }

    self.lg_srcv
        .iter()
        .map(|s| millis_until(now, s.expires_at))
        .min()
        .map(Milliseconds)
  }
}
