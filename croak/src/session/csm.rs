use croak_msg::known::signal;
use croak_msg::{code, Id, Message, OptValue, Token, Type};
use embedded_time::Instant;

use super::{Session, State};
use crate::logging::{log, msg_summary};
use crate::platform::Effects;
use crate::time::Clock;

impl<C: Clock, B: AsRef<[u8]>> Session<C, B> {
  /// The Capabilities and Settings Message we advertise
  pub(crate) fn csm(&self) -> Message {
    let mut csm = Message::new(Type::Non, code::CSM, Id(0), Token::default());
    let max = u32::try_from(self.config.csm.max_message_size).unwrap_or(u32::MAX);
    csm.set_uint(signal::MAX_MESSAGE_SIZE, max);

    if self.link.bert && self.config.block.bert {
      csm.set(signal::BLOCK_WISE_TRANSFER, OptValue::default());
    }

    csm
  }

  /// Send our CSM and wait for the peer's
  pub(crate) fn begin_csm(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    self.state = State::Csm;
    let csm = self.csm();
    self.transmit(now, effects, csm);

    if self.peer.csm_received {
      self.establish(now, effects);
    }
  }

  pub(crate) fn on_signal(&mut self, now: Instant<C>, effects: &mut Effects<B>, msg: &Message) {
    match msg.code {
      | c if c == code::CSM => {
        if let Some(max) = msg.get_uint(signal::MAX_MESSAGE_SIZE) {
          self.peer.max_message_size = max as usize;
        }

        self.peer.bert = msg.get(signal::BLOCK_WISE_TRANSFER).is_some();
        self.peer.csm_received = true;

        log!(Session::on_signal,
             effects,
             log::Level::Debug,
             "peer max message size {}, bert {}",
             self.peer.max_message_size,
             self.peer.bert);

        if self.state == State::Csm {
          self.establish(now, effects);
        }
      },
      | c if c == code::PING => {
        let pong = Message::new(Type::Non, code::PONG, Id(0), msg.token);
        self.transmit(now, effects, pong);
      },
      | c if c == code::PONG => (),
      | c if c == code::RELEASE || c == code::ABORT => {
        log!(Session::on_signal,
             effects,
             log::Level::Info,
             "peer ended the session with {}",
             msg.code);
        self.close(now, effects);
      },
      | _ => {
        log!(Session::on_signal,
             effects,
             log::Level::Debug,
             "ignoring {}",
             msg_summary(msg));
      },
    }
  }

  /// Check that the peer is alive (reliable transports)
  pub fn ping(&mut self, now: Instant<C>, effects: &mut Effects<B>) {
    let ping = Message::new(Type::Non, code::PING, Id(0), Token::default());
    self.transmit(now, effects, ping);
  }
}
