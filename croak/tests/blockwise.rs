use croak::config::Config;
use croak::net::{Addrd, Link};
use croak::platform::{Effect, Effects, Event, Released};
use croak::session::{Session, State};
use croak::test::{body, dummy_addr, ClockMock};
use croak::Error;
use croak_msg::known::{CONTENT_FORMAT, ECHO, ETAG, OBSERVE, URI_PATH};
use croak_msg::{code, Block, Code, Framing, Id, Message, OptValue, Token, TryFromBytes, TryIntoBytes, Type};
use embedded_time::Instant;

fn init_logging() {
  simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Trace)
                                    .init()
                                    .ok();
}

/// One end of a conversation, with its effects sorted out
struct Node {
  session: Session<ClockMock>,
  /// Messages sent, after a trip through the wire format
  outbox: Vec<Message>,
  /// Effects meant for the application
  app: Vec<Effect<Vec<u8>>>,
}

impl Node {
  fn new(link: Link, config: Config) -> Self {
    Self { session: Session::new(dummy_addr(), link, config, ClockMock::instant(0)),
           outbox: vec![],
           app: vec![] }
  }

  fn drive<R>(&mut self,
              ms: u64,
              f: impl FnOnce(&mut Session<ClockMock>, Instant<ClockMock>, &mut Effects<Vec<u8>>) -> R)
              -> R {
    let mut effects = Effects::new();
    let r = f(&mut self.session, ClockMock::instant(ms), &mut effects);
    let framing = self.session.framing();

    for eff in effects {
      match eff {
        | Effect::Send(Addrd(msg, _)) => self.outbox.push(wire(framing, msg)),
        | Effect::Log(level, line) => log::log!(level, "{}", line),
        | other => self.app.push(other),
      }
    }

    r
  }

  fn send(&mut self, ms: u64, msg: Message) -> Token {
    self.drive(ms, |s, now, effs| s.send(now, effs, msg))
  }

  fn recv(&mut self, ms: u64, msg: Message) -> nb::Result<Message, Error> {
    self.drive(ms, |s, now, effs| s.recv(now, effs, msg))
        .map(Addrd::unwrap)
  }

  /// Receive a message that should be absorbed by the engine
  fn absorb(&mut self, msg: Message) {
    assert_eq!(self.recv(0, msg), Err(nb::Error::WouldBlock));
  }

  fn take_outbox(&mut self) -> Vec<Message> {
    core::mem::take(&mut self.outbox)
  }

  /// The one message sent since last asked
  fn sent_one(&mut self) -> Message {
    let mut sent = self.take_outbox();
    assert_eq!(sent.len(), 1, "{:?}", sent);
    sent.remove(0)
  }

  fn releases(&self) -> Vec<(Token, Released<Vec<u8>>)> {
    self.app
        .iter()
        .filter_map(|eff| match eff {
          | Effect::Release(t, r) => Some((*t, r.clone())),
          | _ => None,
        })
        .collect()
  }

  fn events(&self) -> Vec<Event> {
    self.app
        .iter()
        .filter_map(|eff| match eff {
          | Effect::Event(e) => Some(e.clone()),
          | _ => None,
        })
        .collect()
  }
}

fn wire(framing: Framing, msg: Message) -> Message {
  let bytes = msg.try_into_bytes(framing).unwrap();
  Message::try_from_bytes(framing, bytes).unwrap()
}

#[derive(Debug, Default)]
struct Traffic {
  to_server: Vec<Message>,
  to_client: Vec<Message>,
  /// Responses the client delivered to the application
  delivered: Vec<Message>,
}

/// Shuttle messages between the two ends until the client goes quiet,
/// with `app` handling requests the server delivers
fn pump(client: &mut Node, server: &mut Node, mut app: impl FnMut(&mut Node, Message)) -> Traffic {
  let mut traffic = Traffic::default();

  for _ in 0..10_000 {
    let to_server = client.take_outbox();
    if to_server.is_empty() {
      return traffic;
    }

    for m in to_server {
      traffic.to_server.push(m.clone());
      match server.recv(0, m) {
        | Ok(req) => app(&mut *server, req),
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(e)) => panic!("server: {}", e),
      }
    }

    for m in server.take_outbox() {
      traffic.to_client.push(m.clone());
      match client.recv(0, m) {
        | Ok(resp) => traffic.delivered.push(resp),
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(e)) => panic!("client: {}", e),
      }
    }
  }

  panic!("transfer never finished")
}

fn preferring(szx: u8) -> Config {
  let mut config = Config::default();
  config.block.preferred_szx = szx;
  config
}

fn blk(num: u32, szx: u8, more: bool) -> Block {
  Block::new(num, szx, more).unwrap()
}

fn put(path: &str) -> Message {
  let mut req = Message::new(Type::Con, code::PUT, Id(0), Token::from_slice(&[1]));
  req.add(URI_PATH, path.as_bytes().into());
  req
}

fn get(path: &str) -> Message {
  let mut req = Message::new(Type::Con, code::GET, Id(0), Token::from_slice(&[2]));
  req.add(URI_PATH, path.as_bytes().into());
  req
}

/// Piggybacked response to `req`
fn reply(req: &Message, code: Code) -> Message {
  Message::new(Type::Ack, code, req.id, req.token)
}

fn changed(server: &mut Node, req: Message) {
  let ty = match req.ty {
    | Type::Con => Type::Ack,
    | _ => Type::Non,
  };
  server.send(0, Message::new(ty, code::CHANGED, req.id, req.token));
}

fn check_upload(szx: u8, len: usize, blocks: usize) {
  init_logging();

  let mut client = Node::new(Link::udp(), preferring(szx));
  let mut server = Node::new(Link::udp(), Config::default());

  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(len)))
                    .unwrap();

  let mut uploaded = None;
  let t = pump(&mut client, &mut server, |server, req| {
            uploaded = Some(req.payload().to_vec());
            changed(server, req);
          });

  let sent = t.to_server
              .iter()
              .map(|m| m.block1().unwrap().unwrap())
              .collect::<Vec<_>>();

  assert_eq!(sent.len(), blocks);
  assert_eq!(t.to_server[0].size1(), Some(len as u32));
  assert!(t.to_server[1..].iter().all(|m| m.size1().is_none()));
  sent.iter().enumerate().for_each(|(n, b)| {
                           assert_eq!(b.num(), n as u32);
                           assert_eq!(b.szx(), szx);
                           assert_eq!(b.more(), n + 1 < blocks);
                         });

  // every block but the last was continued
  assert_eq!(t.to_client
              .iter()
              .filter(|m| m.code == code::CONTINUE)
              .count(),
             blocks - 1);

  assert_eq!(uploaded, Some(body(len)));
  assert_eq!(t.delivered.len(), 1);
  assert_eq!(t.delivered[0].code, code::CHANGED);
  assert_eq!(t.delivered[0].token, token);
  assert_eq!(t.delivered[0].block1(),
             Ok(Some(blk(blocks as u32 - 1, szx, false))));

  assert_eq!(client.releases(), vec![(token, Ok(body(len)))]);
  assert_eq!(client.session.transfers_out(), 0);
  assert_eq!(client.session.pending(), 0);
}

macro_rules! upload {
  ($name:ident: szx $szx:literal, $len:literal bytes, $blocks:literal blocks) => {
    paste::paste! {
      #[test]
      fn [<upload_ $name>]() {
        check_upload($szx, $len, $blocks);
      }
    }
  };
}

upload!(in_16_byte_blocks: szx 0, 2000 bytes, 125 blocks);
upload!(in_64_byte_blocks: szx 2, 10000 bytes, 157 blocks);
upload!(in_256_byte_blocks: szx 4, 2048 bytes, 8 blocks);
upload!(in_1024_byte_blocks: szx 6, 5000 bytes, 5 blocks);

fn check_download(client_szx: u8, len: usize, blocks: usize) {
  init_logging();

  let mut client = Node::new(Link::udp(), preferring(client_szx));
  let mut server = Node::new(Link::udp(), Config::default());

  let token = client.send(0, get("log"));

  let t = pump(&mut client, &mut server, |server, req| {
            let resp = reply(&req, code::CONTENT);
            server.drive(0, |s, now, effs| s.respond_large(now, effs, &req, resp, body(len)))
                  .unwrap();
          });

  let served = t.to_client
                .iter()
                .map(|m| m.block2().unwrap().unwrap())
                .collect::<Vec<_>>();

  assert_eq!(served.len(), blocks);
  served.iter().enumerate().for_each(|(n, b)| {
                             assert_eq!(b.num(), n as u32);
                             assert_eq!(b.szx(), client_szx);
                             assert_eq!(b.more(), n + 1 < blocks);
                           });

  let etag = t.to_client[0].etag().cloned();
  assert!(etag.is_some());
  assert!(t.to_client.iter().all(|m| m.etag() == etag.as_ref()));
  assert!(t.to_client.iter().all(|m| m.size2() == Some(len as u32)));

  // every follow-up asked for the next block with a fresh token
  assert_eq!(t.to_server.len(), blocks);
  t.to_server.windows(2).for_each(|w| assert_ne!(w[0].token, w[1].token));

  assert_eq!(t.delivered.len(), 1);
  let resp = &t.delivered[0];
  assert_eq!(resp.code, code::CONTENT);
  assert_eq!(resp.token, token);
  assert_eq!(resp.payload(), &body(len)[..]);
  assert_eq!(resp.block2(), Ok(None));

  // the served body is kept around for a while, then released
  assert!(server.releases().is_empty());
  server.drive(8_000, |s, now, effs| s.poll_timeouts(now, effs));
  assert_eq!(server.releases(), vec![(t.to_client[0].token, Ok(body(len)))]);
}

macro_rules! download {
  ($name:ident: szx $szx:literal, $len:literal bytes, $blocks:literal blocks) => {
    paste::paste! {
      #[test]
      fn [<download_ $name>]() {
        check_download($szx, $len, $blocks);
      }
    }
  };
}

download!(in_1024_byte_blocks: szx 6, 5000 bytes, 5 blocks);
download!(in_64_byte_blocks: szx 2, 5000 bytes, 79 blocks);
download!(in_32_byte_blocks: szx 1, 1500 bytes, 47 blocks);

#[test]
fn small_bodies_go_in_one_message() {
  let mut client = Node::new(Link::udp(), Config::default());

  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("cfg"), body(100)))
                    .unwrap();

  let sent = client.sent_one();
  assert_eq!(sent.block1(), Ok(None));
  assert_eq!(sent.payload(), &body(100)[..]);
  assert_eq!(client.releases(), vec![(token, Ok(body(100)))]);
}

#[test]
fn only_requests_upload() {
  let mut client = Node::new(Link::udp(), Config::default());
  let resp = Message::new(Type::Non, code::CONTENT, Id(0), Token::from_slice(&[1]));

  let r = client.drive(0, |s, now, effs| s.send_large(now, effs, resp, body(5000)));
  assert_eq!(r, Err((body(5000), Error::NotARequest(code::CONTENT))));
  assert!(client.take_outbox().is_empty());
}

#[test]
fn blocks_shrink_to_fit_the_path() {
  init_logging();

  let link = Link { mtu: 48,
                    ..Link::udp() };
  let mut client = Node::new(link, Config::default());
  let mut server = Node::new(Link::udp(), Config::default());

  client.drive(0, |s, now, effs| s.send_large(now, effs, put("x"), body(200)))
        .unwrap();

  let mut uploaded = None;
  let t = pump(&mut client, &mut server, |server, req| {
            uploaded = Some(req.payload().to_vec());
            changed(server, req);
          });

  assert_eq!(t.to_server.len(), 13);
  t.to_server.iter().for_each(|m| {
                      assert_eq!(m.block1().unwrap().unwrap().szx(), 0);
                      assert!(m.try_into_bytes(Framing::Datagram).unwrap().len() <= 48);
                    });
  assert_eq!(uploaded, Some(body(200)));
}

#[test]
fn misaligned_block_size_is_ignored() {
  let mut client = Node::new(Link::udp(), preferring(2));
  client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(1300)))
        .unwrap();

  let m0 = client.sent_one();
  assert_eq!(m0.block1(), Ok(Some(blk(0, 2, true))));

  // 64 bytes sent; 1024-byte blocks don't line up
  let mut cont = reply(&m0, code::CONTINUE);
  cont.set_block1(blk(0, 6, true));
  client.absorb(cont);

  let m1 = client.sent_one();
  assert_eq!(m1.block1(), Ok(Some(blk(1, 2, true))));
  assert_eq!(m1.payload(), &body(1300)[64..128]);

  // 128 bytes sent; 128-byte blocks do
  let mut cont = reply(&m1, code::CONTINUE);
  cont.set_block1(blk(1, 3, true));
  client.absorb(cont);

  let m2 = client.sent_one();
  assert_eq!(m2.block1(), Ok(Some(blk(1, 3, true))));
  assert_eq!(m2.payload(), &body(1300)[128..256]);

  let mut cont = reply(&m2, code::CONTINUE);
  cont.set_block1(blk(1, 3, true));
  client.absorb(cont);

  let m3 = client.sent_one();
  assert_eq!(m3.block1(), Ok(Some(blk(2, 3, true))));
  assert_eq!(m3.payload(), &body(1300)[256..384]);
}

#[test]
fn stale_continue_is_ignored() {
  let mut client = Node::new(Link::udp(), preferring(2));
  client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(5000)))
        .unwrap();

  let m0 = client.sent_one();
  let mut cont = reply(&m0, code::CONTINUE);
  cont.set_block1(blk(0, 2, true));
  client.absorb(cont.clone());

  let m1 = client.sent_one();
  assert_eq!(m1.block1(), Ok(Some(blk(1, 2, true))));

  // the same 2.31 again, as a separate response
  cont.ty = Type::Non;
  cont.id = Id(0x4242);
  client.absorb(cont);
  assert!(client.take_outbox().is_empty());
  assert_eq!(client.session.delayed(), 0);

  let mut cont = reply(&m1, code::CONTINUE);
  cont.set_block1(blk(1, 2, true));
  client.absorb(cont);
  assert_eq!(client.sent_one().block1(), Ok(Some(blk(2, 2, true))));
}

#[test]
fn too_large_restarts_with_smaller_blocks() {
  let mut client = Node::new(Link::udp(), Config::default());
  client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(3000)))
        .unwrap();

  let m0 = client.sent_one();
  assert_eq!(m0.block1(), Ok(Some(blk(0, 6, true))));

  let mut too_large = reply(&m0, code::REQUEST_ENTITY_TOO_LARGE);
  too_large.set_block1(blk(0, 2, false));
  client.absorb(too_large);

  let m1 = client.sent_one();
  assert_eq!(m1.block1(), Ok(Some(blk(0, 2, true))));
  assert_eq!(m1.size1(), Some(3000));
  assert_eq!(m1.payload(), &body(3000)[..64]);
  assert!(client.releases().is_empty());
}

#[test]
fn rejected_upload_hands_the_body_back() {
  let mut client = Node::new(Link::udp(), Config::default());
  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(3000)))
                    .unwrap();

  let m0 = client.sent_one();
  let resp = client.recv(0, reply(&m0, code::FORBIDDEN)).unwrap();

  assert_eq!(resp.code, code::FORBIDDEN);
  assert_eq!(resp.token, token);
  assert_eq!(client.releases(),
             vec![(token, Err((body(3000), Error::Rejected(code::FORBIDDEN))))]);
  assert_eq!(client.events(), vec![Event::XmitBlockFail(token)]);
}

#[test]
fn echo_challenge_repeats_the_block() {
  let mut client = Node::new(Link::udp(), Config::default());
  client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(3000)))
        .unwrap();

  let m0 = client.sent_one();
  let mut challenge = reply(&m0, code::UNAUTHORIZED);
  challenge.set(ECHO, OptValue(vec![9, 9]));
  client.absorb(challenge);

  let m1 = client.sent_one();
  assert_eq!(m1.block1(), m0.block1());
  assert_eq!(m1.payload(), m0.payload());
  assert_eq!(m1.echo(), Some(&OptValue(vec![9, 9])));
  assert_ne!(m1.token, m0.token);
  assert_ne!(m1.id, m0.id);
}

#[test]
fn cancelled_upload_stops() {
  let mut client = Node::new(Link::udp(), Config::default());
  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(3000)))
                    .unwrap();
  client.take_outbox();

  assert!(client.drive(0, |s, _, effs| s.cancel_xmit(effs, token)));
  assert!(!client.drive(0, |s, _, effs| s.cancel_xmit(effs, token)));
  assert_eq!(client.releases(),
             vec![(token, Err((body(3000), Error::Cancelled)))]);
}

#[test]
fn idle_upload_times_out() {
  let mut client = Node::new(Link::udp(), Config::default());
  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(3000)))
                    .unwrap();
  let m0 = client.sent_one();

  let mut cont = reply(&m0, code::CONTINUE);
  cont.set_block1(blk(0, 6, true));
  client.absorb(cont);
  client.take_outbox();

  // the block keeps going unacknowledged past EXCHANGE_LIFETIME
  let lifetime = client.session.config().exchange_lifetime_millis();
  client.drive(lifetime + 1, |s, now, effs| s.poll_timeouts(now, effs));

  let released = client.releases();
  assert_eq!(released.len(), 1);
  assert_eq!(released[0].0, token);
  assert!(released[0].1.is_err());
}

#[test]
fn etag_change_restarts_the_download() {
  let mut client = Node::new(Link::udp(), Config::default());
  let token = client.send(0, get("doc"));
  let m0 = client.sent_one();

  let old = body(192);
  let new = body(192).into_iter().rev().collect::<Vec<u8>>();

  let block = |req: &Message, etag: u8, payload: &[u8], num: u32| {
    let mut resp = reply(req, code::CONTENT);
    resp.set(ETAG, OptValue(vec![etag]));
    resp.set_block2(blk(num, 2, num < 2));
    resp.set_size2(192);
    let start = num as usize * 64;
    resp.payload.0 = payload[start..start + 64].to_vec();
    resp
  };

  client.absorb(block(&m0, 1, &old, 0));
  let m1 = client.sent_one();
  assert_eq!(m1.block2(), Ok(Some(blk(1, 2, false))));
  assert_ne!(m1.token, m0.token);

  // the representation changed under us
  client.absorb(block(&m1, 2, &new, 1));
  let m2 = client.sent_one();
  assert_eq!(m2.block2(), Ok(Some(blk(0, 2, false))));

  client.absorb(block(&m2, 2, &new, 0));
  let m3 = client.sent_one();
  client.absorb(block(&m3, 2, &new, 1));
  let m4 = client.sent_one();
  assert_eq!(m4.block2(), Ok(Some(blk(2, 2, false))));

  let resp = client.recv(0, block(&m4, 2, &new, 2)).unwrap();
  assert_eq!(resp.token, token);
  assert_eq!(resp.payload(), &new[..]);
  assert_eq!(resp.etag(), Some(&OptValue(vec![2])));
}

#[test]
fn blocks_out_of_order_fill_the_gap() {
  let mut client = Node::new(Link::udp(), Config::default());
  let token = client.send(0, get("doc"));
  let m0 = client.sent_one();
  let whole = body(200);

  let block = |req: &Message, num: u32| {
    let mut resp = reply(req, code::CONTENT);
    let start = num as usize * 64;
    let end = (start + 64).min(whole.len());
    resp.set_block2(blk(num, 2, end < whole.len()));
    resp.payload.0 = whole[start..end].to_vec();
    resp
  };

  client.absorb(block(&m0, 0));
  let m1 = client.sent_one();
  assert_eq!(m1.block2(), Ok(Some(blk(1, 2, false))));

  // block 2 arrives first
  client.absorb(block(&m1, 2));
  let m2 = client.sent_one();
  assert_eq!(m2.block2(), Ok(Some(blk(1, 2, false))));

  client.absorb(block(&m2, 1));
  let m3 = client.sent_one();
  assert_eq!(m3.block2(), Ok(Some(blk(3, 2, false))));

  let resp = client.recv(0, block(&m3, 3)).unwrap();
  assert_eq!(resp.token, token);
  assert_eq!(resp.payload(), &whole[..]);
}

#[test]
fn block_wise_notifications() {
  let mut client = Node::new(Link::udp(), Config::default());

  let mut req = get("temp");
  req.set_uint(OBSERVE, 0);
  let token = client.send(0, req);
  let registration = client.sent_one();
  client.absorb(Message::new(Type::Ack, code::EMPTY, registration.id, Token::default()));

  let notification = |seq: u32, id: u16, fill: u8| {
    let mut n = Message::new(Type::Non, code::CONTENT, Id(id), registration.token);
    n.set_uint(OBSERVE, seq);
    n.set(ETAG, OptValue(vec![fill]));
    n.set_block2(blk(0, 2, true));
    n.payload.0 = vec![fill; 64];
    n
  };

  let rest = |req: &Message, fill: u8| {
    let mut resp = reply(req, code::CONTENT);
    resp.set(ETAG, OptValue(vec![fill]));
    resp.set_block2(blk(1, 2, false));
    resp.payload.0 = vec![fill; 36];
    resp
  };

  for (seq, fill) in [(2u32, 0xAAu8), (3, 0xBB)] {
    client.absorb(notification(seq, 100 + seq as u16, fill));

    let follow_up = client.sent_one();
    assert_eq!(follow_up.block2(), Ok(Some(blk(1, 2, false))));
    assert_eq!(follow_up.observe(), None);

    let n = client.recv(0, rest(&follow_up, fill)).unwrap();
    assert_eq!(n.token, token);
    assert_eq!(n.observe(), Some(seq));
    assert_eq!(n.payload(), &vec![fill; 100][..]);
  }

  assert!(client.drive(0, |s, now, effs| s.cancel_observe(now, effs, token)));
  let dereg = client.sent_one();
  assert_eq!(dereg.observe(), Some(1));
  assert_eq!(dereg.token, registration.token);

  let resp = client.recv(0, reply(&dereg, code::CONTENT)).unwrap();
  assert_eq!(resp.token, token);
  assert!(!client.drive(0, |s, now, effs| s.cancel_observe(now, effs, token)));
}

#[test]
fn bert_over_tcp() {
  init_logging();

  let mut config = Config::default();
  config.csm.max_message_size = 8192;

  let mut client = Node::new(Link::tcp(), config);
  let mut server = Node::new(Link::tcp(), config);

  client.drive(0, |s, now, effs| s.on_connected(now, effs));
  server.drive(0, |s, now, effs| s.on_connected(now, effs));
  client.take_outbox()
        .into_iter()
        .for_each(|csm| server.absorb(csm));
  server.take_outbox()
        .into_iter()
        .for_each(|csm| client.absorb(csm));

  assert_eq!(client.session.state(), State::Established);
  assert_eq!(server.session.state(), State::Established);
  assert!(client.session.bert());
  assert_eq!(client.session.max_pdu_size(), 8192);

  let token = client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(10_000)))
                    .unwrap();

  let mut uploaded = None;
  let t = pump(&mut client, &mut server, |server, req| {
            uploaded = Some(req.payload().to_vec());
            changed(server, req);
          });

  let first = &t.to_server[0];
  assert!(first.block1().unwrap().unwrap().is_bert());
  assert!(first.payload().len() > 1024);
  assert_eq!(first.payload().len() % 1024, 0);

  let last = t.to_server.last().unwrap();
  let last_block = last.block1().unwrap().unwrap();
  assert!(last_block.is_bert());
  assert!(!last_block.more());
  assert_eq!(last_block.num() as usize * 1024,
             first.payload().len() * (t.to_server.len() - 1));

  assert!(t.to_client
           .iter()
           .filter(|m| m.code == code::CONTINUE)
           .all(|m| m.block1().unwrap().unwrap().is_bert()));

  assert_eq!(uploaded, Some(body(10_000)));
  assert_eq!(t.delivered.len(), 1);
  assert_eq!(t.delivered[0].token, token);
  assert_eq!(client.releases(), vec![(token, Ok(body(10_000)))]);
}

#[test]
fn no_bert_without_peer_support() {
  let mut client = Node::new(Link::tcp(), Config::default());
  client.drive(0, |s, now, effs| s.on_connected(now, effs));
  client.take_outbox();

  let mut csm = Message::new(Type::Non, code::CSM, Id(0), Token::default());
  csm.set_uint(croak_msg::known::signal::MAX_MESSAGE_SIZE, 4096);
  client.absorb(csm);

  assert!(!client.session.bert());

  client.drive(0, |s, now, effs| s.send_large(now, effs, put("fw"), body(10_000)))
        .unwrap();
  let first = client.sent_one();
  assert_eq!(first.block1(), Ok(Some(blk(0, 6, true))));
}

fn upload_block(id: u16, num: u32, more: bool, len: usize) -> Message {
  let mut req = Message::new(Type::Con, code::PUT, Id(id), Token::from_slice(&[id as u8]));
  req.add(URI_PATH, b"fw"[..].into());
  req.set_block1(blk(num, 2, more));
  let start = num as usize * 64;
  req.payload.0 = body(len)[start..(start + 64).min(len)].to_vec();
  req
}

#[test]
fn server_continues_and_echoes_block1() {
  let mut server = Node::new(Link::udp(), Config::default());

  server.absorb(upload_block(1, 0, true, 150));
  let cont = server.sent_one();
  assert_eq!(cont.code, code::CONTINUE);
  assert_eq!(cont.ty, Type::Ack);
  assert_eq!(cont.id, Id(1));
  assert_eq!(cont.block1(), Ok(Some(blk(0, 2, true))));

  server.absorb(upload_block(2, 1, true, 150));
  server.take_outbox();

  let last = upload_block(3, 2, false, 150);
  let req = server.recv(0, last.clone()).unwrap();
  assert_eq!(req.payload(), &body(150)[..]);
  assert_eq!(req.token, last.token);

  server.send(0, reply(&req, code::CHANGED));
  let done = server.sent_one();
  assert_eq!(done.block1(), Ok(Some(blk(2, 2, false))));
}

#[test]
fn server_final_block_first() {
  let mut server = Node::new(Link::udp(), Config::default());

  // the final block starts the upload and is acknowledged while we wait
  server.absorb(upload_block(1, 2, false, 150));
  let ack = server.sent_one();
  assert_eq!((ack.ty, ack.code, ack.id), (Type::Ack, code::EMPTY, Id(1)));
  assert_eq!(server.session.transfers_in(), 1);

  server.absorb(upload_block(2, 0, true, 150));
  assert_eq!(server.sent_one().code, code::CONTINUE);

  let req = server.recv(0, upload_block(3, 1, true, 150)).unwrap();
  assert_eq!(req.payload(), &body(150)[..]);

  // the final response still echoes the final block
  server.send(0, reply(&req, code::CHANGED));
  assert_eq!(server.sent_one().block1(), Ok(Some(blk(2, 2, false))));
}

#[test]
fn server_final_block_with_a_gap() {
  let mut server = Node::new(Link::udp(), Config::default());
  let non = |id, num, more| {
    let mut req = upload_block(id, num, more, 150);
    req.ty = Type::Non;
    req
  };

  server.absorb(non(1, 0, true));
  assert_eq!(server.sent_one().code, code::CONTINUE);

  server.absorb(non(2, 2, false));
  assert!(server.take_outbox().is_empty());
  assert_eq!(server.session.transfers_in(), 1);

  let req = server.recv(0, non(3, 1, true)).unwrap();
  assert_eq!(req.payload(), &body(150)[..]);
  assert!(server.events().is_empty());
}

#[test]
fn served_block_keeps_the_requested_offset() {
  let mut server = Node::new(Link::udp(), preferring(2));

  // block 2 of 1024 bytes, from a client that has blocks 0 & 1 already
  let mut req = get("doc");
  req.id = Id(9);
  req.set_block2(blk(2, 6, false));
  let req = server.recv(0, req).unwrap();

  let whole = body(3000);
  let resp = reply(&req, code::CONTENT);
  server.drive(0, |s, now, effs| s.respond_large(now, effs, &req, resp, whole.clone()))
        .unwrap();

  let served = server.sent_one();
  assert_eq!(served.block2(), Ok(Some(blk(32, 2, true))));
  assert_eq!(served.payload(), &whole[2048..2112]);
}

#[test]
fn server_refuses_large_bodies() {
  let mut config = Config::default();
  config.block.max_body_size = 1000;
  let mut server = Node::new(Link::udp(), config);

  let mut first = upload_block(1, 0, true, 5000);
  first.set_size1(5000);
  server.absorb(first);

  let refused = server.sent_one();
  assert_eq!(refused.code, code::REQUEST_ENTITY_TOO_LARGE);
  assert_eq!(refused.size1(), Some(1000));
  assert_eq!(server.session.transfers_in(), 0);

  // without Size1, the limit is noticed as blocks arrive
  for n in 0..15 {
    server.absorb(upload_block(10 + n as u16, n, true, 5000));
    assert_eq!(server.sent_one().code, code::CONTINUE);
  }

  server.absorb(upload_block(30, 15, true, 5000));
  assert_eq!(server.sent_one().code, code::REQUEST_ENTITY_TOO_LARGE);
}

#[test]
fn server_content_format_change() {
  let mut server = Node::new(Link::udp(), Config::default());

  let mut b0 = upload_block(1, 0, true, 150);
  b0.set_uint(CONTENT_FORMAT, 0);
  server.absorb(b0);
  server.take_outbox();

  let mut b1 = upload_block(2, 1, true, 150);
  b1.set_uint(CONTENT_FORMAT, 50);
  server.absorb(b1);
  assert_eq!(server.sent_one().code, code::REQUEST_ENTITY_INCOMPLETE);
}

#[test]
fn server_upload_goes_idle() {
  let mut server = Node::new(Link::udp(), Config::default());
  server.absorb(upload_block(1, 0, true, 150));
  server.take_outbox();

  let lifetime = server.session.config().exchange_lifetime_millis();
  server.drive(lifetime, |s, now, effs| s.poll_timeouts(now, effs));

  assert_eq!(server.events(),
             vec![Event::PartialBlock(Token::from_slice(&[1]))]);
  assert_eq!(server.session.transfers_in(), 0);
}

#[test]
fn server_rejects_malformed_block_option() {
  let mut server = Node::new(Link::udp(), Config::default());

  let mut req = Message::new(Type::Con, code::PUT, Id(1), Token::from_slice(&[1]));
  req.set(croak_msg::known::BLOCK1, OptValue(vec![0, 0, 0, 0]));
  server.absorb(req);

  assert_eq!(server.sent_one().code, code::BAD_OPTION);
}
