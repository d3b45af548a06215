//! `croak` is a sans-IO CoAP engine for moving bodies of any size
//! between two endpoints, reliably.
//!
//! ## Block-wise transfers
//! A CoAP message has to fit in a single datagram (or, over TCP, in
//! whatever the peer is willing to buffer). Bodies larger than that are
//! split into blocks using the
//! [Block1 & Block2 options](https://datatracker.ietf.org/doc/html/rfc7959),
//! or over reliable transports into
//! [BERT blocks](https://datatracker.ietf.org/doc/html/rfc8323#section-6)
//! of several kilobytes.
//!
//! `croak` does this for you:
//! - [`Session::send_large`](session::Session::send_large) uploads a request body
//! - [`Session::respond_large`](session::Session::respond_large) serves a response body
//! - [`Session::recv`](session::Session::recv) reassembles bodies sent to you
//!   (in any order, tolerating loss & size changes) and only hands you whole messages
//!
//! ## Reliability
//! Over UDP, CONfirmable messages are retransmitted with exponential backoff
//! until acknowledged, duplicate messages are detected and answered with
//! the reply we already sent, and at most
//! [`nstart`](config::Msg::nstart) exchanges are in flight at once.
//!
//! ## Sans-IO
//! A [`Session`](session::Session) never reads a clock or touches a socket.
//! Every operation accepts the current time and a list of
//! [`Effect`](platform::Effect)s to append to: messages to send, log lines,
//! events, and bodies being handed back to you. This keeps the engine
//! deterministic & easy to test.
//!
//! [`Endpoint`](endpoint::Endpoint) wraps a session, a [`Transport`](net::Transport)
//! and a clock, and carries out the effects for you.

// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]
// -
// features
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc as std_alloc;

#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod test;

pub(crate) mod logging;

/// customizable retrying of fallible operations
pub mod retry;

/// time abstractions
pub mod time;

/// runtime config
pub mod config;

/// network abstractions
pub mod net;

/// effects, events & other things the host deals with
pub mod platform;

/// errors
pub mod error;

/// block-wise transfer building blocks
pub mod block;

/// # The per-peer protocol engine
///
/// See [`Session`](session::Session).
pub mod session;

/// A session driven over a transport
pub mod endpoint;

pub use error::Error;

#[doc(inline)]
pub use croak_msg as msg;
