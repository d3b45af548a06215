//! Low-level representation of CoAP messages.
//!
//! The most notable item in `croak_msg` is [`Message`]:
//! a CoAP message very close to the actual byte layout.
//!
//! Messages can be read from and written to both of the
//! framings CoAP is carried in:
//!  - [`Framing::Datagram`] ([RFC7252](https://datatracker.ietf.org/doc/html/rfc7252#section-3)) for UDP & DTLS
//!  - [`Framing::Stream`] ([RFC8323](https://datatracker.ietf.org/doc/html/rfc8323#section-3.2)) for TCP, TLS & WebSockets
//!
//! ```
//! use croak_msg::{Framing, Message, TryFromBytes, TryIntoBytes};
//!
//! let packet: Vec<u8> = vec![0x41, 0x01, 0x00, 0x01, 0xfe, 0xb1, b'a'];
//! let msg = Message::try_from_bytes(Framing::Datagram, &packet).unwrap();
//!
//! assert_eq!(msg.try_into_bytes(Framing::Datagram).unwrap(), packet);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), deny(missing_debug_implementations, unsafe_code))]
#![warn(missing_docs, unreachable_pub)]

extern crate alloc as std_alloc;

mod cursor;

/// Parsing messages from bytes
pub mod from_bytes;

/// Writing messages to bytes
pub mod to_bytes;

/// Hashing requests for use as keys in caches & transfer state
pub mod cache_key;

/// Message structs
pub mod msg;

#[doc(inline)]
pub use cache_key::*;
#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::{Framing, MessageToBytesError, TryIntoBytes};
