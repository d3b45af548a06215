use core::fmt::Write;

use croak_msg::Message;
use std_alloc::string::String;

/// Push an [`Effect::Log`](crate::platform::Effect::Log) onto an effects vec,
/// prefixed with the component that emitted it.
///
/// `log!(Session::recv, effects, log::Level::Debug, "got {}", thing)`
macro_rules! log {
  ($at:path, $effs:expr, $lvl:expr, $($arg:tt)*) => {{
    let msg = ::std_alloc::format!("[{}] {}", ::core::stringify!($at), ::std_alloc::format!($($arg)*));
    $effs.push($crate::platform::Effect::Log($lvl, msg));
  }};
}

pub(crate) use log;

/// One-line summary of a message for log lines
pub(crate) fn msg_summary(msg: &Message) -> String {
  let mut buf = String::new();
  write!(buf,
         "{:?} {} id={} token={:02x?} with {} byte payload",
         msg.ty,
         msg.code,
         msg.id.0,
         msg.token.as_bytes(),
         msg.payload().len()).ok();
  buf
}
