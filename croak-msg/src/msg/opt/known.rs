use super::OptNumber;

macro_rules! opt {
  (rfc $rfc:literal; $(#[doc = $docs:expr])* $name:ident = $n:literal) => {
    $(#[doc = $docs])*
    #[doc = concat!("\n\nOption number ", $n, ", defined in RFC", $rfc)]
    pub const $name: OptNumber = OptNumber($n);
  };
}

opt!(rfc 7252; IF_MATCH = 1);
opt!(rfc 7252; URI_HOST = 3);
opt!(rfc 7252;
     /// Opaque representation tag; an entity-tag in a response
     /// identifies the representation it carries
     ETAG = 4);
opt!(rfc 7252; IF_NONE_MATCH = 5);
opt!(rfc 7641;
     /// Register or deregister interest in a resource, or
     /// (in a notification) its sequence number
     OBSERVE = 6);
opt!(rfc 7252; URI_PORT = 7);
opt!(rfc 7252; LOCATION_PATH = 8);
opt!(rfc 8613; OSCORE = 9);
opt!(rfc 7252; URI_PATH = 11);
opt!(rfc 7252; CONTENT_FORMAT = 12);
opt!(rfc 7252; MAX_AGE = 14);
opt!(rfc 7252; URI_QUERY = 15);
opt!(rfc 8768; HOP_LIMIT = 16);
opt!(rfc 7252; ACCEPT = 17);
opt!(rfc 7252; LOCATION_QUERY = 20);
opt!(rfc 7959;
     /// Block of a response body
     BLOCK2 = 23);
opt!(rfc 7959;
     /// Block of a request body
     BLOCK1 = 27);
opt!(rfc 7959;
     /// Total size of a response body
     SIZE2 = 28);
opt!(rfc 7252; PROXY_URI = 35);
opt!(rfc 7252; PROXY_SCHEME = 39);
opt!(rfc 7959;
     /// Total size of a request body
     SIZE1 = 60);
opt!(rfc 9175;
     /// Opaque value used by a server to verify request freshness
     ECHO = 252);
opt!(rfc 7967; NO_RESPONSE = 258);
opt!(rfc 9175;
     /// Distinguishes concurrent block-wise request operations
     /// on a single resource
     REQUEST_TAG = 292);

/// Options carried by signaling (7.xx) messages.
///
/// Option numbers of signaling messages are only meaningful
/// in the context of the signal's code.
pub mod signal {
  use super::OptNumber;

  opt!(rfc 8323;
       /// (in 7.01 CSM) largest message the sender can receive
       MAX_MESSAGE_SIZE = 2);
  opt!(rfc 8323;
       /// (in 7.01 CSM) the sender supports block-wise transfers, including BERT
       BLOCK_WISE_TRANSFER = 4);
  opt!(rfc 8323;
       /// (in 7.02 Ping & 7.03 Pong) request / confirm that all previous messages were processed
       CUSTODY = 2);
  opt!(rfc 8323;
       /// (in 7.04 Release) where the peer may reconnect
       ALTERNATIVE_ADDRESS = 2);
  opt!(rfc 8323;
       /// (in 7.04 Release) seconds the peer should wait before reconnecting
       HOLD_OFF = 4);
  opt!(rfc 8323;
       /// (in 7.05 Abort) the CSM option that could not be processed
       BAD_CSM_OPTION = 2);
}
