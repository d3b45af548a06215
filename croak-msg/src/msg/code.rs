use core::fmt;

/// # Message Code
///
/// 8-bit unsigned integer split into a 3-bit class (most
/// significant bits) and a 5-bit detail (least significant bits),
/// documented as "c.dd" where "c" is a digit from 0 to 7 for
/// the 3-bit subfield and "dd" are two digits from 00 to 31 for
/// the 5-bit subfield.
///
/// |class|meaning|
/// |---|---|
/// |`0`|Message is a request (or empty when detail is `0`)|
/// |`2`|Message is a success response|
/// |`4`|Message is a client error response|
/// |`5`|Message is a server error response|
/// |`7`|Message is a signaling message (reliable transports only)|
///
/// See [RFC7252 - Message Details](https://datatracker.ietf.org/doc/html/rfc7252#section-3) for context
///
/// ```
/// use croak_msg::Code;
/// assert_eq!(Code::new(2, 5).to_string(), "2.05".to_string())
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Code {
  /// 3-bit class
  pub class: u8,

  /// 2-digit integer (range `[0, 32)`)
  pub detail: u8,
}

/// Whether a code is for a request, response, signal or empty message
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// 0.00
  Empty,
  /// 0.01 - 0.31
  Request,
  /// 2.xx - 5.xx
  Response,
  /// 7.xx
  Signal,
}

impl Code {
  /// Create a new Code
  ///
  /// ```
  /// use croak_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// Get the human string representation of a message code
  ///
  /// ```
  /// use croak_msg::Code;
  ///
  /// let chars = Code::new(4, 13).to_human();
  /// assert_eq!(String::from_iter(chars), "4.13".to_string());
  /// ```
  pub fn to_human(&self) -> [char; 4] {
    let to_char = |d: u8| char::from_digit(u32::from(d % 10), 10).unwrap_or('?');
    [to_char(self.class), '.', to_char(self.detail / 10), to_char(self.detail % 10)]
  }

  /// Get whether this code is for a request, response, signal or empty message
  ///
  /// ```
  /// use croak_msg::{Code, CodeKind};
  ///
  /// assert_eq!(Code::new(0, 0).kind(), CodeKind::Empty);
  /// assert_eq!(Code::new(0, 1).kind(), CodeKind::Request);
  /// assert_eq!(Code::new(2, 31).kind(), CodeKind::Response);
  /// assert_eq!(Code::new(7, 1).kind(), CodeKind::Signal);
  /// ```
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | (7, _) => CodeKind::Signal,
      | _ => CodeKind::Response,
    }
  }

  /// Is this a 2.xx response code?
  pub fn is_success(&self) -> bool {
    self.class == 2
  }

  /// Is this a 4.xx or 5.xx response code?
  pub fn is_error(&self) -> bool {
    self.class == 4 || self.class == 5
  }
}

impl fmt::Display for Code {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    let class = b >> 5;
    let detail = b & 0b0011111;

    Code { class, detail }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    let class = code.class << 5;
    let detail = code.detail & 0b0011111;

    class | detail
  }
}

macro_rules! code {
  (rfc $rfc:literal; $(#[doc = $docs:expr])* $name:ident = $c:literal * $d:literal) => {
    #[doc = concat!("## ", stringify!($c), ".", stringify!($d))]
    $(#[doc = $docs])*
    #[doc = concat!("\n\nDefined in RFC", $rfc)]
    pub const $name: Code = Code::new($c, $d);
  };
}

/// 0.00
pub const EMPTY: Code = Code::new(0, 0);

code!(rfc 7252; GET = 0 * 01);
code!(rfc 7252; POST = 0 * 02);
code!(rfc 7252; PUT = 0 * 03);
code!(rfc 7252; DELETE = 0 * 04);
code!(rfc 8132; FETCH = 0 * 05);
code!(rfc 8132; PATCH = 0 * 06);
code!(rfc 8132; IPATCH = 0 * 07);

code!(rfc 7252; CREATED = 2 * 01);
code!(rfc 7252; DELETED = 2 * 02);
code!(rfc 7252; VALID = 2 * 03);
code!(rfc 7252; CHANGED = 2 * 04);
code!(rfc 7252; CONTENT = 2 * 05);
code!(rfc 7959;
      /// More blocks of a Block1 upload are expected
      CONTINUE = 2 * 31);

code!(rfc 7252; BAD_REQUEST = 4 * 00);
code!(rfc 7252;
      /// Also used (with an Echo option) to demand
      /// proof of freshness from a client
      UNAUTHORIZED = 4 * 01);
code!(rfc 7252; BAD_OPTION = 4 * 02);
code!(rfc 7252; FORBIDDEN = 4 * 03);
code!(rfc 7252; NOT_FOUND = 4 * 04);
code!(rfc 7252; METHOD_NOT_ALLOWED = 4 * 05);
code!(rfc 7252; NOT_ACCEPTABLE = 4 * 06);
code!(rfc 7959;
      /// Blocks of a Block1 upload are missing
      REQUEST_ENTITY_INCOMPLETE = 4 * 08);
code!(rfc 7252; PRECONDITION_FAILED = 4 * 12);
code!(rfc 7252;
      /// The body is larger than the server is willing to handle,
      /// or the block size used is larger than it is willing to handle.
      REQUEST_ENTITY_TOO_LARGE = 4 * 13);
code!(rfc 7252; UNSUPPORTED_CONTENT_FORMAT = 4 * 15);

code!(rfc 7252; INTERNAL_SERVER_ERROR = 5 * 00);
code!(rfc 7252; NOT_IMPLEMENTED = 5 * 01);
code!(rfc 7252; SERVICE_UNAVAILABLE = 5 * 03);

code!(rfc 8323;
      /// Capabilities and Settings Message
      CSM = 7 * 01);
code!(rfc 8323; PING = 7 * 02);
code!(rfc 8323; PONG = 7 * 03);
code!(rfc 8323; RELEASE = 7 * 04);
code!(rfc 8323; ABORT = 7 * 05);
