use crate::err::Result;
use crate::flags::{Actions, Protocol};
use crate::packet::{write_packet, Packet};
use log::trace;
use std::io::Write;

/// Protocol version sent during option negotiation
pub const PROTOCOL_VERSION: u32 = 2;

//------ Responses -------------------------------------------------------------

/// Accept the message, the MTA stops calling the filter
pub const ACCEPT: Response = Response::constant(b'a');
/// Continue to the next stage
pub const CONTINUE: Response = Response::constant(b'c');
/// Accept the message and silently discard it
pub const DISCARD: Response = Response::constant(b'd');
/// Reject the command or message
pub const REJECT: Response = Response::constant(b'r');
/// Reject with a temporary failure
pub const TEMPFAIL: Response = Response::constant(b't');

//------ Types -----------------------------------------------------------------

/// Response contains a reply code and data to be sent back to the MTA
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// The single byte reply code
    pub code: u8,
    /// Data sent after the code
    pub data: Vec<u8>,
}

impl Response {
    // A response without data that can be used in const definitions
    pub(crate) const fn constant(code: u8) -> Self {
        Self {
            code,
            data: Vec::new(),
        }
    }

    /// A response with any code and data
    pub fn new<D: Into<Vec<u8>>>(code: u8, data: D) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    /// A custom SMTP reply sent in place of the MTA's default text.
    ///
    /// The reply is sent as `<code> <text>` followed by a NUL.
    ///
    /// # Examples
    /// ```
    /// use milter::Response;
    ///
    /// let res = Response::reply_code(550, "5.7.1 Go away");
    /// assert_eq!(res.code, b'y');
    /// assert_eq!(&res.data, b"550 5.7.1 Go away\0");
    /// ```
    pub fn reply_code(smtp_code: u16, text: &str) -> Self {
        let mut data = format!("{} {}", smtp_code, text).into_bytes();
        data.push(0);
        Self::new(b'y', data)
    }

    /// The reply to an option negotiation: the protocol version followed by
    /// the actions and protocol masks, each a big endian `u32`.
    pub fn negotiate(actions: Actions, protocol: Protocol) -> Self {
        let data = [PROTOCOL_VERSION, actions.bits(), protocol.bits()]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect::<Vec<u8>>();
        Self::new(b'O', data)
    }

    /// Should the session keep processing commands after this response?
    ///
    /// Accept, discard, reject and tempfail end the session.
    pub fn continues(&self) -> bool {
        !matches!(self.code, b'a' | b'd' | b'r' | b't')
    }

    /// Write the response to the given writer as a packet
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        write_packet(out, self.code, &self.data)
    }

    /// Convert the response into a packet
    pub fn into_packet(self) -> Packet {
        Packet::new(self.code, self.data)
    }

    // Log the response
    pub(crate) fn log(&self) {
        trace!(
            "< {} {}",
            char::from(self.code),
            String::from_utf8_lossy(&self.data).escape_debug()
        );
    }
}
