//! A library for building milter mail filters.
//!
//! The library supplies the milter packet codec, command decoding and the
//! per connection session. The user of the library supplies I/O code and a
//! `Milter` implementation that makes decisions about each message.
//!
//! Packets read from the MTA are given to `Session.process()`. After
//! consulting the `Milter` the session returns an action that says whether a
//! response should be written back to the MTA and whether the connection
//! should stay open. `Session.run()` does all of this in a loop.
//!
//! # Pseudo Code
//! ```rust,ignore
//! // Create a milter which will filter messages
//! let milter = create_milter();
//!
//! // Create a milter session when an MTA connects
//! let mut session = SessionBuilder::new(actions, protocol).build(stream, milter);
//!
//! // Read a packet from the MTA
//! let packet = Packet::read_from(&mut stream, DEFAULT_MAX_PACKET_SIZE)?;
//! // Send the packet to the session
//! match session.process(&packet)? {
//!     Action::Reply(res) => {
//!         res.write_to(&mut stream)?;
//!         if !res.continues() {
//!             close(stream);
//!         }
//!     }
//!     Action::Close => close(stream),
//!     Action::NoReply => (), // No response needed
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cmd;
mod connection;
mod err;
mod flags;
mod headers;
mod modifier;
mod observer;
mod packet;
mod parser;
mod response;
mod session;

pub use crate::cmd::{Address, Family};
pub use crate::err::{Error, Result};
pub use crate::flags::{Actions, Protocol};
pub use crate::headers::Headers;
pub use crate::modifier::{Modifier, MAX_BODY_CHUNK};
pub use crate::observer::{LogObserver, Observer};
pub use crate::packet::{Packet, DEFAULT_MAX_PACKET_SIZE};
pub use crate::response::{
    Response, ACCEPT, CONTINUE, DISCARD, PROTOCOL_VERSION, REJECT, TEMPFAIL,
};
pub use crate::session::{Action, Session, SessionBuilder};

/// A `Milter` makes decisions about incoming mail.
///
/// A Milter implementation must be provided by code using the milter library.
///
/// Each method is called for one stage of the milter protocol and returns the
/// response for that stage. All methods have a default implementation that
/// continues to the next stage. A separate milter instance is used for each
/// connection.
///
/// # Examples
/// ```
/// # use milter::{Milter, Modifier, Response, Result, CONTINUE, REJECT};
/// # struct MyMilter {}
/// impl Milter for MyMilter {
///     fn helo(&mut self, name: &str, _m: &mut Modifier) -> Result<Response> {
///         if name == "this.is.spam.com" {
///             Ok(REJECT)
///         } else {
///             Ok(CONTINUE)
///         }
///     }
///
///     fn body(&mut self, _body: &[u8], m: &mut Modifier) -> Result<Response> {
///         m.add_header("X-Filtered", "yes")?;
///         Ok(CONTINUE)
///     }
/// }
/// ```
pub trait Milter {
    /// Called when a client connects to the MTA
    fn connect(
        &mut self,
        _hostname: &str,
        _family: Family,
        _address: &str,
        _m: &mut Modifier,
    ) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called when the client sends HELO or EHLO
    fn helo(&mut self, _name: &str, _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called with the envelope sender, without angle brackets
    fn mail_from(&mut self, _from: &str, _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called with each envelope recipient, without angle brackets
    fn rcpt_to(&mut self, _rcpt: &str, _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called for each message header
    fn header(&mut self, _name: &str, _value: &str, _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called after the last header with every header of the message
    fn headers(&mut self, _headers: &Headers, _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called for each chunk of the message body
    fn body_chunk(&mut self, _chunk: &[u8], _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }

    /// Called at the end of the message with the complete body.
    ///
    /// This is the only stage where the modifier may change the message.
    fn body(&mut self, _body: &[u8], _m: &mut Modifier) -> Result<Response> {
        Ok(CONTINUE)
    }
}
