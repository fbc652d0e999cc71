use crate::cmd::Command;
use crate::err::Result;
use crate::flags::{Actions, Protocol};
use crate::headers::Headers;
use crate::modifier::Modifier;
use crate::observer::{LogObserver, Observer};
use crate::packet::{Packet, DEFAULT_MAX_PACKET_SIZE};
use crate::parser::parse;
use crate::response::{Response, CONTINUE};
use crate::Milter;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io::{Read, Write};

// Borrow the session fields a filter may see, leaving the milter free to call
macro_rules! modifier {
    ($session:ident) => {
        &mut Modifier::new(
            $session.actions,
            &$session.macros,
            &$session.headers,
            &mut $session.stream,
        )
    };
}

/// Builds a milter `Session`
///
/// # Examples
/// ```
/// # use milter::{Actions, Milter, Protocol, SessionBuilder};
/// # use std::io::Cursor;
/// # struct EmptyMilter {}
/// # impl Milter for EmptyMilter {}
/// # let stream = Cursor::new(Vec::new());
/// // Create a session builder that holds the negotiated options
/// let mut builder = SessionBuilder::new(Actions::ADD_HEADER, Protocol::NO_HELO);
/// builder.max_packet_size(64 * 1024);
/// // Then when an MTA connects
/// let session = builder.build(stream, EmptyMilter {});
/// session.run();
/// ```
#[derive(Clone, Debug)]
pub struct SessionBuilder {
    actions: Actions,
    protocol: Protocol,
    max_packet_size: usize,
}

impl SessionBuilder {
    /// Create a builder for sessions that negotiate the given options
    pub fn new(actions: Actions, protocol: Protocol) -> Self {
        Self {
            actions,
            protocol,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Set the largest packet a session accepts
    pub fn max_packet_size(&mut self, size: usize) -> &mut Self {
        self.max_packet_size = size;
        self
    }

    /// Build a session that logs through the `log` crate
    pub fn build<S, M>(&self, stream: S, milter: M) -> Session<S, M>
    where
        S: Read + Write,
        M: Milter,
    {
        self.build_with_observer(stream, milter, LogObserver)
    }

    /// Build a session that reports to the given observer
    pub fn build_with_observer<S, M, O>(&self, stream: S, milter: M, observer: O) -> Session<S, M, O>
    where
        S: Read + Write,
        M: Milter,
        O: Observer,
    {
        Session {
            actions: self.actions,
            protocol: self.protocol,
            max_packet_size: self.max_packet_size,
            stream,
            headers: Headers::new(),
            macros: HashMap::new(),
            body: Vec::new(),
            milter,
            observer,
        }
    }
}

/// Action indicates what to do after processing a packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Do not reply, wait for the next packet
    NoReply,
    /// Send the response, then carry on if the response allows it
    Reply(Response),
    /// Close the session without replying
    Close,
}

/// A single milter session connected to a single MTA connection
///
/// The session owns the stream, the filter and the state of the message
/// being filtered. Nothing is shared between sessions.
pub struct Session<S, M, O = LogObserver> {
    actions: Actions,
    protocol: Protocol,
    pub(crate) max_packet_size: usize,
    pub(crate) stream: S,
    headers: Headers,
    macros: HashMap<String, String>,
    body: Vec<u8>,
    milter: M,
    pub(crate) observer: O,
}

impl<S, M, O> Session<S, M, O>
where
    S: Read + Write,
    M: Milter,
    O: Observer,
{
    /// Process a packet sent by the MTA.
    ///
    /// Returns the action to take. Errors are fatal to the session.
    pub fn process(&mut self, packet: &Packet) -> Result<Action> {
        let cmd = parse(packet)?;
        trace!("> {:?}", cmd);
        self.command(cmd)
    }

    fn command(&mut self, cmd: Command) -> Result<Action> {
        let res = match cmd {
            Command::Abort => {
                self.abort();
                return Ok(Action::NoReply);
            }
            Command::BodyChunk(chunk) => {
                self.body.extend_from_slice(chunk);
                self.milter.body_chunk(chunk, modifier!(self))
            }
            Command::Connect(address) => {
                let formatted = address.to_string();
                self.milter.connect(
                    &address.hostname,
                    address.family,
                    &formatted,
                    modifier!(self),
                )
            }
            Command::Macros { stage, tokens } => {
                self.define_macros(stage, tokens);
                return Ok(Action::NoReply);
            }
            Command::EndOfBody => {
                let res = self.milter.body(&self.body, modifier!(self));
                self.end_message();
                res
            }
            Command::Helo { name } => self.milter.helo(&name, modifier!(self)),
            Command::Header { name, value } => {
                self.headers.add(name.as_str(), value.as_str());
                self.milter.header(&name, &value, modifier!(self))
            }
            Command::MailFrom { address, args } => {
                if !args.is_empty() {
                    trace!("MAIL FROM arguments {:?}", args);
                }
                self.milter.mail_from(&address, modifier!(self))
            }
            Command::EndOfHeaders => self.milter.headers(&self.headers, modifier!(self)),
            Command::Negotiate(offer) => {
                if let Some(offer) = offer {
                    debug!(
                        "MTA offers version {} actions {:#x} protocol {:#x}",
                        offer.version, offer.actions, offer.protocol
                    );
                }
                Ok(Response::negotiate(self.actions, self.protocol))
            }
            Command::Quit => return Ok(Action::Close),
            Command::RcptTo { address, args } => {
                if !args.is_empty() {
                    trace!("RCPT TO arguments {:?}", args);
                }
                self.milter.rcpt_to(&address, modifier!(self))
            }
            Command::Data => Ok(CONTINUE),
            Command::Unknown(code) => {
                self.observer.unknown_command(code);
                return Ok(Action::Close);
            }
        };
        res.map(Action::Reply)
    }

    // Macros from the latest definition replace any earlier ones
    fn define_macros(&mut self, stage: u8, tokens: Vec<String>) {
        let mut macros = HashMap::with_capacity(tokens.len() / 2);
        let mut tokens = tokens.into_iter();
        while let Some(name) = tokens.next() {
            match tokens.next() {
                Some(value) => {
                    macros.insert(name, value);
                }
                None => warn!(
                    "Macro {} for stage {} has no value",
                    name,
                    char::from(stage).escape_debug()
                ),
            }
        }
        self.macros = macros;
    }

    // Forget everything about the current message
    fn abort(&mut self) {
        self.headers.clear();
        self.body.clear();
        self.macros.clear();
    }

    // The message has been filtered, start afresh for the next one
    fn end_message(&mut self) {
        self.headers.clear();
        self.body.clear();
    }

    /// Headers of the current message
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Macros from the latest macro definition
    pub fn macros(&self) -> &HashMap<String, String> {
        &self.macros
    }

    /// Body received so far for the current message
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The negotiated actions
    pub fn actions(&self) -> Actions {
        self.actions
    }

    /// The negotiated protocol options
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The filter driven by this session
    pub fn milter(&self) -> &M {
        &self.milter
    }
}
