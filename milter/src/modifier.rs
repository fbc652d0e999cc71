use crate::err::{Error, Result};
use crate::flags::Actions;
use crate::headers::Headers;
use crate::packet::write_packet;
use log::trace;
use std::collections::HashMap;
use std::io::Write;

/// Largest body chunk sent in a single replace body packet
pub const MAX_BODY_CHUNK: usize = 65535;

/// `Modifier` gives a filter access to the current session.
///
/// A modifier is passed to every `Milter` callback. It exposes the macros and
/// headers received so far and sends modification requests to the MTA.
///
/// Modifications for actions that were not negotiated are refused with
/// `Error::NotNegotiated`. The MTA only accepts modifications while it waits
/// for the reply to the end of body command: a modification sent from any
/// other callback is a protocol violation and the MTA will drop the session.
pub struct Modifier<'a> {
    actions: Actions,
    macros: &'a HashMap<String, String>,
    headers: &'a Headers,
    writer: &'a mut dyn Write,
}

impl<'a> Modifier<'a> {
    pub(crate) fn new(
        actions: Actions,
        macros: &'a HashMap<String, String>,
        headers: &'a Headers,
        writer: &'a mut dyn Write,
    ) -> Self {
        Self {
            actions,
            macros,
            headers,
            writer,
        }
    }

    /// Macros defined by the most recent macro command
    pub fn macros(&self) -> &HashMap<String, String> {
        self.macros
    }

    /// Look up a macro by name.
    ///
    /// Long macro names can be given with or without braces, `{auth_type}`
    /// and `auth_type` find the same value.
    pub fn macro_value(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.macros.get(name) {
            return Some(v);
        }
        let alternative = match name.strip_prefix('{').and_then(|n| n.strip_suffix('}')) {
            Some(bare) => bare.to_owned(),
            None => format!("{{{}}}", name),
        };
        self.macros.get(&alternative).map(|v| v.as_str())
    }

    /// Headers received in the current message
    pub fn headers(&self) -> &Headers {
        self.headers
    }

    /// Add a header at the end of the message headers
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.require(Actions::ADD_HEADER)?;
        self.send(b'h', &cstrings(&[name, value]))
    }

    /// Insert a header at the given position
    pub fn insert_header(&mut self, index: u32, name: &str, value: &str) -> Result<()> {
        self.require(Actions::ADD_HEADER)?;
        self.send(b'i', &indexed(index, name, value))
    }

    /// Change the nth occurrence, counting from 1, of the named header.
    ///
    /// An empty value deletes the header.
    pub fn change_header(&mut self, index: u32, name: &str, value: &str) -> Result<()> {
        self.require(Actions::CHANGE_HEADER)?;
        self.send(b'm', &indexed(index, name, value))
    }

    /// Add an envelope recipient
    pub fn add_recipient(&mut self, rcpt: &str) -> Result<()> {
        self.require(Actions::ADD_RCPT)?;
        self.send(b'+', &cstrings(&[bracketed(rcpt).as_str()]))
    }

    /// Remove an envelope recipient
    pub fn delete_recipient(&mut self, rcpt: &str) -> Result<()> {
        self.require(Actions::DELETE_RCPT)?;
        self.send(b'-', &cstrings(&[bracketed(rcpt).as_str()]))
    }

    /// Replace the message body
    pub fn replace_body(&mut self, body: &[u8]) -> Result<()> {
        self.require(Actions::CHANGE_BODY)?;
        if body.is_empty() {
            return self.send(b'b', body);
        }
        for chunk in body.chunks(MAX_BODY_CHUNK) {
            self.send(b'b', chunk)?;
        }
        Ok(())
    }

    /// Quarantine the message for the given reason
    pub fn quarantine(&mut self, reason: &str) -> Result<()> {
        self.require(Actions::QUARANTINE)?;
        self.send(b'q', &cstrings(&[reason]))
    }

    /// Tell the MTA that the filter is still working
    pub fn progress(&mut self) -> Result<()> {
        self.send(b'p', &[])
    }

    /// The actions negotiated with the MTA
    pub fn actions(&self) -> Actions {
        self.actions
    }

    fn require(&self, action: Actions) -> Result<()> {
        if self.actions.contains(action) {
            Ok(())
        } else {
            Err(Error::NotNegotiated(action))
        }
    }

    fn send(&mut self, code: u8, payload: &[u8]) -> Result<()> {
        trace!(
            "< {} {}",
            char::from(code),
            String::from_utf8_lossy(payload).escape_debug()
        );
        write_packet(&mut *self.writer, code, payload)
    }
}

// Join strings, terminating each with a NUL
fn cstrings(parts: &[&str]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for part in parts {
        buf.extend_from_slice(part.as_bytes());
        buf.push(0);
    }
    buf
}

fn indexed(index: u32, name: &str, value: &str) -> Vec<u8> {
    let mut buf = index.to_be_bytes().to_vec();
    buf.extend(cstrings(&[name, value]));
    buf
}

fn bracketed(rcpt: &str) -> String {
    if rcpt.starts_with('<') && rcpt.ends_with('>') {
        rcpt.to_owned()
    } else {
        format!("<{}>", rcpt)
    }
}
