//! Bitmasks exchanged during option negotiation.
//!
//! The masks are sent to the MTA unchanged and are not consulted again for
//! the rest of the session.

use bitflags::bitflags;

bitflags! {
    /// Modifications the filter may request at the end of a message
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Actions: u32 {
        /// Add headers
        const ADD_HEADER = 0x01;
        /// Replace the message body
        const CHANGE_BODY = 0x02;
        /// Add envelope recipients
        const ADD_RCPT = 0x04;
        /// Remove envelope recipients
        const DELETE_RCPT = 0x08;
        /// Change or delete headers
        const CHANGE_HEADER = 0x10;
        /// Quarantine the message
        const QUARANTINE = 0x20;
    }
}

bitflags! {
    /// Protocol stages the MTA does not need to send
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Protocol: u32 {
        /// Skip connection information
        const NO_CONNECT = 0x01;
        /// Skip HELO
        const NO_HELO = 0x02;
        /// Skip MAIL FROM
        const NO_MAIL = 0x04;
        /// Skip RCPT TO
        const NO_RCPT = 0x08;
        /// Skip the body
        const NO_BODY = 0x10;
        /// Skip individual headers
        const NO_HEADERS = 0x20;
        /// Skip end of headers
        const NO_EOH = 0x40;
    }
}
