use std::fmt;

// Milter commands sent by the MTA
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command<'a> {
    Abort,
    BodyChunk(&'a [u8]),
    Connect(Address),
    Macros {
        stage: u8,
        tokens: Vec<String>,
    },
    EndOfBody,
    Helo {
        name: String,
    },
    Header {
        name: String,
        value: String,
    },
    MailFrom {
        address: String,
        args: Vec<String>,
    },
    EndOfHeaders,
    Negotiate(Option<Offer>),
    Quit,
    RcptTo {
        address: String,
        args: Vec<String>,
    },
    Data,
    Unknown(u8),
}

// Capabilities offered by the MTA during option negotiation
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Offer {
    pub version: u32,
    pub actions: u32,
    pub protocol: u32,
}

/// Protocol family of a connecting client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// The MTA could not determine the family
    Unknown,
    /// Unix domain socket
    Unix,
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
}

impl Family {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'U' => Some(Family::Unknown),
            b'L' => Some(Family::Unix),
            b'4' => Some(Family::Inet),
            b'6' => Some(Family::Inet6),
            _ => None,
        }
    }

    /// Network name of the family: unknown, unix, tcp4 or tcp6
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Unknown => "unknown",
            Family::Unix => "unix",
            Family::Inet => "tcp4",
            Family::Inet6 => "tcp6",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client address decoded from a connect command
///
/// Displays as the address alone for unknown and unix families, as
/// `addr:port` for IPv4 and `[addr]:port` for IPv6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    /// Hostname of the client as resolved by the MTA
    pub hostname: String,
    /// Address family
    pub family: Family,
    /// Port, absent for the unknown family
    pub port: Option<u16>,
    /// Address without the port
    pub address: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.family, self.port) {
            (Family::Inet, Some(port)) => write!(f, "{}:{}", self.address, port),
            (Family::Inet6, Some(port)) => write!(f, "[{}]:{}", self.address, port),
            _ => f.write_str(&self.address),
        }
    }
}
