use crate::cmd::{Address, Command, Family, Offer};
use crate::err::{Error, Result};
use crate::packet::Packet;
use nom::{
    bytes::complete::{tag, take_until},
    combinator::{all_consuming, map, map_opt, opt},
    multi::{many0, many1},
    number::complete::{be_u16, be_u32, be_u8},
    sequence::{pair, terminated, tuple},
    IResult,
};

const NUL: &[u8] = b"\0";

//----- Parser -----------------------------------------------------------------

// Decode the command carried by a packet
pub(crate) fn parse(packet: &Packet) -> Result<Command<'_>> {
    let code = packet.code;
    let buf = &packet.payload[..];
    let cmd = match code {
        b'A' => Command::Abort,
        b'B' => Command::BodyChunk(buf),
        b'C' => finish(code, connect(buf))?,
        b'D' => finish(code, macros(buf))?,
        b'E' => Command::EndOfBody,
        b'H' => Command::Helo {
            name: lossy(buf.strip_suffix(NUL).unwrap_or(buf)),
        },
        b'L' => finish(code, header(buf))?,
        b'M' => {
            let (address, args) = finish(code, envelope(buf))?;
            Command::MailFrom { address, args }
        }
        b'N' => Command::EndOfHeaders,
        b'O' => finish(code, negotiate(buf))?,
        b'Q' => Command::Quit,
        b'R' => {
            let (address, args) = finish(code, envelope(buf))?;
            Command::RcptTo { address, args }
        }
        b'T' => Command::Data,
        unknown => Command::Unknown(unknown),
    };
    Ok(cmd)
}

// Convert a nom result into a malformed command error
fn finish<T>(code: u8, res: IResult<&[u8], T>) -> Result<T> {
    res.map(|r| r.1).map_err(|e| match e {
        nom::Err::Incomplete(_) => Error::malformed(code, "incomplete"),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            Error::malformed(code, format!("{:?} with {} bytes left", e.code, e.input.len()))
        }
    })
}

// connect = hostname NUL family [port address NUL]
fn connect(buf: &[u8]) -> IResult<&[u8], Command<'_>> {
    let (buf, hostname) = cstring(buf)?;
    let (buf, family) = family(buf)?;
    let (buf, port, address) = match family {
        // Nothing useful follows an unknown family
        Family::Unknown => (&buf[buf.len()..], None, String::new()),
        _ => {
            let (buf, (port, address)) = all_consuming(pair(be_u16, cstring))(buf)?;
            (buf, Some(port), address)
        }
    };
    let address = Address {
        hostname,
        family,
        port,
        address,
    };
    Ok((buf, Command::Connect(address)))
}

// macros = stage *(name NUL value NUL)
fn macros(buf: &[u8]) -> IResult<&[u8], Command<'_>> {
    let parser = pair(be_u8, all_consuming(many0(cstring)));
    map(parser, |(stage, tokens)| Command::Macros { stage, tokens })(buf)
}

// header = name NUL value NUL
fn header(buf: &[u8]) -> IResult<&[u8], Command<'_>> {
    let parser = all_consuming(pair(cstring, cstring));
    map(parser, |(name, value)| Command::Header { name, value })(buf)
}

// envelope = address NUL *(esmtp-arg NUL)
fn envelope(buf: &[u8]) -> IResult<&[u8], (String, Vec<String>)> {
    let parser = all_consuming(many1(cstring));
    map(parser, |mut tokens| {
        let args = tokens.split_off(1);
        let address = trim_brackets(&tokens[0]);
        (address, args)
    })(buf)
}

// negotiate = [version actions protocol]
fn negotiate(buf: &[u8]) -> IResult<&[u8], Command<'_>> {
    let offer = map(tuple((be_u32, be_u32, be_u32)), |(version, actions, protocol)| Offer {
        version,
        actions,
        protocol,
    });
    map(opt(offer), Command::Negotiate)(buf)
}

//---- Helper functions ---------------------------------------------------------

fn family(buf: &[u8]) -> IResult<&[u8], Family> {
    map_opt(be_u8, Family::from_byte)(buf)
}

// A single NUL terminated string
fn cstring(buf: &[u8]) -> IResult<&[u8], String> {
    map(terminated(take_until(NUL), tag(NUL)), lossy)(buf)
}

fn lossy(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

fn trim_brackets(path: &str) -> String {
    path.trim_matches(|c| c == '<' || c == '>').to_owned()
}
