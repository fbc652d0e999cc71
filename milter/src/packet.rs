use crate::err::{Error, Result};
use std::io::{self, ErrorKind, Read, Write};

/// Largest packet accepted by a session unless configured otherwise
pub const DEFAULT_MAX_PACKET_SIZE: usize = 512 * 1024;

// Length prefix in bytes
const LENGTH_SIZE: usize = 4;

/// A single length framed milter packet
///
/// On the wire a packet is a big endian `u32` length, covering the command
/// code and the payload, followed by the code byte and the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Command or response code
    pub code: u8,
    /// Data following the code
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet with the given code and payload
    pub fn new<P: Into<Vec<u8>>>(code: u8, payload: P) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Read the next packet from the reader.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before a packet starts.
    /// A declared length larger than `max_len` is rejected before any
    /// payload is buffered.
    pub fn read_from<R>(reader: &mut R, max_len: usize) -> Result<Option<Self>>
    where
        R: Read + ?Sized,
    {
        let mut prefix = [0u8; LENGTH_SIZE];
        match fill(reader, &mut prefix)? {
            0 => return Ok(None),
            LENGTH_SIZE => (),
            read => {
                return Err(Error::Truncated {
                    expected: LENGTH_SIZE,
                    read,
                })
            }
        }
        let length = u32::from_be_bytes(prefix) as usize;
        if length == 0 {
            return Err(Error::EmptyPacket);
        }
        if length > max_len {
            return Err(Error::TooLarge {
                length,
                max: max_len,
            });
        }
        let mut data = vec![0u8; length];
        let read = fill(reader, &mut data)?;
        if read < length {
            return Err(Error::Truncated {
                expected: length,
                read,
            });
        }
        let payload = data.split_off(1);
        Ok(Some(Self {
            code: data[0],
            payload,
        }))
    }

    /// Write the packet and flush the writer
    pub fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        write_packet(writer, self.code, &self.payload)
    }
}

// Frame a packet in one buffer so that a packet is written with a single call
pub(crate) fn write_packet<W>(writer: &mut W, code: u8, payload: &[u8]) -> Result<()>
where
    W: Write + ?Sized,
{
    let length = u32::try_from(payload.len() + 1).map_err(|_| Error::TooLarge {
        length: payload.len() + 1,
        max: u32::MAX as usize,
    })?;
    let mut buf = Vec::with_capacity(LENGTH_SIZE + 1 + payload.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.push(code);
    buf.extend_from_slice(payload);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

// Read until the buffer is full or the stream ends, returning the bytes read
fn fill<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + ?Sized,
{
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
