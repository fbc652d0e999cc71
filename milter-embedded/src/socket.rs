use crate::err::Error;
use log::debug;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;

//------ Socket specifications -------------------------------------------------

/// Where a milter server listens, in the style of a libmilter connection spec
///
/// # Examples
/// ```
/// # use milter_embedded::SocketSpec;
/// let spec: SocketSpec = "inet:8890@localhost".parse().unwrap();
/// assert_eq!(spec, SocketSpec::Inet { host: "localhost".to_owned(), port: 8890 });
///
/// let spec: SocketSpec = "unix:/run/milter.sock".parse().unwrap();
/// assert_eq!(spec.to_string(), "unix:/run/milter.sock");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketSpec {
    /// An IPv4 or host name address, `inet:PORT@HOST` or `HOST:PORT`
    Inet {
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
    },
    /// An IPv6 address, `inet6:PORT@HOST`
    Inet6 {
        /// Host name or address
        host: String,
        /// TCP port
        port: u16,
    },
    /// A unix domain socket, `unix:PATH` or `local:PATH`
    Unix(PathBuf),
}

impl FromStr for SocketSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidSpec(s.to_owned());
        let (scheme, rest) = match s.split_once(':') {
            Some((scheme, rest)) => (scheme, rest),
            None => return Err(invalid()),
        };
        match scheme {
            "unix" | "local" if !rest.is_empty() => Ok(SocketSpec::Unix(PathBuf::from(rest))),
            "inet" | "inet6" => {
                let (port, host) = match rest.split_once('@') {
                    Some((port, host)) => (port, host),
                    // A bare port listens on every interface
                    None if scheme == "inet" => (rest, "0.0.0.0"),
                    None => (rest, "::"),
                };
                let port = port.parse().map_err(|_| invalid())?;
                let host = host.trim_start_matches('[').trim_end_matches(']').to_owned();
                if host.is_empty() {
                    return Err(invalid());
                }
                Ok(if scheme == "inet" {
                    SocketSpec::Inet { host, port }
                } else {
                    SocketSpec::Inet6 { host, port }
                })
            }
            _ => {
                // HOST:PORT, where the host may be a bracketed IPv6 address
                let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
                let port = port.parse().map_err(|_| invalid())?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                if host.is_empty() {
                    return Err(invalid());
                }
                let host = host.to_owned();
                Ok(if host.contains(':') {
                    SocketSpec::Inet6 { host, port }
                } else {
                    SocketSpec::Inet { host, port }
                })
            }
        }
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SocketSpec::Inet { host, port } => write!(f, "inet:{}@{}", port, host),
            SocketSpec::Inet6 { host, port } => write!(f, "inet6:{}@{}", port, host),
            SocketSpec::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl SocketSpec {
    // Open a listener for the socket
    pub(crate) fn bind(&self) -> Result<Listener, Error> {
        match self {
            SocketSpec::Inet { host, port } => {
                let addrs = resolve(host, *port, |addr| addr.is_ipv4())?;
                let listener =
                    TcpListener::bind(&addrs[..]).map_err(|e| Error::bind(self.to_string(), e))?;
                Ok(Listener::Tcp(listener))
            }
            SocketSpec::Inet6 { host, port } => {
                let addrs = resolve(host, *port, |addr| addr.is_ipv6())?;
                let listener =
                    TcpListener::bind(&addrs[..]).map_err(|e| Error::bind(self.to_string(), e))?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            SocketSpec::Unix(path) => {
                remove_stale(path)?;
                let listener =
                    UnixListener::bind(path).map_err(|e| Error::bind(self.to_string(), e))?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                    owned: true,
                })
            }
            #[cfg(not(unix))]
            SocketSpec::Unix(_) => Err(Error::InvalidSpec(self.to_string())),
        }
    }
}

fn resolve<F>(host: &str, port: u16, want: F) -> Result<Vec<SocketAddr>, Error>
where
    F: Fn(&SocketAddr) -> bool,
{
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::bind(format!("{}:{}", host, port), e))?
        .filter(want)
        .collect();
    if addrs.is_empty() {
        return Err(Error::InvalidSpec(format!("{}:{}", host, port)));
    }
    Ok(addrs)
}

// A socket file left behind by an earlier run would stop the bind
#[cfg(unix)]
fn remove_stale(path: &Path) -> Result<(), Error> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path).map_err(|e| Error::bind(path.display().to_string(), e))
        }
        Ok(_) => Err(Error::bind(
            path.display().to_string(),
            io::Error::new(io::ErrorKind::AlreadyExists, "not a socket"),
        )),
        Err(_) => Ok(()),
    }
}

//------ Listeners -------------------------------------------------------------

/// The address a running server listens on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalAddr {
    /// A TCP socket
    Inet(SocketAddr),
    /// A unix domain socket
    Unix(PathBuf),
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LocalAddr::Inet(addr) => write!(f, "{}", addr),
            LocalAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
        // Remove the socket file on shutdown
        owned: bool,
    },
}

impl Listener {
    pub(crate) fn local_addr(&self) -> Result<LocalAddr, Error> {
        match self {
            Listener::Tcp(listener) => Ok(LocalAddr::Inet(listener.local_addr()?)),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(LocalAddr::Unix(path.clone())),
        }
    }

    // Accept a connection, returning it with a description of the peer
    pub(crate) fn accept(&self) -> io::Result<(Connection, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept()?;
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                let (stream, peer) = listener.accept()?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "local".to_owned());
                Ok((Connection::Unix(stream), peer))
            }
        }
    }

    // Unblock a thread waiting in accept
    pub(crate) fn wake(addr: &LocalAddr) -> io::Result<()> {
        match addr {
            LocalAddr::Inet(addr) => {
                let mut addr = *addr;
                if addr.ip().is_unspecified() {
                    let loopback = match addr.ip() {
                        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                    };
                    addr.set_ip(loopback);
                }
                TcpStream::connect(addr).map(|_| ())
            }
            #[cfg(unix)]
            LocalAddr::Unix(path) => UnixStream::connect(path).map(|_| ()),
            #[cfg(not(unix))]
            LocalAddr::Unix(_) => Ok(()),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(listener: UnixListener) -> Result<Self, Error> {
        let path = listener
            .local_addr()?
            .as_pathname()
            .map(PathBuf::from)
            .ok_or(Error::UnnamedSocket)?;
        Ok(Listener::Unix {
            listener,
            path,
            owned: false,
        })
    }

    // Remove the socket file of a unix socket bound by the server
    pub(crate) fn cleanup(&self) {
        match self {
            #[cfg(unix)]
            Listener::Unix {
                path, owned: true, ..
            } => {
                if let Err(err) = std::fs::remove_file(path) {
                    debug!("Cannot remove socket {}: {}", path.display(), err);
                }
            }
            _ => (),
        }
    }
}

//------ Connections -----------------------------------------------------------

/// A connection from an MTA
pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Connection::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Connection::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Connection::Unix(s) => s.flush(),
        }
    }
}
