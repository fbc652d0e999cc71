//! A milter server that can be embedded into another program
//!
//! This library provides a simple embeddable milter server. The
//! server uses blocking IO and a thread for each MTA connection.
//! # Examples
//! ```no_run
//! use milter_embedded::{Actions, Milter, Server};
//!
//! #[derive(Clone)]
//! struct MyMilter {}
//! impl Milter for MyMilter {}
//!
//! let milter = MyMilter {};
//! let mut server = Server::new(milter);
//!
//! server
//!     .with_actions(Actions::ADD_HEADER)
//!     .with_addr("inet:8890@127.0.0.1")
//!     .unwrap();
//! server.serve_forever().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod err;
mod running;
mod socket;

pub use crate::err::Error;
pub use crate::running::RunningServer;
pub use crate::socket::{LocalAddr, SocketSpec};
use crate::socket::Listener;
pub use milter::{Actions, Milter, Protocol, DEFAULT_MAX_PACKET_SIZE};
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::UnixListener;

// Where the server will listen
enum Listen {
    Nowhere,
    Spec(SocketSpec),
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listen {
    fn open(self) -> Result<Listener, Error> {
        match self {
            Listen::Nowhere => Err(Error::NoAddress),
            Listen::Spec(spec) => spec.bind(),
            Listen::Tcp(listener) => Ok(Listener::Tcp(listener)),
            #[cfg(unix)]
            Listen::Unix(listener) => Listener::from_unix(listener),
        }
    }
}

/// `Server` is used to configure and start the milter server
pub struct Server<M>
where
    M: Milter + Clone + Send + 'static,
{
    milter: M,
    actions: Actions,
    protocol: Protocol,
    max_packet_size: usize,
    listen: Listen,
}

impl<M> Server<M>
where
    M: Milter + Clone + Send + 'static,
{
    /// Create a new server with the given Milter.
    ///
    /// Each MTA connection gets its own clone of the milter. No actions are
    /// negotiated until `with_actions` is called.
    pub fn new(milter: M) -> Self {
        Self {
            milter,
            actions: Actions::empty(),
            protocol: Protocol::empty(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            listen: Listen::Nowhere,
        }
    }

    /// Set the message modifications the milter may make
    pub fn with_actions(&mut self, actions: Actions) -> &mut Self {
        self.actions = actions;
        self
    }

    /// Set the protocol stages the MTA should skip
    pub fn with_protocol(&mut self, protocol: Protocol) -> &mut Self {
        self.protocol = protocol;
        self
    }

    /// Set the largest packet accepted from an MTA
    pub fn with_max_packet_size(&mut self, size: usize) -> &mut Self {
        self.max_packet_size = size;
        self
    }

    /// Set a tcp listener from an already open socket
    pub fn with_tcp_listener(&mut self, listener: TcpListener) -> &mut Self {
        self.listen = Listen::Tcp(listener);
        self
    }

    /// Set a unix listener from an already open socket.
    ///
    /// The socket file is left in place when the server stops.
    #[cfg(unix)]
    pub fn with_unix_listener(&mut self, listener: UnixListener) -> &mut Self {
        self.listen = Listen::Unix(listener);
        self
    }

    /// Set the socket to listen on, as a libmilter style specification.
    /// Returns an error if the specification is not valid.
    /// ```
    /// # use milter_embedded::{Server, Milter};
    /// # #[derive(Clone)]
    /// # struct EmptyMilter {}
    /// # impl Milter for EmptyMilter {}
    /// # let mut server = Server::new(EmptyMilter {});
    /// server.with_addr("inet:8890@127.0.0.1").unwrap();
    /// server.with_addr("unix:/var/run/milter.sock").unwrap();
    /// assert!(server.with_addr("nonsense").is_err());
    /// ```
    pub fn with_addr(&mut self, addr: &str) -> Result<&mut Self, Error> {
        self.listen = Listen::Spec(addr.parse()?);
        Ok(self)
    }

    /// Start the milter server in a background thread
    pub fn serve(self) -> Result<RunningServer, Error> {
        RunningServer::serve(self)
    }

    /// Start the milter server and run forever
    pub fn serve_forever(self) -> Result<(), Error> {
        let running = RunningServer::serve(self)?;
        running.join()
    }
}
