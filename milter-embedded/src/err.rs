use std::io;

/// All crate errors are wrapped in this error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An i/o error not tied to a particular address
    #[error("{0}")]
    Io(#[from] io::Error),
    /// The listen socket could not be opened
    #[error("Cannot open listen address {addr}: {source}")]
    Bind {
        /// The address that failed
        addr: String,
        /// Why it failed
        #[source]
        source: io::Error,
    },
    /// A socket specification could not be parsed
    #[error("Invalid socket specification '{0}'")]
    InvalidSpec(String),
    /// The server was started without anywhere to listen
    #[error("No listen address given")]
    NoAddress,
    /// A unix listener without a path cannot be stopped
    #[error("Unix socket has no path")]
    UnnamedSocket,
    /// The accept thread panicked
    #[error("Error joining server")]
    Join,
}

impl Error {
    pub(crate) fn bind<S: Into<String>>(addr: S, source: io::Error) -> Self {
        Error::Bind {
            addr: addr.into(),
            source,
        }
    }
}
