use crate::err::Error;
use log::{debug, error, warn};

/// `Observer` is told about the events that end a session.
///
/// Every method has a default implementation that logs through the `log`
/// crate. A clean end of stream, a quit command or a terminal response never
/// reach the `*_failed` methods.
pub trait Observer {
    /// Reading a packet failed part way through or the stream errored
    fn read_failed(&mut self, err: &Error) {
        error!("Error reading milter command: {}", err);
    }

    /// Decoding a command or a filter callback failed
    fn process_failed(&mut self, err: &Error) {
        error!("Error performing milter command: {}", err);
    }

    /// Writing a response failed
    fn write_failed(&mut self, err: &Error) {
        error!("Error writing packet: {}", err);
    }

    /// The MTA sent a command code that is not understood
    fn unknown_command(&mut self, code: u8) {
        warn!("Unrecognized command code: {}", char::from(code).escape_debug());
    }

    /// The session has ended and the stream is about to be closed
    fn closed(&mut self) {
        debug!("Milter session closed");
    }
}

/// The default observer, which only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn read_failed(&mut self, err: &Error) {
        (**self).read_failed(err)
    }

    fn process_failed(&mut self, err: &Error) {
        (**self).process_failed(err)
    }

    fn write_failed(&mut self, err: &Error) {
        (**self).write_failed(err)
    }

    fn unknown_command(&mut self, code: u8) {
        (**self).unknown_command(code)
    }

    fn closed(&mut self) {
        (**self).closed()
    }
}
