use crate::observer::Observer;
use crate::packet::Packet;
use crate::session::{Action, Session};
use crate::Milter;
use std::io::{Read, Write};

impl<S, M, O> Session<S, M, O>
where
    S: Read + Write,
    M: Milter,
    O: Observer,
{
    /// Process milter commands until the connection ends.
    ///
    /// The loop ends when the MTA closes the stream, sends quit or an
    /// unrecognized command, a response ends the session, or an error
    /// occurs. The session, and with it the stream, is dropped on return.
    pub fn run(mut self) {
        loop {
            let packet = match Packet::read_from(&mut self.stream, self.max_packet_size) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(err) => {
                    self.observer.read_failed(&err);
                    break;
                }
            };
            let res = match self.process(&packet) {
                Ok(Action::NoReply) => continue,
                Ok(Action::Close) => break,
                Ok(Action::Reply(res)) => res,
                Err(err) => {
                    self.observer.process_failed(&err);
                    break;
                }
            };
            res.log();
            if let Err(err) = res.write_to(&mut self.stream) {
                self.observer.write_failed(&err);
                break;
            }
            if !res.continues() {
                break;
            }
        }
        self.observer.closed();
    }
}
