use crate::err::Error;
use crate::socket::{Connection, Listener, LocalAddr};
use crate::Server;
use log::{debug, error, info, warn};
use milter::{Milter, Observer, SessionBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Pause after a failed accept so that a persistent error, such as running out
// of file descriptors, does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A milter server running in a background thread
pub struct RunningServer {
    local_addr: LocalAddr,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

struct ServerState<M> {
    listener: Listener,
    session_builder: SessionBuilder,
    milter: M,
    stop: Arc<AtomicBool>,
}

impl RunningServer {
    pub(crate) fn serve<M>(config: Server<M>) -> Result<Self, Error>
    where
        M: Milter + Clone + Send + 'static,
    {
        let mut session_builder = SessionBuilder::new(config.actions, config.protocol);
        session_builder.max_packet_size(config.max_packet_size);
        let listener = config.listen.open()?;
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let state = ServerState {
            listener,
            session_builder,
            milter: config.milter,
            stop: stop.clone(),
        };
        info!("Milter started on {}", local_addr);
        let join = thread::Builder::new()
            .name("milter-accept".to_owned())
            .spawn(move || run(state))?;
        Ok(Self {
            local_addr,
            stop,
            join,
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> &LocalAddr {
        &self.local_addr
    }

    /// Stop accepting connections and wait for the accept thread to finish.
    ///
    /// Sessions that are already running carry on until their MTA
    /// disconnects.
    pub fn stop(self) -> Result<(), Error> {
        self.stop.store(true, Ordering::SeqCst);
        // Connect to ourselves to unblock the accept call
        Listener::wake(&self.local_addr)?;
        self.join()
    }

    /// Wait for the server to stop
    pub fn join(self) -> Result<(), Error> {
        self.join.join().map_err(|_| Error::Join)
    }
}

fn run<M>(state: ServerState<M>)
where
    M: Milter + Clone + Send + 'static,
{
    let mut session_id: u64 = 0;
    loop {
        let accepted = state.listener.accept();
        if state.stop.load(Ordering::SeqCst) {
            break;
        }
        match accepted {
            Ok((conn, peer)) => {
                session_id += 1;
                start_session(&state, conn, peer, session_id);
            }
            Err(err) => {
                error!("Cannot accept connection: {}", err);
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    state.listener.cleanup();
    info!("Milter stopped");
}

fn start_session<M>(state: &ServerState<M>, conn: Connection, peer: String, id: u64)
where
    M: Milter + Clone + Send + 'static,
{
    debug!("New connection from {}", peer);
    let observer = PeerObserver { peer: peer.clone() };
    let session = state
        .session_builder
        .build_with_observer(conn, state.milter.clone(), observer);
    let spawned = thread::Builder::new()
        .name(format!("milter-{}", id))
        .spawn(move || session.run());
    if let Err(err) = spawned {
        error!("({}) Cannot start session: {}", peer, err);
    }
}

// Logs session failures against the connected MTA
struct PeerObserver {
    peer: String,
}

impl Observer for PeerObserver {
    fn read_failed(&mut self, err: &milter::Error) {
        error!("({}) Error reading milter command: {}", self.peer, err);
    }

    fn process_failed(&mut self, err: &milter::Error) {
        error!("({}) Error performing milter command: {}", self.peer, err);
    }

    fn write_failed(&mut self, err: &milter::Error) {
        error!("({}) Error writing packet: {}", self.peer, err);
    }

    fn unknown_command(&mut self, code: u8) {
        warn!(
            "({}) Unrecognized command code: {}",
            self.peer,
            char::from(code).escape_debug()
        );
    }

    fn closed(&mut self) {
        debug!("({}) Connection closed", self.peer);
    }
}
