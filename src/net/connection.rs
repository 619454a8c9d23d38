use std::{
    fmt, io,
    io::Write,
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::protocol::{DataPack, PackError};

use super::{ConnManager, Dispatcher, Hooks, Request};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection {0} is closed")]
    Closed(u32),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error("Connection IO Error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Active,
    /// Teardown in progress; only the first `stop()` caller gets here.
    Stopping,
    Closed,
}

/// Everything a connection needs from the server that accepted it.
pub(crate) struct ConnContext {
    pub(crate) pack: DataPack,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) manager: Arc<ConnManager>,
    pub(crate) hooks: Hooks,
}

/// One accepted socket: a read loop feeding the dispatcher and a send path
/// shared by handlers.
pub struct Connection {
    id: u32,
    remote: SocketAddr,
    /// Handle used for shutdown and to clone the read side.
    stream: TcpStream,
    writer: Mutex<TcpStream>,
    state: Mutex<ConnState>,
    exited: Condvar,
    context: Arc<ConnContext>,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        id: u32,
        context: Arc<ConnContext>,
    ) -> Result<Self, io::Error> {
        let remote = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        Ok(Self {
            id,
            remote,
            stream,
            writer: Mutex::new(writer),
            state: Mutex::new(ConnState::Active),
            exited: Condvar::new(),
            context,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> ConnState {
        *self.lock_state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() != ConnState::Active
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the read loop and blocks until the connection has fully stopped.
    pub fn start(self: &Arc<Self>) {
        info!("connection {} started ({})", self.id, self.remote);

        let conn = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("spindle-conn-{}", self.id))
            .spawn(move || conn.read_loop());
        if let Err(e) = spawned {
            warn!("connection {}: failed to spawn reader: {e}", self.id);
            self.stop();
        }

        let state = self.lock_state();
        let _closed = self
            .exited
            .wait_while(state, |state| *state != ConnState::Closed)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn read_loop(self: Arc<Self>) {
        let mut reader = match self.stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("connection {}: failed to clone stream: {e}", self.id);
                self.stop();
                return;
            }
        };

        loop {
            let msg = match self.context.pack.read_message(&mut reader) {
                Ok(msg) => msg,
                Err(e) if e.is_eof() => {
                    debug!("connection {}: peer closed", self.id);
                    break;
                }
                Err(e) => {
                    warn!("connection {}: read failed: {e}", self.id);
                    break;
                }
            };

            debug!(
                "connection {}: received message type {} ({} bytes)",
                self.id,
                msg.msg_type(),
                msg.len()
            );
            let request = Request::new(Arc::clone(&self), msg);
            if let Err(e) = self.context.dispatcher.submit(request) {
                warn!("connection {}: dispatch failed: {e}", self.id);
                break;
            }
        }

        debug!("connection {} reader exit", self.id);
        self.stop();
    }

    /// Packs and writes one frame. A failed write tears the connection down;
    /// it is never retried.
    pub fn send(&self, msg_type: u32, data: &[u8]) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.id));
        }
        let frame = self.context.pack.pack(msg_type, data)?;

        let written = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(&frame);
        if let Err(e) = written {
            warn!("connection {}: write of message type {msg_type} failed: {e}", self.id);
            self.stop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Idempotent. Only the first caller closes the socket, leaves the
    /// registry, fires the stop hook and signals [`start`](Connection::start).
    pub fn stop(&self) {
        {
            let mut state = self.lock_state();
            if *state != ConnState::Active {
                return;
            }
            *state = ConnState::Stopping;
        }

        info!("connection {} stopping ({})", self.id, self.remote);
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Already reset by the peer.
            debug!("connection {}: shutdown: {e}", self.id);
        }
        self.context.manager.remove(self.id);
        self.context.hooks.call_on_stop(self);

        *self.lock_state() = ConnState::Closed;
        self.exited.notify_all();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}
