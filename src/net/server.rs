use std::{
    io,
    net::{Shutdown, SocketAddr, TcpListener},
    sync::Arc,
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    config::{ConfigError, ServerConfig},
    protocol::DataPack,
};

use super::{
    ConnContext, ConnManager, Connection, DispatchError, Dispatcher, Hooks, Router,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Server IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("server already started")]
    AlreadyStarted,
    #[error("accept loop panicked")]
    AcceptPanicked,
}

/// Accepts connections, enforces the connection limit and wires every
/// connection to the shared dispatcher.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    manager: Arc<ConnManager>,
    hooks: Hooks,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.worker_pool_size, config.max_worker_task_len);
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            manager: Arc::new(ConnManager::new()),
            hooks: Hooks::default(),
            acceptor: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn conn_manager(&self) -> &Arc<ConnManager> {
        &self.manager
    }

    pub fn add_router(&self, msg_type: u32, router: impl Router) {
        self.dispatcher.add_router(msg_type, router);
    }

    pub fn set_default_router(&self, router: impl Router) {
        self.dispatcher.set_default_router(router);
    }

    /// Hooks are captured by [`start`](Server::start); set them before starting.
    pub fn set_on_conn_start<F>(&mut self, hook: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.hooks.on_start = Some(Arc::new(hook));
    }

    pub fn set_on_conn_stop<F>(&mut self, hook: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.hooks.on_stop = Some(Arc::new(hook));
    }

    /// Starts the worker pool, binds the listener and runs the accept loop on
    /// its own thread. Returns the bound address.
    pub fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.acceptor.is_some() {
            return Err(ServerError::AlreadyStarted);
        }
        self.dispatcher.start_worker_pool()?;

        let listener = TcpListener::bind(self.config.bind_addr()?)?;
        let local = listener.local_addr()?;
        info!(
            "[{}] listening at {local}, max connections {}, max packet size {}",
            self.config.name, self.config.max_conn, self.config.max_packet_size
        );

        let context = Arc::new(ConnContext {
            pack: DataPack::new(self.config.max_packet_size),
            dispatcher: Arc::clone(&self.dispatcher),
            manager: Arc::clone(&self.manager),
            hooks: self.hooks.clone(),
        });
        let max_conn = self.config.max_conn;
        let acceptor = thread::Builder::new()
            .name("spindle-accept".to_string())
            .spawn(move || accept_loop(listener, max_conn, context))?;

        self.acceptor = Some(acceptor);
        Ok(local)
    }

    /// Starts the server and blocks on the accept loop.
    pub fn serve(mut self) -> Result<(), ServerError> {
        self.start()?;
        match self.acceptor.take() {
            Some(acceptor) => acceptor.join().map_err(|_| ServerError::AcceptPanicked),
            None => Ok(()),
        }
    }

    /// Stops every live connection. The listener keeps accepting.
    pub fn stop(&self) {
        info!("[{}] stopping", self.config.name);
        self.manager.clear_conn();
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay after `failures` consecutive accept errors, doubling up to a cap.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

/// First id at or after `from` that no live connection holds.
fn free_id(manager: &ConnManager, from: u32) -> u32 {
    let mut id = from;
    while manager.contains(id) {
        id = id.wrapping_add(1);
    }
    id
}

fn accept_loop(listener: TcpListener, max_conn: usize, context: Arc<ConnContext>) {
    let mut next_id: u32 = 0;
    let mut failures: u32 = 0;

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => {
                failures = 0;
                stream
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                warn!("accept failed: {e:?}, retrying in {delay:?}");
                thread::sleep(delay);
                continue;
            }
        };

        if context.manager.len() >= max_conn {
            warn!(
                "connection limit {max_conn} reached, rejecting {:?}",
                stream.peer_addr()
            );
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("rejected connection shutdown: {e}");
            }
            continue;
        }

        // After the counter wraps, skip ids still held by live connections.
        let id = free_id(&context.manager, next_id);
        let conn = match Connection::new(stream, id, Arc::clone(&context)) {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                warn!("broken connection: {e:?}");
                continue;
            }
        };
        next_id = id.wrapping_add(1);

        context.manager.add(Arc::clone(&conn));
        context.hooks.call_on_start(&conn);

        let serving = Arc::clone(&conn);
        let spawned = thread::Builder::new()
            .name(format!("spindle-serve-{}", conn.id()))
            .spawn(move || serving.start());
        if let Err(e) = spawned {
            warn!("connection {}: failed to spawn: {e}", conn.id());
            conn.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        io::Read,
        net::TcpStream,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
            mpsc::channel,
        },
        time::{Duration, Instant},
    };

    use crate::{
        net::{
            HandlerResult, Request,
            testing::{connection, context, wait_until},
        },
        protocol::FrameTransport,
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(max_conn: usize, workers: usize) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_conn,
            max_packet_size: 512,
            worker_pool_size: workers,
            ..Default::default()
        }
    }

    fn connect(addr: SocketAddr) -> FrameTransport<TcpStream> {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        FrameTransport::new(stream, DataPack::new(512))
    }

    #[test]
    fn ping_pong_round_trip() {
        let mut server = Server::new(config(4, 2)).unwrap();
        let (started, start_ids) = channel();
        let (stopped, stop_ids) = channel();
        let started = Mutex::new(started);
        let stopped = Mutex::new(stopped);
        server.set_on_conn_start(move |conn| started.lock().unwrap().send(conn.id()).unwrap());
        server.set_on_conn_stop(move |conn| stopped.lock().unwrap().send(conn.id()).unwrap());
        server.add_router(1, |req: &Request| -> HandlerResult {
            assert_eq!(req.data(), b"ping");
            req.send(1, b"pong")?;
            Ok(())
        });
        let addr = server.start().unwrap();

        let mut client = connect(addr);
        assert_eq!(start_ids.recv_timeout(TIMEOUT).unwrap(), 0);
        assert_eq!(server.conn_manager().len(), 1);

        client.write_message(1, b"ping").unwrap();
        let reply = client.read_message().unwrap();
        assert_eq!(reply.msg_type(), 1);
        assert_eq!(reply.data(), b"pong");

        drop(client);
        assert_eq!(stop_ids.recv_timeout(TIMEOUT).unwrap(), 0);
        assert!(wait_until(TIMEOUT, || server.conn_manager().is_empty()));
    }

    #[test]
    fn rejects_connections_over_limit() {
        let mut server = Server::new(config(1, 1)).unwrap();
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&starts);
        server.set_on_conn_start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let addr = server.start().unwrap();

        let first = connect(addr);
        assert!(wait_until(TIMEOUT, || server.conn_manager().len() == 1));

        let mut second = connect(addr).into_inner();
        assert!(matches!(second.read(&mut [0u8; 8]), Ok(0) | Err(_)));
        assert_eq!(server.conn_manager().len(), 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        // The rejected socket consumed no id.
        drop(first);
        assert!(wait_until(TIMEOUT, || server.conn_manager().is_empty()));
        let _third = connect(addr);
        assert!(wait_until(TIMEOUT, || server.conn_manager().get(1).is_some()));
    }

    #[test]
    fn preserves_per_connection_order() {
        const FRAMES: u32 = 200;

        // Two workers, three connections: ids 0 and 2 share a worker.
        let mut server = Server::new(config(8, 2)).unwrap();
        let seen: Arc<Mutex<HashMap<u32, Vec<u32>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        server.add_router(7, move |req: &Request| -> HandlerResult {
            let seq = u32::from_le_bytes(req.data().try_into()?);
            sink.lock().unwrap().entry(req.conn_id()).or_default().push(seq);
            Ok(())
        });
        let addr = server.start().unwrap();

        let mut clients = Vec::new();
        for expected in 1..=3 {
            clients.push(connect(addr));
            assert!(wait_until(TIMEOUT, || server.conn_manager().len() == expected));
        }
        for seq in 0..FRAMES {
            for client in &mut clients {
                client.write_message(7, &seq.to_le_bytes()).unwrap();
            }
        }

        assert!(wait_until(TIMEOUT, || {
            let seen = seen.lock().unwrap();
            seen.len() == 3 && seen.values().all(|v| v.len() == FRAMES as usize)
        }));
        let expected: Vec<u32> = (0..FRAMES).collect();
        for order in seen.lock().unwrap().values() {
            assert_eq!(order, &expected);
        }
    }

    #[test]
    fn separate_workers_handle_concurrently() {
        let mut server = Server::new(config(8, 2)).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done, finished) = channel();
        let done = Mutex::new(done);
        {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            server.add_router(1, move |_: &Request| -> HandlerResult {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(300));
                active.fetch_sub(1, Ordering::SeqCst);
                done.lock().unwrap().send(())?;
                Ok(())
            });
        }
        let addr = server.start().unwrap();

        let mut a = connect(addr);
        assert!(wait_until(TIMEOUT, || server.conn_manager().len() == 1));
        let mut b = connect(addr);
        assert!(wait_until(TIMEOUT, || server.conn_manager().len() == 2));

        let started = Instant::now();
        a.write_message(1, b"").unwrap();
        b.write_message(1, b"").unwrap();
        finished.recv_timeout(TIMEOUT).unwrap();
        finished.recv_timeout(TIMEOUT).unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_millis(590));
    }

    #[test]
    fn stop_closes_live_connections() {
        let mut server = Server::new(config(8, 1)).unwrap();
        let addr = server.start().unwrap();

        let mut clients: Vec<_> = (0..3).map(|_| connect(addr).into_inner()).collect();
        assert!(wait_until(TIMEOUT, || server.conn_manager().len() == 3));

        server.stop();

        assert!(server.conn_manager().is_empty());
        for client in &mut clients {
            assert!(matches!(client.read(&mut [0u8; 8]), Ok(0) | Err(_)));
        }
    }

    #[test]
    fn start_twice_fails() {
        let mut server = Server::new(config(1, 1)).unwrap();
        server.start().unwrap();

        assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));
    }

    #[test]
    fn wrapped_ids_skip_live_connections() {
        let ctx = context(1, 64);
        let (last, _c1) = connection(u32::MAX, &ctx);
        let (first, _c2) = connection(0, &ctx);
        ctx.manager.add(last);
        ctx.manager.add(first);

        assert_eq!(free_id(&ctx.manager, u32::MAX), 1);
        assert_eq!(free_id(&ctx.manager, 5), 5);

        ctx.manager.remove(0);
        assert_eq!(free_id(&ctx.manager, u32::MAX), 0);
    }

    #[test]
    fn accept_backoff_grows_to_cap() {
        assert_eq!(accept_backoff(1), Duration::from_millis(5));
        assert_eq!(accept_backoff(2), Duration::from_millis(10));
        assert_eq!(accept_backoff(4), Duration::from_millis(40));
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }
}
