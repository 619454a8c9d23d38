use std::{
    collections::HashMap,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        mpsc::{self, Receiver, SyncSender},
    },
    thread,
};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::{HandlerResult, Request, Router};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker pool has not been started")]
    NotStarted,
    #[error("worker {0} is no longer accepting requests")]
    Closed(usize),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Default)]
struct RouterTable {
    routes: HashMap<u32, Arc<dyn Router>>,
    fallback: Option<Arc<dyn Router>>,
}

impl RouterTable {
    fn resolve(&self, msg_type: u32) -> Option<Arc<dyn Router>> {
        self.routes
            .get(&msg_type)
            .or(self.fallback.as_ref())
            .cloned()
    }
}

/// Fixed pool of workers, each draining its own bounded queue.
///
/// Requests are assigned to `conn_id % pool_size`, so every request from one
/// connection runs on the same worker in arrival order, while connections on
/// different workers run in parallel.
pub struct Dispatcher {
    routers: Arc<RwLock<RouterTable>>,
    size: usize,
    task_len: usize,
    queues: RwLock<Vec<SyncSender<Request>>>,
    workers: Mutex<Vec<Worker>>,
}

impl Dispatcher {
    pub fn new(size: usize, task_len: usize) -> Self {
        assert!(size > 0);

        Self {
            routers: Arc::default(),
            size,
            task_len,
            queues: RwLock::new(Vec::with_capacity(size)),
            workers: Mutex::new(Vec::with_capacity(size)),
        }
    }

    pub fn worker_pool_size(&self) -> usize {
        self.size
    }

    /// Binds `router` to `msg_type`, replacing any earlier registration.
    pub fn add_router(&self, msg_type: u32, router: impl Router) {
        let mut table = self.routers.write().unwrap_or_else(PoisonError::into_inner);
        if table.routes.insert(msg_type, Arc::new(router)).is_some() {
            warn!("router for message type {msg_type} replaced");
        } else {
            info!("router added for message type {msg_type}");
        }
    }

    /// Router used for message types with no binding of their own.
    pub fn set_default_router(&self, router: impl Router) {
        let mut table = self.routers.write().unwrap_or_else(PoisonError::into_inner);
        table.fallback = Some(Arc::new(router));
    }

    /// Launches all workers. Calling it again once running is a no-op.
    pub fn start_worker_pool(&self) -> Result<(), DispatchError> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            warn!("worker pool already running");
            return Ok(());
        }

        let mut queues = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let (sender, receiver) = mpsc::sync_channel(self.task_len);
            workers.push(Worker::new(id, receiver, Arc::clone(&self.routers))?);
            queues.push(sender);
        }
        *self.queues.write().unwrap_or_else(PoisonError::into_inner) = queues;

        info!("started {} workers, queue length {}", self.size, self.task_len);
        Ok(())
    }

    /// Queues `request` on the worker owning its connection. Blocks while that
    /// worker's queue is full.
    pub fn submit(&self, request: Request) -> Result<(), DispatchError> {
        let (index, sender) = {
            let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
            if queues.is_empty() {
                return Err(DispatchError::NotStarted);
            }
            let index = request.conn_id() as usize % queues.len();
            (index, queues[index].clone())
        };

        debug!(
            "connection {} message type {} -> worker {index}",
            request.conn_id(),
            request.msg_type()
        );
        sender
            .send(request)
            .map_err(|_| DispatchError::Closed(index))
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Workers exit once their queue sender is gone.
        self.queues
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let current = thread::current().id();
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.drain(..) {
            if worker.thread.thread().id() == current {
                continue;
            }
            debug!("shutting down worker {}", worker.id);
            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(
        id: usize,
        receiver: Receiver<Request>,
        routers: Arc<RwLock<RouterTable>>,
    ) -> Result<Self, io::Error> {
        let thread = thread::Builder::new()
            .name(format!("spindle-worker-{id}"))
            .spawn(move || {
                while let Ok(request) = receiver.recv() {
                    let router = routers
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .resolve(request.msg_type());
                    match router {
                        Some(router) => run(id, router.as_ref(), &request),
                        None => warn!(
                            "worker {id}: no router for message type {}, dropping request from connection {}",
                            request.msg_type(),
                            request.conn_id()
                        ),
                    }
                }
                debug!("worker {id} disconnected!");
            })?;

        Ok(Self { id, thread })
    }
}

/// Runs all three phases. Errors and panics stay inside this call.
fn run(worker: usize, router: &dyn Router, request: &Request) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        report(worker, "pre_handle", request, router.pre_handle(request));
        report(worker, "handle", request, router.handle(request));
        report(worker, "post_handle", request, router.post_handle(request));
    }));

    if outcome.is_err() {
        error!(
            "worker {worker}: handler for message type {} panicked (connection {})",
            request.msg_type(),
            request.conn_id()
        );
    }
}

fn report(worker: usize, phase: &str, request: &Request, result: HandlerResult) {
    if let Err(e) = result {
        error!(
            "worker {worker}: {phase} failed for message type {} (connection {}): {e}",
            request.msg_type(),
            request.conn_id()
        );
    }
}
