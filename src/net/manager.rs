use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info};

use super::Connection;

/// Registry of live connections. Every operation runs under a single lock.
#[derive(Debug, Default)]
pub struct ConnManager {
    connections: Mutex<HashMap<u32, Arc<Connection>>>,
}

impl ConnManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, conn: Arc<Connection>) {
        let mut connections = self.lock();
        connections.insert(conn.id(), conn);
        debug!("connection added, {} live", connections.len());
    }

    pub fn remove(&self, id: u32) -> Option<Arc<Connection>> {
        let mut connections = self.lock();
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!("connection {id} removed, {} live", connections.len());
        }
        removed
    }

    pub fn get(&self, id: u32) -> Option<Arc<Connection>> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stops every tracked connection and empties the registry.
    pub fn clear_conn(&self) {
        // `Connection::stop` calls back into `remove`, so drain before stopping.
        let drained: Vec<_> = self.lock().drain().map(|(_, conn)| conn).collect();
        info!("clearing {} connections", drained.len());

        for conn in drained {
            conn.stop();
        }
    }
}
