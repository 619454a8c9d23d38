use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, error};

use super::Connection;

pub type ConnHook = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Optional callbacks fired once when a connection is registered and once
/// when it is torn down.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_start: Option<ConnHook>,
    pub(crate) on_stop: Option<ConnHook>,
}

impl Hooks {
    pub(crate) fn call_on_start(&self, conn: &Connection) {
        if let Some(hook) = &self.on_start {
            debug!("calling on_conn_start for connection {}", conn.id());
            guarded("on_conn_start", hook, conn);
        }
    }

    pub(crate) fn call_on_stop(&self, conn: &Connection) {
        if let Some(hook) = &self.on_stop {
            debug!("calling on_conn_stop for connection {}", conn.id());
            guarded("on_conn_stop", hook, conn);
        }
    }
}

/// A panicking hook is logged; it never unwinds into the accept loop or a teardown.
fn guarded(name: &str, hook: &ConnHook, conn: &Connection) {
    if panic::catch_unwind(AssertUnwindSafe(|| hook(conn))).is_err() {
        error!("{name} hook panicked for connection {}", conn.id());
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}
