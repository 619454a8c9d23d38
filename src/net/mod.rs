//! Connection lifecycle and message dispatch.
//!
//! The [`Server`] accepts sockets, turns each into a [`Connection`] tracked by the
//! [`ConnManager`], and hands every decoded frame to the [`Dispatcher`] as a [`Request`].
//!
//! ```text
//! accept ──> admission (ConnManager::len < max_conn)
//!        ──> Connection::start ──> read loop ──> DataPack::read_message
//!                                             ──> Dispatcher::submit
//!                                                   └─> worker[conn_id % N]
//!                                                         └─> Router::{pre_handle, handle, post_handle}
//!                                                               └─> Request::send ──> Connection::send
//! ```
//!
//! # Threads
//!
//! Everything is blocking I/O on OS threads: one accept thread, `N` workers, and two
//! threads per connection (the read loop and the serving thread parked in
//! [`Connection::start`]). There are no read or write deadlines, so an idle peer holds
//! its threads until it disconnects or the server is stopped.
//!
//! # Failure Handling
//!
//! - Read, write and decode failures close that connection only.
//! - Handler errors and panics are logged by the worker; the connection stays open.
//! - A peer never receives an error frame. It only sees the socket close.
mod connection;
mod dispatch;
mod hooks;
mod manager;
mod request;
mod router;
mod server;

pub(crate) use connection::ConnContext;

pub use connection::{ConnState, Connection, ConnectionError};
pub use dispatch::{DispatchError, Dispatcher};
pub use hooks::{ConnHook, Hooks};
pub use manager::ConnManager;
pub use request::Request;
pub use router::{HandlerError, HandlerResult, Router};
pub use server::{Server, ServerError};
