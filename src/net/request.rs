use std::sync::Arc;

use crate::protocol::Message;

use super::{Connection, ConnectionError};

/// A decoded message together with the connection it arrived on.
#[derive(Debug)]
pub struct Request {
    conn: Arc<Connection>,
    msg: Message,
}

impl Request {
    pub fn new(conn: Arc<Connection>, msg: Message) -> Self {
        Self { conn, msg }
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn conn_id(&self) -> u32 {
        self.conn.id()
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    pub fn msg_type(&self) -> u32 {
        self.msg.msg_type()
    }

    pub fn data(&self) -> &[u8] {
        self.msg.data()
    }

    /// Sends a frame back to the originating connection.
    pub fn send(&self, msg_type: u32, data: &[u8]) -> Result<(), ConnectionError> {
        self.conn.send(msg_type, data)
    }
}
