//! Wire protocol.
//!
//! This module defines the framing used between Spindle servers and their peers. It provides
//! the codec that turns typed messages into bytes and back, and a small transport used by
//! clients to exchange frames over any stream.
//!
//! # Binary Format
//!
//! A stream is a sequence of frames:
//!
//! - Each frame begins with a fixed 8 byte header: the payload length, then the message type.
//! - Both header fields are `u32`, little-endian.
//! - Exactly `length` payload bytes follow.
//!
//! There is no magic number, version or checksum. A desynchronized stream cannot recover;
//! the server closes the connection on any decode anomaly and the peer only observes the
//! socket closing. No error frame is ever sent back.
//!
//! # Key Components
//!
//! - [`DataPack`]: Frame codec with a configurable maximum packet size.
//! - [`Message`]: A decoded frame.
//! - [`FrameTransport`]: Client-side transport over a bidirectional stream.
mod message;
mod pack;
mod transport;

pub use message::Message;
pub use pack::{DataPack, HEADER_SIZE, Header, PackError};
pub use transport::FrameTransport;
