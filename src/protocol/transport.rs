use std::io::{Read, Write};

use super::{DataPack, Message, PackError};

/// Client side of the wire protocol over any bidirectional stream.
pub struct FrameTransport<T: Read + Write> {
    stream: T,
    pack: DataPack,
}

impl<T: Read + Write> FrameTransport<T> {
    pub fn new(stream: T, pack: DataPack) -> Self {
        Self { stream, pack }
    }

    pub fn write_message(&mut self, msg_type: u32, data: &[u8]) -> Result<(), PackError> {
        let frame = self.pack.pack(msg_type, data)?;
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_message(&mut self) -> Result<Message, PackError> {
        self.pack.read_message(&mut self.stream)
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}
