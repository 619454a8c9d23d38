use std::{
    fmt,
    io::{self, Read},
};

use bincode::{
    Decode, Encode,
    config::{Configuration, Fixint, LittleEndian},
    decode_from_slice, encode_into_slice,
};
use log::trace;
use thiserror::Error;

use super::Message;

/// Size of an encoded [`Header`] in bytes: two fixed-width `u32` fields.
pub const HEADER_SIZE: usize = 2 * size_of::<u32>();

#[derive(Debug, Error)]
pub enum PackError {
    #[error("packet of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("header must be {size} bytes, got {0}", size = HEADER_SIZE)]
    ShortHeader(usize),
    #[error("failed to encode header: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode header: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("Pack IO Error: {0}")]
    Io(#[from] io::Error),
}

impl PackError {
    /// Whether the error is the peer closing the stream on a frame boundary.
    pub fn is_eof(&self) -> bool {
        matches!(self, PackError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Fixed frame header preceding every payload on the wire.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct Header {
    pub len: u32,
    pub msg_type: u32,
}

/// Frame codec. Packs messages into `header ++ payload` and unpacks headers,
/// rejecting any length above `max_packet_size` (`0` disables the limit).
#[derive(Clone, Copy)]
pub struct DataPack {
    max_packet_size: usize,
    config: Configuration<LittleEndian, Fixint>,
}

impl DataPack {
    pub fn new(max_packet_size: usize) -> Self {
        let config = bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding();
        Self {
            max_packet_size,
            config,
        }
    }

    pub fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn check_len(&self, len: usize) -> Result<(), PackError> {
        if self.max_packet_size > 0 && len > self.max_packet_size {
            return Err(PackError::TooLarge {
                len,
                max: self.max_packet_size,
            });
        }
        Ok(())
    }

    pub fn pack(&self, msg_type: u32, data: &[u8]) -> Result<Vec<u8>, PackError> {
        self.check_len(data.len())?;
        let len = u32::try_from(data.len()).map_err(|_| PackError::TooLarge {
            len: data.len(),
            max: u32::MAX as usize,
        })?;

        let mut buf = vec![0u8; HEADER_SIZE + data.len()];
        encode_into_slice(Header { len, msg_type }, &mut buf[..HEADER_SIZE], self.config)?;
        buf[HEADER_SIZE..].copy_from_slice(data);
        Ok(buf)
    }

    /// Decodes a header and validates its declared length. Nothing of the
    /// declared size is allocated here.
    pub fn unpack(&self, header: &[u8]) -> Result<Header, PackError> {
        if header.len() < HEADER_SIZE {
            return Err(PackError::ShortHeader(header.len()));
        }
        let (header, _): (Header, usize) = decode_from_slice(&header[..HEADER_SIZE], self.config)?;
        self.check_len(header.len as usize)?;
        Ok(header)
    }

    /// Reads exactly one frame. Short reads are errors, never retried.
    pub fn read_message<R: Read>(&self, reader: &mut R) -> Result<Message, PackError> {
        let mut head = [0u8; HEADER_SIZE];
        reader.read_exact(&mut head)?;
        let header = self.unpack(&head)?;
        trace!("frame header: {header:?}");

        let mut data = Vec::new();
        if header.len > 0 {
            data = vec![0u8; header.len as usize];
            reader.read_exact(&mut data)?;
        }
        Ok(Message::new(header.msg_type, data))
    }
}

impl fmt::Debug for DataPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPack")
            .field("max_packet_size", &self.max_packet_size)
            .finish()
    }
}
