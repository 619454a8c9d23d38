/// A decoded frame: message type plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: u32,
    data: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: u32, data: Vec<u8>) -> Self {
        Self { msg_type, data }
    }

    pub fn msg_type(&self) -> u32 {
        self.msg_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
