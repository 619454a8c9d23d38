pub mod cli;
pub mod config;
pub mod net;
pub mod protocol;

pub use cli::{Command, prompt};
pub use config::{IpVersion, ServerConfig};
pub use net::{Connection, Request, Router, Server};
pub use protocol::{DataPack, Message};
