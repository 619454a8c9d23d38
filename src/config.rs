//! Server configuration.
//!
//! A [`ServerConfig`] is built once, typically from command-line flags, and handed to
//! [`Server::new`](crate::net::Server::new). Nothing in the library reads configuration
//! from the environment or from a process-wide singleton.
use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported ip version '{0}', expected tcp, tcp4 or tcp6")]
    IpVersion(String),
    #[error("no {version} address found for '{host}:{port}'")]
    NoAddress {
        host: String,
        port: u16,
        version: IpVersion,
    },
    #[error("failed to resolve '{host}:{port}': {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("worker pool size must be at least 1")]
    EmptyWorkerPool,
}

/// Protocol family the listener binds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
    #[default]
    Tcp4,
    Tcp6,
    /// Either family, first resolved address wins.
    Tcp,
}

impl IpVersion {
    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            IpVersion::Tcp4 => addr.is_ipv4(),
            IpVersion::Tcp6 => addr.is_ipv6(),
            IpVersion::Tcp => true,
        }
    }
}

impl FromStr for IpVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp4" => Ok(IpVersion::Tcp4),
            "tcp6" => Ok(IpVersion::Tcp6),
            "tcp" => Ok(IpVersion::Tcp),
            other => Err(ConfigError::IpVersion(other.to_string())),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::Tcp4 => write!(f, "tcp4"),
            IpVersion::Tcp6 => write!(f, "tcp6"),
            IpVersion::Tcp => write!(f, "tcp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub ip_version: IpVersion,
    /// Live connections allowed before new ones are closed at accept time.
    pub max_conn: usize,
    /// Largest payload in bytes; `0` disables the limit.
    pub max_packet_size: usize,
    pub worker_pool_size: usize,
    /// Capacity of each worker's queue.
    pub max_worker_task_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "spindle".to_string(),
            host: "0.0.0.0".to_string(),
            port: 7777,
            ip_version: IpVersion::Tcp4,
            max_conn: 12000,
            max_packet_size: 4096,
            worker_pool_size: 10,
            max_worker_task_len: 1024,
        }
    }
}

impl ServerConfig {
    /// Resolves the bind address, keeping only addresses of the configured family.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Resolve {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })?;

        addrs
            .into_iter()
            .find(|addr| self.ip_version.accepts(addr))
            .ok_or_else(|| ConfigError::NoAddress {
                host: self.host.clone(),
                port: self.port,
                version: self.ip_version,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::EmptyWorkerPool);
        }
        Ok(())
    }
}
