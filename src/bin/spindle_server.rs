use std::{error::Error, sync::mpsc};

use clap::Parser;
use log::info;
use spindle::{
    IpVersion, Request, Server, ServerConfig,
    net::{Connection, HandlerResult},
};

const MSG_PING: u32 = 1;
const MSG_PONG: u32 = 2;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server name used in logs
    #[arg(long, default_value = "spindle")]
    name: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 7777)]
    port: u16,
    /// Protocol family: tcp4, tcp6 or tcp
    #[arg(long, default_value = "tcp4")]
    ip_version: IpVersion,
    /// Maximum live connections
    #[arg(long, default_value_t = 12000)]
    max_conn: usize,
    /// Maximum payload size in bytes, 0 for no limit
    #[arg(long, default_value_t = 4096)]
    max_packet_size: usize,
    /// Number of dispatcher workers
    #[arg(long, default_value_t = 10)]
    workers: usize,
    /// Queue length of each worker
    #[arg(long, default_value_t = 1024)]
    max_worker_task_len: usize,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            name: cli.name,
            host: cli.host,
            port: cli.port,
            ip_version: cli.ip_version,
            max_conn: cli.max_conn,
            max_packet_size: cli.max_packet_size,
            worker_pool_size: cli.workers,
            max_worker_task_len: cli.max_worker_task_len,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut server = Server::new(cli.into())?;

    server.set_on_conn_start(|conn: &Connection| {
        info!("client {} connected as {}", conn.remote_addr(), conn.id())
    });
    server.set_on_conn_stop(|conn: &Connection| info!("client {} left", conn.id()));

    // Ping answers with pong, anything else is echoed back.
    server.add_router(MSG_PING, |req: &Request| -> HandlerResult {
        req.send(MSG_PONG, b"pong")?;
        Ok(())
    });
    server.set_default_router(|req: &Request| -> HandlerResult {
        req.send(req.msg_type(), req.data())?;
        Ok(())
    });

    let (shutdown, signal) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(());
    })?;

    server.start()?;
    signal.recv()?;
    server.stop();
    Ok(())
}
