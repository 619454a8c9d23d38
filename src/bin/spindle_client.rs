use std::{error::Error, io, net::TcpStream};

use clap::Parser;
use spindle::{Command, DataPack, prompt, protocol::FrameTransport};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(default_value = "127.0.0.1:7777")]
    address: String,
    /// Maximum payload size in bytes, 0 for no limit
    #[arg(long, default_value_t = 4096)]
    max_packet_size: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let stream = TcpStream::connect(&cli.address)?;
    let mut transport = FrameTransport::new(stream, DataPack::new(cli.max_packet_size));

    loop {
        let cmd = match prompt(io::stdin().lock(), io::stdout().lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let (msg_type, payload) = match cmd {
            Command::Exit => break,
            Command::Send { msg_type, payload } => (msg_type, payload),
        };

        transport.write_message(msg_type, payload.as_bytes())?;
        let reply = transport.read_message()?;
        println!(
            "[{}] {}",
            reply.msg_type(),
            String::from_utf8_lossy(reply.data())
        );
    }

    Ok(())
}
