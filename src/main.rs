//! Entry point for `selective-repeat`.
//!
//! `recv` runs a server that prints every completed message; `send` delivers
//! one message and exits.  Protocol work lives in the library; this file
//! owns process setup (logging, argument parsing, stdio).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use selective_repeat::frame::Role;
use selective_repeat::simulator::{LossyChannel, SimulatorConfig};
use selective_repeat::socket::{Socket, UdpChannel};
use selective_repeat::{ReliableSender, Server, TransportConfig};

/// Reliable message delivery over UDP using Selective Repeat.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive messages and print each one to stdout.
    Recv {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        #[command(flatten)]
        transport: TransportArgs,
    },
    /// Send one message and wait until it is acknowledged.
    Send {
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        to: SocketAddr,
        /// Message text.  Reads stdin when neither this nor --file is given.
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,
        /// Send the contents of a file.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Transfer id; random when omitted.
        #[arg(long)]
        transfer_id: Option<u32>,
        /// Drop this share of outbound packets (0.0 - 1.0) to exercise recovery.
        #[arg(long, default_value_t = 0.0)]
        loss_rate: f64,
        #[command(flatten)]
        transport: TransportArgs,
    },
}

#[derive(Args)]
struct TransportArgs {
    /// Payload bytes per data packet.
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,
    /// Maximum unacknowledged packets in flight.
    #[arg(long, default_value_t = 8)]
    window_size: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 500)]
    rto_ms: u64,
    /// Largest datagram the socket will read.
    #[arg(long, default_value_t = 4096)]
    recv_buffer: usize,
}

impl TransportArgs {
    fn config(&self) -> TransportConfig {
        TransportConfig {
            chunk_size: self.chunk_size,
            window_size: self.window_size,
            retransmission_timeout: Duration::from_millis(self.rto_ms),
            receive_buffer_size: self.recv_buffer,
            ..TransportConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match cli.mode {
        Mode::Recv { bind, transport } => recv(bind, transport.config()).await,
        Mode::Send {
            to,
            message,
            file,
            transfer_id,
            loss_rate,
            transport,
        } => {
            let payload = match (message, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await.context("reading stdin")?;
                    buf
                }
            };
            let transfer_id = transfer_id.unwrap_or_else(rand::random);
            send(to, transfer_id, loss_rate, &payload, transport.config()).await
        }
    }
}

async fn recv(bind: SocketAddr, config: TransportConfig) -> anyhow::Result<()> {
    let (server, mut messages) = Server::bind(bind, config).await.context("starting server")?;
    let serve = tokio::spawn(server.run());

    let mut stdout = tokio::io::stdout();
    while let Some(message) = messages.recv().await {
        stdout.write_all(&message).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    serve.await?.context("server failed")?;
    Ok(())
}

async fn send(
    to: SocketAddr,
    transfer_id: u32,
    loss_rate: f64,
    payload: &[u8],
    config: TransportConfig,
) -> anyhow::Result<()> {
    let local: SocketAddr = if to.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse()?;
    let socket = Socket::bind(local, config.receive_buffer_size).await?;
    log::info!("sending {} byte(s) to {to} as transfer {transfer_id}", payload.len());

    let channel = UdpChannel::new(socket, to, Role::Sender, transfer_id);
    let lossy = LossyChannel::new(
        channel,
        SimulatorConfig {
            loss_rate,
            seed: rand::random(),
            ..SimulatorConfig::default()
        },
    )
    .context("--loss-rate")?;

    let mut sender = ReliableSender::new(lossy, config)?;
    let stats = sender.send_message(payload).await?;
    log::info!(
        "delivered: {} chunk(s), {} transmission(s), {} retransmission(s), {} dropped by --loss-rate",
        stats.chunks,
        stats.transmissions,
        stats.retransmissions,
        sender.channel().counts().dropped
    );
    Ok(())
}
