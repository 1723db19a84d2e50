//! Mock filter wheel daemon.
//!
//! Speaks the wheel's one-shot line protocol: each connection carries one
//! command (`home`, `move <n>`, `get`) and gets one `STATUS[,PAYLOAD]` reply.
//! Motion commands sleep for a configurable delay to mimic the real
//! mechanism, so abort and busy paths can be exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Highest valid wheel position; 0 is the home stop.
const MAX_POSITION: u8 = 5;

#[derive(Parser, Debug)]
#[command(about = "Mock filter wheel TCP daemon")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5503")]
    listen: String,

    /// Simulated move duration in milliseconds
    #[arg(long, default_value_t = 5000)]
    move_delay_ms: u64,

    /// Simulated homing duration in milliseconds
    #[arg(long, default_value_t = 10000)]
    home_delay_ms: u64,
}

async fn handle_connection(
    stream: TcpStream,
    position: Arc<Mutex<u8>>,
    args: Arc<Args>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        info!(command, "received");
        let reply = match command.split_once(' ') {
            None if command == "home" => {
                tokio::time::sleep(Duration::from_millis(args.home_delay_ms)).await;
                *position.lock().await = 0;
                "OK,".to_string()
            }
            None if command == "get" => {
                format!("OK,{}", *position.lock().await)
            }
            Some(("move", target)) => match target.parse::<u8>() {
                Ok(target) if target <= MAX_POSITION => {
                    tokio::time::sleep(Duration::from_millis(args.move_delay_ms)).await;
                    *position.lock().await = target;
                    "OK,".to_string()
                }
                _ => "ERR,invalid position".to_string(),
            },
            _ => "ERR,invalid command".to_string(),
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Arc::new(Args::parse());

    let listener = TcpListener::bind(&args.listen).await?;
    info!(listen = %args.listen, "mock filter wheel listening");

    let position = Arc::new(Mutex::new(0u8));
    loop {
        let (stream, peer) = listener.accept().await?;
        let position = position.clone();
        let args = args.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, position, args).await {
                warn!(%peer, error = %e, "connection failed");
            }
        });
    }
}
