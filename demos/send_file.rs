//! Send File - push a local file to an OBEX server.
//!
//! This example demonstrates:
//! - Starting a client on a TCP stream with the builder
//! - Opening an OBEX session and reading the negotiated packet size
//! - A chunked PUT with a progress callback
//!
//! # Running
//!
//! ```text
//! RUST_LOG=obex_engine=debug cargo run --example send_file -- 127.0.0.1:6500 ./photo.jpg
//! ```

use std::path::Path;

use obex_engine::{ChunkedPutTransfer, ObexClient};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(addr), Some(path)) = (args.next(), args.next()) else {
        eprintln!("usage: send_file <host:port> <file>");
        std::process::exit(2);
    };

    let data = tokio::fs::read(&path).await?;
    let name = Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("object")
        .to_string();

    let stream = TcpStream::connect(&addr).await?;
    let mut client = ObexClient::builder()
        .max_packet_size(u16::MAX)
        .start(stream)?;

    client
        .on_error(|e| eprintln!("transport error: {}", e))
        .await;

    let session = client.connect().await?;
    println!(
        "connected: version {:#04x}, peer accepts {} byte packets",
        session.version(),
        session.max_packet_size()
    );

    let transfer = ChunkedPutTransfer::new(name.as_str(), data)?
        .with_chunk_size(client.config().chunk_size)?
        .with_type(&b"application/octet-stream\0"[..]);

    let done = client
        .put_transfer(transfer, |p| {
            println!("{}: {}/{} bytes", name, p.sent, p.total);
        })
        .await?;
    println!("sent {} bytes", done.sent);

    client.disconnect().await?;
    client.shutdown().await?;
    Ok(())
}
