//! Fetch Object - GET an object from an OBEX server.
//!
//! This example demonstrates:
//! - Loading client settings from a JSON file
//! - A multi-packet GET that follows Continue responses
//! - Mapping a failure response code to its name
//!
//! # Running
//!
//! ```text
//! cargo run --example fetch_object -- 127.0.0.1:6500 telecom/pb.vcf [config.json]
//! ```

use obex_engine::protocol::response_code;
use obex_engine::{ClientConfig, ObexClient, ObexError};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(addr), Some(name)) = (args.next(), args.next()) else {
        eprintln!("usage: fetch_object <host:port> <name> [config.json]");
        std::process::exit(2);
    };
    let config = match args.next() {
        Some(path) => ClientConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => ClientConfig::default(),
    };

    let stream = TcpStream::connect(&addr).await?;
    let mut client = ObexClient::builder().config(config).start(stream)?;
    client.connect().await?;

    match client.get(Some(&name), None).await {
        Ok(body) => {
            println!("received {} bytes", body.len());
            println!("{}", String::from_utf8_lossy(&body));
        }
        Err(ObexError::ResponseError(code)) => {
            let label = response_code::name(code).unwrap_or("unknown");
            eprintln!("server refused: {:#04x} ({})", code, label);
        }
        Err(e) => return Err(e.into()),
    }

    client.disconnect().await?;
    client.shutdown().await?;
    Ok(())
}
