//! Find a Roku device and send it a few commands.
//!
//! ```text
//! cargo run --example discover -- [--config roku.toml] [--address 192.168.1.30] home down ok
//! ```
//!
//! Set `RUST_LOG=roku_remote=debug` to watch individual probes.

use roku_remote::{EngineConfig, EngineEvent, ErrorCause, FileStore, RokuClient};
use std::io::{self, BufRead, Write};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roku_remote=info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = EngineConfig::default();
    let mut manual_address = None;
    let mut commands = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = EngineConfig::load(args.next().ok_or("--config needs a path")?)?,
            "--address" => manual_address = Some(args.next().ok_or("--address needs a value")?),
            _ => commands.push(arg),
        }
    }

    let mut builder = RokuClient::builder().config(config);
    if let Some(path) = FileStore::default_path() {
        println!("Remembering the device in {}", path.display());
        builder = builder.store(FileStore::new(path));
    }
    let client = builder.build();

    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::DiscoveryStateChanged(state) => println!("  discovery: {:?}", state),
                EngineEvent::PairingRequested(address) => {
                    println!("  accept the connection request shown by {}", address)
                }
                _ => {}
            }
        }
    });

    let device = match manual_address {
        Some(address) => client.connect(&address).await?,
        None => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            match client.discover_with_cancel(cancel).await {
                Ok(device) => device,
                Err(e) if matches!(e.cause(), ErrorCause::Exhausted | ErrorCause::Cancelled) => {
                    println!("{}", e);
                    let address = prompt("Device address (Settings > Network > About): ")?;
                    client.connect(&address).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    };
    println!("Using {}", device.label());

    for command in &commands {
        match client.send(command.as_str()).await {
            Ok(()) => println!("Sent {}", command),
            Err(e) => println!("{}: {}", command, e),
        }
    }

    Ok(())
}

fn prompt(question: &str) -> io::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
