use clap::Parser;
use client::network::{Client, LinkConditions};
use client::script::ScriptedInput;
use log::info;
use shared::GameConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Fraction of input packets to drop, between 0 and 1
    #[arg(long, default_value = "0")]
    packet_loss: f64,

    /// Client ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Movement configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds per side of the scripted patrol
    #[arg(long, default_value = "1500")]
    leg_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    if args.packet_loss > 0.0 {
        info!("Dropping {:.0}% of inputs", args.packet_loss * 100.0);
    }

    let script = ScriptedInput {
        leg_ms: args.leg_ms,
        ..Default::default()
    };
    let link = LinkConditions {
        fake_ping_ms: args.fake_ping,
        packet_loss: args.packet_loss,
    };

    let mut client = Client::new(&args.server, config, Box::new(script), link, args.tick_rate).await?;

    client.run().await?;

    Ok(())
}
