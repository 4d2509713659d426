use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use netplay::net::resolve_address;
use netplay::{DEFAULT_PORT, PacketRegistry, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "netplay-server")]
#[command(about = "Dedicated netplay server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = netplay::server::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    #[arg(short, long, default_value_t = netplay::server::DEFAULT_TICK_RATE)]
    tick_rate: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let addr = resolve_address(&args.bind, args.port)
        .with_context(|| format!("cannot resolve {}:{}", args.bind, args.port))?;

    let config = ServerConfig {
        max_clients: args.max_clients,
        tick_rate: args.tick_rate,
        ..Default::default()
    };

    let registry = Arc::new(PacketRegistry::with_catalog());
    let mut server = Server::bind(addr, config, registry)?;

    log::info!("Server started on {}", server.local_addr());
    server.run();
    log::info!("Server shutting down");

    Ok(())
}
