use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use clap::Parser;

use netplay::net::parse_port;
use netplay::{Command, ConnectionState, NetworkManager};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Netplay client shell")]
struct Args {
    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(
        short,
        long,
        help = "Server to join on start-up (e.g., 127.0.0.1:7777)"
    )]
    connect: Option<String>,

    #[arg(short, long, default_value_t = 60)]
    frame_rate: u32,
}

fn split_host_port(text: &str) -> Result<(&str, u16)> {
    let (host, port) = text
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected host:port, got '{}'", text))?;
    let port = parse_port(port).ok_or_else(|| anyhow!("invalid port '{}'", port))?;
    Ok((host, port))
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .ok();
    rx
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut manager = NetworkManager::default();

    if let Some(target) = &args.connect {
        let (host, port) = split_host_port(target)?;
        manager.join_server(host, port, &args.name)?;
    }

    log::info!("Type 'help' for commands, 'exit' to quit");
    let lines = spawn_stdin_reader();
    let frame = Duration::from_secs(1) / args.frame_rate.max(1);
    let mut last_state: Option<ConnectionState> = manager.client_state();

    loop {
        let start = Instant::now();

        match lines.try_recv() {
            Ok(line) => {
                let line = line.trim();
                match line {
                    "" => {}
                    "exit" | "quit" => break,
                    _ => match line.parse::<Command>() {
                        Ok(command) => {
                            if let Err(e) = manager.execute(command) {
                                log::warn!("{}", e);
                            }
                        }
                        Err(e) => log::warn!("{}", e),
                    },
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        manager.update();

        let state = manager.client_state();
        if state != last_state {
            match state {
                Some(state) => log::info!("Connection: {}", state),
                None => log::info!("Connection: offline"),
            }
            last_state = state;
        }

        if let Some(remaining) = frame.checked_sub(start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    if manager.has_client() {
        manager.leave_server()?;
    }
    if manager.has_server() {
        manager.stop_server()?;
    }

    Ok(())
}
